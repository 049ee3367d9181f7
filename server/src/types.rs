//! Type descriptors for tracked state.
//!
//! Descriptors are produced by the code generator for each game and arrive as
//! JSON tagged by `"kind"`:
//!
//! ```json
//! {"kind": "list", "element": {"kind": "gameObject", "class": "Unit"}}
//! {"kind": "primitive", "type": "string", "literals": ["north", "south"]}
//! {"kind": "dictionary", "fields": {"health": {"kind": "primitive", "type": "int"}}}
//! ```

use serde::{Deserialize, Deserializer};
use shared::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrimitiveKind {
    Boolean,
    Int,
    Float,
    String,
}

/// A scalar type, optionally restricted to a fixed literal set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrimitiveType {
    #[serde(rename = "type")]
    pub kind: PrimitiveKind,
    #[serde(default, deserialize_with = "literals_from_json")]
    pub literals: Option<Vec<Value>>,
    #[serde(default)]
    pub nullable: bool,
}

impl PrimitiveType {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            literals: None,
            nullable: false,
        }
    }
}

fn string_key() -> PrimitiveType {
    PrimitiveType::new(PrimitiveKind::String)
}

fn literals_from_json<'de, D>(deserializer: D) -> Result<Option<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|items| items.iter().map(Value::from_json).collect()))
}

/// A keyed mapping. `fields` is a fixed per-key type table (the shape of a
/// game object); `value` is the type of any key not listed there.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DictionaryType {
    #[serde(default = "string_key")]
    pub key: PrimitiveType,
    #[serde(default)]
    pub value: Option<TypeDescriptor>,
    #[serde(default)]
    pub fields: BTreeMap<String, TypeDescriptor>,
}

impl DictionaryType {
    /// Declared type of `key`: the per-key table wins over the uniform type.
    pub fn value_type(&self, key: &str) -> Option<&TypeDescriptor> {
        self.fields.get(key).or(self.value.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeDescriptor {
    Primitive(PrimitiveType),
    List {
        element: Arc<TypeDescriptor>,
    },
    Dictionary(Arc<DictionaryType>),
    GameObject {
        class: String,
        #[serde(default)]
        nullable: bool,
    },
}

impl TypeDescriptor {
    pub fn boolean() -> Self {
        TypeDescriptor::Primitive(PrimitiveType::new(PrimitiveKind::Boolean))
    }

    pub fn int() -> Self {
        TypeDescriptor::Primitive(PrimitiveType::new(PrimitiveKind::Int))
    }

    pub fn float() -> Self {
        TypeDescriptor::Primitive(PrimitiveType::new(PrimitiveKind::Float))
    }

    pub fn string() -> Self {
        TypeDescriptor::Primitive(PrimitiveType::new(PrimitiveKind::String))
    }

    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::List {
            element: Arc::new(element),
        }
    }

    /// Dictionary with string keys and one value type for every key.
    pub fn dictionary(value: TypeDescriptor) -> Self {
        Self::keyed_dictionary(string_key(), value)
    }

    pub fn keyed_dictionary(key: PrimitiveType, value: TypeDescriptor) -> Self {
        TypeDescriptor::Dictionary(Arc::new(DictionaryType {
            key,
            value: Some(value),
            fields: BTreeMap::new(),
        }))
    }

    /// Dictionary with a fixed per-key type table.
    pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, TypeDescriptor)>) -> Self {
        TypeDescriptor::Dictionary(Arc::new(DictionaryType {
            key: string_key(),
            value: None,
            fields: fields
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty))
                .collect(),
        }))
    }

    pub fn game_object(class: &str) -> Self {
        TypeDescriptor::GameObject {
            class: class.to_string(),
            nullable: false,
        }
    }

    /// Allows null. Only scalars and references can be nullable.
    pub fn nullable(self) -> Self {
        match self {
            TypeDescriptor::Primitive(mut p) => {
                p.nullable = true;
                TypeDescriptor::Primitive(p)
            }
            TypeDescriptor::GameObject { class, .. } => TypeDescriptor::GameObject {
                class,
                nullable: true,
            },
            other => other,
        }
    }

    /// Restricts a scalar to `literals`; the first one is the lenient fallback.
    pub fn literals<V: Into<Value>>(self, literals: impl IntoIterator<Item = V>) -> Self {
        match self {
            TypeDescriptor::Primitive(mut p) => {
                p.literals = Some(literals.into_iter().map(Into::into).collect());
                TypeDescriptor::Primitive(p)
            }
            other => other,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeDescriptor::GameObject { .. })
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::List { .. } | TypeDescriptor::Dictionary(_)
        )
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(p) => {
                let name = match p.kind {
                    PrimitiveKind::Boolean => "boolean",
                    PrimitiveKind::Int => "int",
                    PrimitiveKind::Float => "float",
                    PrimitiveKind::String => "string",
                };
                write!(f, "{}{}", name, if p.nullable { "?" } else { "" })
            }
            TypeDescriptor::List { element } => write!(f, "list<{}>", element),
            TypeDescriptor::Dictionary(d) => match &d.value {
                Some(value) if d.fields.is_empty() => write!(f, "dictionary<{}>", value),
                _ => write!(f, "record{{{}}}", d.fields.len()),
            },
            TypeDescriptor::GameObject { class, nullable } => {
                write!(f, "{}{}", class, if *nullable { "?" } else { "" })
            }
        }
    }
}
