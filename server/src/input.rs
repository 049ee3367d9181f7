//! Loosely typed input accepted by the sanitizer.

use serde_json::Value as Json;
use shared::protocol::REFERENCE_ID_KEY;
use std::collections::BTreeMap;

/// Handle to a live game object, as passed into the tracker by game logic.
///
/// `ancestors` lists the classes the object's class derives from, so a
/// `Unit` can be stored where a `GameObject` reference is declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameObjectRef {
    pub id: String,
    pub class: String,
    pub ancestors: Vec<String>,
}

impl GameObjectRef {
    pub fn new(id: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            ancestors: Vec::new(),
        }
    }

    pub fn with_ancestors<S: Into<String>>(mut self, ancestors: impl IntoIterator<Item = S>) -> Self {
        self.ancestors = ancestors.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_instance_of(&self, class: &str) -> bool {
        self.class == class || self.ancestors.iter().any(|a| a == class)
    }
}

/// A raw value from game logic or the network, before sanitizing.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Input>),
    Map(BTreeMap<String, Input>),
    Object(GameObjectRef),
}

impl Input {
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
    {
        Input::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Input>>(items: impl IntoIterator<Item = V>) -> Self {
        Input::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Input::Null)
    }

    /// Lists, maps and game objects; everything that is not a scalar.
    pub fn is_object(&self) -> bool {
        matches!(self, Input::List(_) | Input::Map(_) | Input::Object(_))
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Input::Null => "null".to_string(),
            Input::Bool(_) => "boolean".to_string(),
            Input::Int(_) | Input::Float(_) => "number".to_string(),
            Input::Str(_) => "string".to_string(),
            Input::List(_) => "list".to_string(),
            Input::Map(_) => "map".to_string(),
            Input::Object(obj) => obj.class.clone(),
        }
    }

    /// Converts decoded JSON. Objects stay maps.
    pub fn from_json(json: &Json) -> Self {
        Self::from_json_with(json, &|_| None)
    }

    /// Converts decoded JSON, resolving `{"id": ..}` objects to game objects
    /// through `lookup`. Unknown ids stay plain maps and fail reference checks.
    pub fn from_json_with(json: &Json, lookup: &dyn Fn(&str) -> Option<GameObjectRef>) -> Self {
        match json {
            Json::Null => Input::Null,
            Json::Bool(b) => Input::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Input::Int(i),
                None => Input::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Input::Str(s.clone()),
            Json::Array(items) => {
                Input::List(items.iter().map(|i| Self::from_json_with(i, lookup)).collect())
            }
            Json::Object(object) => {
                let resolved = object
                    .get(REFERENCE_ID_KEY)
                    .and_then(Json::as_str)
                    .filter(|_| object.len() == 1)
                    .and_then(lookup);
                match resolved {
                    Some(obj) => Input::Object(obj),
                    None => Input::Map(
                        object
                            .iter()
                            .map(|(k, v)| (k.clone(), Self::from_json_with(v, lookup)))
                            .collect(),
                    ),
                }
            }
        }
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Input::Bool(b)
    }
}

impl From<i32> for Input {
    fn from(i: i32) -> Self {
        Input::Int(i as i64)
    }
}

impl From<i64> for Input {
    fn from(i: i64) -> Self {
        Input::Int(i)
    }
}

impl From<u32> for Input {
    fn from(i: u32) -> Self {
        Input::Int(i as i64)
    }
}

impl From<usize> for Input {
    fn from(i: usize) -> Self {
        Input::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Input {
    fn from(f: f64) -> Self {
        Input::Float(f)
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Str(s.to_string())
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Str(s)
    }
}

impl From<GameObjectRef> for Input {
    fn from(obj: GameObjectRef) -> Self {
        Input::Object(obj)
    }
}

impl From<&GameObjectRef> for Input {
    fn from(obj: &GameObjectRef) -> Self {
        Input::Object(obj.clone())
    }
}

impl<T: Into<Input>> From<Vec<T>> for Input {
    fn from(items: Vec<T>) -> Self {
        Input::list(items)
    }
}

impl<T: Into<Input>> From<Option<T>> for Input {
    fn from(value: Option<T>) -> Self {
        value.map_or(Input::Null, Into::into)
    }
}

impl From<&Json> for Input {
    fn from(json: &Json) -> Self {
        Input::from_json(json)
    }
}

impl From<Json> for Input {
    fn from(json: Json) -> Self {
        Input::from_json(&json)
    }
}
