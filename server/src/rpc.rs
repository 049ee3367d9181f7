//! Validation of remote procedure calls made by AI clients.
//!
//! Arguments come straight off the network and are sanitized strictly: a
//! malformed argument makes the whole call invalid, which the session layer
//! reports back to the client instead of running the call.

use crate::error::SanitizeError;
use crate::input::Input;
use crate::sanitize::{sanitize, Mode};
use crate::types::TypeDescriptor;
use serde::{Deserialize, Deserializer};
use shared::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RpcError {
    #[error("argument {name:?} is invalid: {source}")]
    InvalidArgument {
        name: String,
        source: SanitizeError,
    },
    #[error("unexpected argument {name:?}")]
    UnexpectedArgument { name: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    #[serde(default, deserialize_with = "default_from_json")]
    pub default: Option<Value>,
}

fn default_from_json<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.map(|json| Value::from_json(&json)))
}

/// The signature of a function a client may invoke on a game object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub returns: Option<TypeDescriptor>,
}

impl FunctionSchema {
    /// Sanitizes call arguments into parameter order.
    ///
    /// A missing argument takes its default; without one it is sanitized from
    /// null, so only nullable parameters may be left out.
    pub fn sanitize_args(&self, args: &BTreeMap<String, Input>) -> Result<Vec<Value>, RpcError> {
        if let Some(name) = args
            .keys()
            .find(|name| !self.parameters.iter().any(|p| &p.name == *name))
        {
            return Err(RpcError::UnexpectedArgument { name: name.clone() });
        }

        self.parameters
            .iter()
            .map(|parameter| match (args.get(&parameter.name), &parameter.default) {
                (None, Some(default)) => Ok(default.clone()),
                (arg, _) => sanitize(&parameter.ty, arg.unwrap_or(&Input::Null), Mode::Strict)
                    .map_err(|source| RpcError::InvalidArgument {
                        name: parameter.name.clone(),
                        source,
                    }),
            })
            .collect()
    }

    /// Sanitizes what the game logic returned for the call.
    ///
    /// Returned values are corrected leniently; a function without a declared
    /// return type returns null.
    pub fn sanitize_return(&self, value: &Input) -> Result<Value, SanitizeError> {
        match &self.returns {
            Some(ty) => sanitize(ty, value, Mode::Lenient),
            None => Ok(Value::Null),
        }
    }
}
