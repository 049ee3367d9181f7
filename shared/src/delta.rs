use crate::protocol::DELTA_REMOVED;
use crate::value::{reference_id, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One level of a sparse state diff.
///
/// Keys of an `Object` mirror field names, dictionary keys and list indices
/// (as decimal strings). A list level additionally carries its length under
/// [`crate::DELTA_LIST_LENGTH`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    Value(Value),
    Removed,
    Object(BTreeMap<String, Delta>),
}

impl Default for Delta {
    fn default() -> Self {
        Delta::Object(BTreeMap::new())
    }
}

impl Delta {
    /// True for an object level without any keys.
    pub fn is_empty(&self) -> bool {
        matches!(self, Delta::Object(map) if map.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Delta> {
        match self {
            Delta::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Delta>> {
        match self {
            Delta::Object(map) => Some(map),
            _ => None,
        }
    }

    /// JSON form of the delta, as written to gamelogs.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Delta::Value(value) => value.to_json(),
            Delta::Removed => serde_json::Value::String(DELTA_REMOVED.to_string()),
            Delta::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Parses the JSON form produced by [`Delta::to_json`].
    ///
    /// A `{"id": string}` object is read as a reference leaf, never as a
    /// nested level.
    pub fn from_json(json: &serde_json::Value) -> Delta {
        match json {
            serde_json::Value::String(s) if s == DELTA_REMOVED => Delta::Removed,
            serde_json::Value::Object(object) if reference_id(object).is_none() => Delta::Object(
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), Delta::from_json(v)))
                    .collect(),
            ),
            other => Delta::Value(Value::from_json(other)),
        }
    }
}
