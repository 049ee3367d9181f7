//! Client-side replica of the server's tracked state.

use log::{debug, info, warn};
use shared::{Delta, Packet, Value, DELTA_LIST_LENGTH};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("failed to decode packet: {0}")]
    Decode(#[from] bincode::Error),
    #[error("failed to parse gamelog line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("gamelog line has neither a delta nor an end marker")]
    MalformedLine,
    #[error("{key:?} is not a list index")]
    InvalidIndex { key: String },
    #[error("list length {0} is not a non-negative integer")]
    InvalidLength(Value),
}

/// Rebuilds the server state by merging every delta in order.
#[derive(Debug, Default)]
pub struct Mirror {
    state: BTreeMap<String, Value>,
    game_name: Option<String>,
    turn: Option<u32>,
    over: Option<String>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// The replicated tree, keyed by top-level object.
    pub fn state(&self) -> Value {
        Value::Map(self.state.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn game_name(&self) -> Option<&str> {
        self.game_name.as_deref()
    }

    /// The last turn a delta was applied for.
    pub fn turn(&self) -> Option<u32> {
        self.turn
    }

    pub fn over(&self) -> Option<&str> {
        self.over.as_deref()
    }

    /// Merges one turn's delta into the state.
    pub fn apply(&mut self, delta: &Delta) -> Result<(), MirrorError> {
        let Some(entries) = delta.as_object() else {
            warn!("ignoring delta that is not an object");
            return Ok(());
        };
        merge_entries(&mut self.state, entries)
    }

    pub fn apply_packet(&mut self, bytes: &[u8]) -> Result<(), MirrorError> {
        match Packet::decode(bytes)? {
            Packet::Start {
                game_name,
                player_id,
            } => {
                info!("joined {} as player {}", game_name, player_id);
                self.game_name = Some(game_name);
            }
            Packet::Delta { turn, delta } => {
                debug!("applying delta for turn {}", turn);
                self.apply(&delta)?;
                self.turn = Some(turn);
            }
            Packet::Invalid { message } => warn!("server rejected our last call: {}", message),
            Packet::Over { reason } => {
                info!("game over: {}", reason);
                self.over = Some(reason);
            }
        }
        Ok(())
    }

    /// Applies one line of a gamelog: `{"turn":n,"delta":{...}}` or
    /// `{"over":reason}`.
    pub fn apply_gamelog_line(&mut self, line: &str) -> Result<(), MirrorError> {
        let json: serde_json::Value = serde_json::from_str(line)?;
        if let Some(delta) = json.get("delta") {
            self.apply(&Delta::from_json(delta))?;
            self.turn = json
                .get("turn")
                .and_then(serde_json::Value::as_u64)
                .and_then(|turn| u32::try_from(turn).ok());
            return Ok(());
        }
        match json.get("over").and_then(serde_json::Value::as_str) {
            Some(reason) => {
                self.over = Some(reason.to_string());
                Ok(())
            }
            None => Err(MirrorError::MalformedLine),
        }
    }
}

fn merge_entries(
    map: &mut BTreeMap<String, Value>,
    entries: &BTreeMap<String, Delta>,
) -> Result<(), MirrorError> {
    for (key, delta) in entries {
        match delta {
            Delta::Removed => {
                map.remove(key);
            }
            _ => merge(map.entry(key.clone()).or_insert(Value::Null), delta)?,
        }
    }
    Ok(())
}

fn merge(target: &mut Value, delta: &Delta) -> Result<(), MirrorError> {
    let entries = match delta {
        Delta::Value(value) => {
            *target = value.clone();
            return Ok(());
        }
        Delta::Removed => {
            *target = Value::Null;
            return Ok(());
        }
        Delta::Object(entries) => entries,
    };

    match entries.get(DELTA_LIST_LENGTH) {
        Some(length) => {
            let len = match length {
                Delta::Value(Value::Int(len)) if *len >= 0 => *len as usize,
                Delta::Value(other) => return Err(MirrorError::InvalidLength(other.clone())),
                _ => return Err(MirrorError::InvalidLength(Value::Null)),
            };
            if !matches!(target, Value::List(_)) {
                *target = Value::List(Vec::new());
            }
            if let Value::List(items) = target {
                // resize first so entries past the new end are dropped
                items.resize(len, Value::Null);
                merge_list(items, entries)?;
            }
        }
        None => {
            if !matches!(target, Value::Map(_)) {
                *target = Value::Map(BTreeMap::new());
            }
            if let Value::Map(map) = target {
                merge_entries(map, entries)?;
            }
        }
    }
    Ok(())
}

fn merge_list(items: &mut [Value], entries: &BTreeMap<String, Delta>) -> Result<(), MirrorError> {
    for (key, delta) in entries {
        if key == DELTA_LIST_LENGTH {
            continue;
        }
        let index: usize = key
            .parse()
            .map_err(|_| MirrorError::InvalidIndex { key: key.clone() })?;
        match items.get_mut(index) {
            Some(item) => merge(item, delta)?,
            None if *delta == Delta::Removed => {}
            None => warn!("entry {} is past the list end {}", index, items.len()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(mirror: &mut Mirror, json: serde_json::Value) {
        mirror.apply(&Delta::from_json(&json)).unwrap();
    }

    #[test]
    fn test_merges_nested_objects() {
        let mut mirror = Mirror::new();
        apply(&mut mirror, json!({"game": {"turn": 1, "phase": "setup"}}));
        apply(&mut mirror, json!({"game": {"turn": 2}}));

        assert_eq!(
            mirror.state().to_json(),
            json!({"game": {"turn": 2, "phase": "setup"}})
        );
    }

    #[test]
    fn test_lists_resize_before_merging() {
        let mut mirror = Mirror::new();
        apply(
            &mut mirror,
            json!({"units": {"&LEN": 3, "0": {"health": 10}, "1": {"health": 20}, "2": {"health": 30}}}),
        );
        apply(&mut mirror, json!({"units": {"&LEN": 1, "1": "&RM", "2": "&RM"}}));
        assert_eq!(mirror.state().to_json(), json!({"units": [{"health": 10}]}));

        apply(&mut mirror, json!({"units": {"&LEN": 3, "2": {"health": 5}}}));
        assert_eq!(
            mirror.state().to_json(),
            json!({"units": [{"health": 10}, null, {"health": 5}]})
        );
    }

    #[test]
    fn test_removed_keys_and_slots() {
        let mut mirror = Mirror::new();
        apply(
            &mut mirror,
            json!({"scores": {"ann": 1.5, "bob": 2.5}, "log": {"&LEN": 2, "0": "a", "1": "b"}}),
        );
        apply(&mut mirror, json!({"scores": {"ann": "&RM"}, "log": {"&LEN": 2, "0": "&RM"}}));

        assert_eq!(
            mirror.state().to_json(),
            json!({"scores": {"bob": 2.5}, "log": [null, "b"]})
        );

        apply(&mut mirror, json!({"scores": "&RM"}));
        assert_eq!(mirror.get("scores"), None);
    }

    #[test]
    fn test_references_stay_references() {
        let mut mirror = Mirror::new();
        apply(&mut mirror, json!({"game": {"winner": {"id": "2"}}}));
        assert_eq!(
            mirror.get("game").and_then(|game| game.get("winner")),
            Some(&Value::Ref("2".to_string()))
        );
    }

    #[test]
    fn test_rejects_bad_list_keys() {
        let mut mirror = Mirror::new();
        let err = mirror
            .apply(&Delta::from_json(&json!({"log": {"&LEN": 1, "first": "a"}})))
            .unwrap_err();
        assert!(matches!(err, MirrorError::InvalidIndex { .. }));

        let err = mirror
            .apply(&Delta::from_json(&json!({"log": {"&LEN": -1}})))
            .unwrap_err();
        assert!(matches!(err, MirrorError::InvalidLength(Value::Int(-1))));
    }

    #[test]
    fn test_gamelog_lines() {
        let mut mirror = Mirror::new();
        mirror
            .apply_gamelog_line(r#"{"turn":4,"delta":{"turn":4}}"#)
            .unwrap();
        mirror.apply_gamelog_line(r#"{"over":"time"}"#).unwrap();

        assert_eq!(mirror.turn(), Some(4));
        assert_eq!(mirror.over(), Some("time"));
        assert_eq!(mirror.get("turn"), Some(&Value::Int(4)));
        assert!(matches!(
            mirror.apply_gamelog_line(r#"{"turn":5}"#),
            Err(MirrorError::MalformedLine)
        ));
        assert!(matches!(
            mirror.apply_gamelog_line("not json"),
            Err(MirrorError::Json(_))
        ));
    }

    #[test]
    fn test_packets() {
        let mut mirror = Mirror::new();
        let start = Packet::Start {
            game_name: "Skirmish".to_string(),
            player_id: "1".to_string(),
        };
        let delta = Packet::Delta {
            turn: 0,
            delta: Delta::from_json(&json!({"game": {"phase": "setup"}})),
        };
        mirror.apply_packet(&start.encode().unwrap()).unwrap();
        mirror.apply_packet(&delta.encode().unwrap()).unwrap();

        assert_eq!(mirror.game_name(), Some("Skirmish"));
        assert_eq!(mirror.turn(), Some(0));
        assert_eq!(mirror.state().to_json(), json!({"game": {"phase": "setup"}}));
        assert!(matches!(
            mirror.apply_packet(&[0xff, 0xff, 0xff, 0xff]),
            Err(MirrorError::Decode(_))
        ));
    }
}
