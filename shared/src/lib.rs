//! Types shared between the game server and its clients: canonical values,
//! the sparse delta format and the packet envelope carrying it.

pub mod delta;
pub mod protocol;
pub mod value;

pub use delta::Delta;
pub use protocol::{DELTA_LIST_LENGTH, DELTA_REMOVED};
pub use value::Value;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Start {
        game_name: String,
        player_id: String,
    },
    Delta {
        turn: u32,
        delta: Delta,
    },
    Invalid {
        message: String,
    },
    Over {
        reason: String,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::BTreeMap;

    #[test]
    fn test_packet_serialization_start() {
        let packet = Packet::Start {
            game_name: "Skirmish".to_string(),
            player_id: "1".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Start {
                game_name,
                player_id,
            } => {
                assert_eq!(game_name, "Skirmish");
                assert_eq!(player_id, "1");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_delta() {
        let mut unit = BTreeMap::new();
        unit.insert("health".to_string(), Delta::Value(Value::Int(25)));
        unit.insert("speed".to_string(), Delta::Value(Value::Float(1.25)));
        let mut units = BTreeMap::new();
        units.insert(DELTA_LIST_LENGTH.to_string(), Delta::Value(Value::Int(3)));
        units.insert("1".to_string(), Delta::Object(unit));
        units.insert("2".to_string(), Delta::Removed);
        let mut root = BTreeMap::new();
        root.insert("units".to_string(), Delta::Object(units));

        let packet = Packet::Delta {
            turn: 42,
            delta: Delta::Object(root),
        };

        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);

        match decoded {
            Packet::Delta { turn, delta } => {
                assert_eq!(turn, 42);
                let speed = delta
                    .get("units")
                    .and_then(|u| u.get("1"))
                    .and_then(|u| u.get("speed"));
                match speed {
                    Some(Delta::Value(Value::Float(f))) => assert_approx_eq!(*f, 1.25, 1e-9),
                    other => panic!("unexpected speed leaf {:?}", other),
                }
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_decode_rejects_garbage() {
        assert!(Packet::decode(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }

    #[test]
    fn test_value_json_forms() {
        assert_eq!(Value::Ref("42".into()).to_json(), serde_json::json!({"id": "42"}));
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(
            Value::from_json(&serde_json::json!(4_000_000_000u64)),
            Value::Float(4_000_000_000.0)
        );
        assert_eq!(Value::from_json(&serde_json::json!(-7)), Value::Int(-7));
    }
}
