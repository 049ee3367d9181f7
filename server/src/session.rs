//! Turn-based session driving game logic against a [`DeltaManager`].
//!
//! After every turn the accumulated delta is handed to each registered sink
//! and the buffer is flushed, so every sink sees each change exactly once.

use crate::delta::DeltaManager;
use crate::error::TreeError;
use crate::sanitize::Mode;
use log::{debug, error, info, warn};
use serde_json::json;
use shared::{Delta, Packet};
use std::io::{self, Write};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write gamelog: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize delta: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] bincode::Error),
    #[error("receiver has been dropped")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("game is already over")]
    Over,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Continue,
    Over {
        winner: Option<String>,
        reason: String,
    },
}

/// The game rules. Only ever mutates state through the manager it is given.
pub trait GameLogic {
    fn name(&self) -> &str;

    /// Tracks the initial state. Runs once, before turn 1.
    fn setup(&mut self, manager: &mut DeltaManager) -> Result<(), TreeError>;

    fn play_turn(&mut self, manager: &mut DeltaManager, turn: u32) -> Result<TurnOutcome, TreeError>;
}

/// Receives the delta of every turn that changed something.
pub trait DeltaSink {
    fn start(&mut self, _game_name: &str) -> Result<(), SinkError> {
        Ok(())
    }

    fn send(&mut self, turn: u32, delta: &Delta) -> Result<(), SinkError>;

    fn finish(&mut self, _reason: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

pub struct Session<G: GameLogic> {
    manager: DeltaManager,
    logic: G,
    sinks: Vec<Box<dyn DeltaSink>>,
    turn: u32,
    over: bool,
}

impl<G: GameLogic> Session<G> {
    pub fn new(logic: G, mode: Mode) -> Self {
        Self {
            manager: DeltaManager::new(mode),
            logic,
            sinks: Vec::new(),
            turn: 0,
            over: false,
        }
    }

    pub fn add_sink(&mut self, sink: impl DeltaSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn manager(&self) -> &DeltaManager {
        &self.manager
    }

    pub fn logic(&self) -> &G {
        &self.logic
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    /// Sets the game up and publishes the initial state as turn 0.
    pub fn start(&mut self) -> Result<(), SessionError> {
        for sink in &mut self.sinks {
            sink.start(self.logic.name())?;
        }
        if let Err(err) = self.logic.setup(&mut self.manager) {
            error!("setup of {} failed: {}", self.logic.name(), err);
            self.finish(&err.to_string())?;
            return Err(err.into());
        }
        info!("{} set up with {} nodes", self.logic.name(), self.manager.node_count());
        self.publish()
    }

    /// Plays one turn and publishes what it changed.
    ///
    /// A fatal tree error ends the game. Other errors are logged; whatever
    /// the turn applied before failing stays in the tree and is published.
    pub fn run_turn(&mut self) -> Result<TurnOutcome, SessionError> {
        if self.over {
            return Err(SessionError::Over);
        }
        self.turn += 1;

        let outcome = match self.logic.play_turn(&mut self.manager, self.turn) {
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => {
                error!("turn {} aborted the game: {}", self.turn, err);
                self.publish()?;
                self.finish(&err.to_string())?;
                return Err(err.into());
            }
            Err(err) => {
                warn!("turn {} failed: {}", self.turn, err);
                TurnOutcome::Continue
            }
        };

        self.publish()?;
        if let TurnOutcome::Over { winner, reason } = &outcome {
            info!("game over after turn {}: {} (winner {:?})", self.turn, reason, winner);
            self.finish(reason)?;
        }
        Ok(outcome)
    }

    fn publish(&mut self) -> Result<(), SessionError> {
        let delta = self.manager.take();
        if delta.is_empty() {
            debug!("turn {} changed nothing", self.turn);
        } else {
            for sink in &mut self.sinks {
                sink.send(self.turn, &delta)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, reason: &str) -> Result<(), SinkError> {
        self.over = true;
        for sink in &mut self.sinks {
            sink.finish(reason)?;
        }
        Ok(())
    }
}

/// Writes one JSON object per line: `{"turn":n,"delta":{...}}`, and a final
/// `{"over":reason}` line.
pub struct GamelogWriter<W: Write> {
    writer: W,
}

impl<W: Write> GamelogWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &serde_json::Value) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> DeltaSink for GamelogWriter<W> {
    fn send(&mut self, turn: u32, delta: &Delta) -> Result<(), SinkError> {
        self.write_line(&json!({"turn": turn, "delta": delta.to_json()}))
    }

    fn finish(&mut self, reason: &str) -> Result<(), SinkError> {
        self.write_line(&json!({ "over": reason }))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Encodes deltas as [`Packet`]s onto a channel read by the network task.
pub struct PacketSender {
    sender: UnboundedSender<Vec<u8>>,
    player_id: String,
}

impl PacketSender {
    pub fn new(sender: UnboundedSender<Vec<u8>>, player_id: impl Into<String>) -> Self {
        Self {
            sender,
            player_id: player_id.into(),
        }
    }

    fn queue(&self, packet: &Packet) -> Result<(), SinkError> {
        let bytes = packet.encode()?;
        self.sender.send(bytes).map_err(|_| SinkError::Closed)
    }
}

impl DeltaSink for PacketSender {
    fn start(&mut self, game_name: &str) -> Result<(), SinkError> {
        self.queue(&Packet::Start {
            game_name: game_name.to_string(),
            player_id: self.player_id.clone(),
        })
    }

    fn send(&mut self, turn: u32, delta: &Delta) -> Result<(), SinkError> {
        self.queue(&Packet::Delta {
            turn,
            delta: delta.clone(),
        })
    }

    fn finish(&mut self, reason: &str) -> Result<(), SinkError> {
        self.queue(&Packet::Over {
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Input;
    use crate::types::TypeDescriptor;
    use shared::Value;
    use tokio::sync::mpsc;

    /// Counts down from `turns`, failing on the turn named by `fail`.
    struct Countdown {
        turns: u32,
        fail: Option<(u32, TreeError)>,
    }

    impl GameLogic for Countdown {
        fn name(&self) -> &str {
            "Countdown"
        }

        fn setup(&mut self, manager: &mut DeltaManager) -> Result<(), TreeError> {
            manager.track("left", &TypeDescriptor::int(), self.turns)?;
            manager.track("idle", &TypeDescriptor::boolean(), false)?;
            Ok(())
        }

        fn play_turn(&mut self, manager: &mut DeltaManager, turn: u32) -> Result<TurnOutcome, TreeError> {
            let left = manager.tracked("left").ok_or(TreeError::UntrackedKey {
                key: "left".to_string(),
            })?;
            manager.set(left, self.turns - turn)?;
            if let Some((at, err)) = &self.fail {
                if *at == turn {
                    return Err(err.clone());
                }
            }
            if turn == self.turns {
                return Ok(TurnOutcome::Over {
                    winner: None,
                    reason: "time".to_string(),
                });
            }
            Ok(TurnOutcome::Continue)
        }
    }

    fn lines(writer: GamelogWriter<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(writer.into_inner())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_gamelog_lines() {
        let mut buffer = GamelogWriter::new(Vec::new());
        buffer
            .send(3, &Delta::from_json(&json!({"left": 1})))
            .unwrap();
        buffer.finish("time").unwrap();

        assert_eq!(
            lines(buffer),
            vec![json!({"turn": 3, "delta": {"left": 1}}), json!({"over": "time"})]
        );
    }

    #[tokio::test]
    async fn test_session_publishes_each_turn_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = Session::new(
            Countdown {
                turns: 2,
                fail: None,
            },
            Mode::Strict,
        );
        session.add_sink(PacketSender::new(tx, "1"));
        session.start().unwrap();

        assert_eq!(session.run_turn().unwrap(), TurnOutcome::Continue);
        assert!(matches!(session.run_turn().unwrap(), TurnOutcome::Over { .. }));
        assert!(session.is_over());
        assert!(matches!(session.run_turn(), Err(SessionError::Over)));
        assert!(session.manager().dump().is_empty());

        let mut packets = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            packets.push(Packet::decode(&bytes).unwrap());
        }
        assert_eq!(packets.len(), 5);
        assert!(matches!(&packets[0], Packet::Start { game_name, .. } if game_name == "Countdown"));
        match &packets[2] {
            Packet::Delta { turn, delta } => {
                assert_eq!(*turn, 1);
                assert_eq!(delta.to_json(), json!({"left": 1}));
            }
            other => panic!("expected delta, got {:?}", other),
        }
        assert!(matches!(&packets[4], Packet::Over { reason } if reason == "time"));
    }

    #[test]
    fn test_non_fatal_errors_keep_playing() {
        let mut session = Session::new(
            Countdown {
                turns: 3,
                fail: Some((
                    1,
                    TreeError::UntrackedKey {
                        key: "gone".to_string(),
                    },
                )),
            },
            Mode::default(),
        );
        session.start().unwrap();

        assert_eq!(session.run_turn().unwrap(), TurnOutcome::Continue);
        assert!(!session.is_over());
        let left = session.manager().tracked("left").unwrap();
        assert_eq!(session.manager().get(left).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_fatal_errors_end_the_game() {
        let mut session = Session::new(
            Countdown {
                turns: 3,
                fail: Some((
                    2,
                    TreeError::UntypedKey {
                        key: "mana".to_string(),
                    },
                )),
            },
            Mode::default(),
        );
        session.start().unwrap();
        session.run_turn().unwrap();

        assert!(matches!(
            session.run_turn(),
            Err(SessionError::Tree(TreeError::UntypedKey { .. }))
        ));
        assert!(session.is_over());
    }

    #[test]
    fn test_closed_channel_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut sender = PacketSender::new(tx, "1");
        let err = sender.send(0, &Delta::default()).unwrap_err();
        assert!(matches!(err, SinkError::Closed));

        let mut manager = DeltaManager::default();
        manager.track("x", &TypeDescriptor::int(), Input::Int(1)).unwrap();
        assert!(sender.send(0, &manager.dump()).is_err());
    }
}
