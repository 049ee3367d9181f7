//! Skirmish: a small two-player game used by the demo binary and the tests.
//!
//! Each turn every unit of the current player hits a random enemy unit and
//! moves a little. Units reaching zero health are removed from the list.
//! The game ends when one side has no units left or the turn limit is hit.

use crate::delta::DeltaManager;
use crate::error::TreeError;
use crate::input::{GameObjectRef, Input};
use crate::node::NodeId;
use crate::session::{GameLogic, TurnOutcome};
use crate::types::TypeDescriptor;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Value;

pub const GAME_KEY: &str = "game";
const START_HEALTH: i32 = 100;
const BOARD_SIZE: f64 = 10.0;

/// Type of the tracked `game` object.
pub fn game_type() -> TypeDescriptor {
    let player = TypeDescriptor::game_object("Player");
    let unit = TypeDescriptor::record([
        ("id", TypeDescriptor::string()),
        ("owner", player.clone()),
        ("health", TypeDescriptor::int()),
        ("x", TypeDescriptor::float()),
        ("y", TypeDescriptor::float()),
    ]);
    TypeDescriptor::record([
        ("currentTurn", TypeDescriptor::int()),
        ("maxTurns", TypeDescriptor::int()),
        ("currentPlayer", player.clone().nullable()),
        ("winner", player.clone().nullable()),
        (
            "phase",
            TypeDescriptor::string().literals(["setup", "playing", "over"]),
        ),
        ("players", TypeDescriptor::list(player)),
        ("units", TypeDescriptor::list(unit)),
        ("scores", TypeDescriptor::dictionary(TypeDescriptor::float())),
    ])
}

struct UnitState {
    node: NodeId,
    owner: String,
    health: i32,
}

pub struct Skirmish {
    rng: StdRng,
    players: Vec<GameObjectRef>,
    units: usize,
    max_turns: u32,
    game: Option<NodeId>,
}

impl Skirmish {
    pub fn new(seed: u64, units: usize, max_turns: u32) -> Self {
        let players = ["1", "2"]
            .iter()
            .map(|id| GameObjectRef::new(*id, "Player").with_ancestors(["GameObject"]))
            .collect();
        Self {
            rng: StdRng::seed_from_u64(seed),
            players,
            units,
            max_turns,
            game: None,
        }
    }

    pub fn players(&self) -> &[GameObjectRef] {
        &self.players
    }

    fn game(&self) -> Result<NodeId, TreeError> {
        self.game.ok_or_else(|| TreeError::UntrackedKey {
            key: GAME_KEY.to_string(),
        })
    }

    fn roster(&self, manager: &DeltaManager, units: NodeId) -> Result<Vec<UnitState>, TreeError> {
        let mut roster = Vec::new();
        for index in 0..manager.len(units)? {
            let Some(node) = manager.index(units, index) else {
                break;
            };
            let owner = manager.get(field(manager, node, "owner")?)?;
            let health = manager.get(field(manager, node, "health")?)?;
            roster.push(UnitState {
                node,
                owner: owner.as_ref_id().unwrap_or_default().to_string(),
                health: health.as_int().unwrap_or_default(),
            });
        }
        Ok(roster)
    }

    fn nudge(&mut self, manager: &mut DeltaManager, unit: NodeId, axis: &str) -> Result<(), TreeError> {
        let position = manager
            .get(field(manager, unit, axis)?)?
            .as_float()
            .unwrap_or_default();
        let moved = (position + self.rng.gen_range(-1.0..1.0)).clamp(0.0, BOARD_SIZE);
        manager.set_key(unit, axis, moved)?;
        Ok(())
    }
}

fn field(manager: &DeltaManager, node: NodeId, key: &str) -> Result<NodeId, TreeError> {
    manager.child(node, key).ok_or_else(|| TreeError::UntrackedKey {
        key: key.to_string(),
    })
}

impl GameLogic for Skirmish {
    fn name(&self) -> &str {
        "Skirmish"
    }

    fn setup(&mut self, manager: &mut DeltaManager) -> Result<(), TreeError> {
        let players = &self.players;
        let rng = &mut self.rng;
        let units: Vec<Input> = (0..self.units)
            .map(|i| {
                Input::map([
                    ("id", Input::from(format!("u{}", i))),
                    ("owner", Input::from(&players[i % players.len()])),
                    ("health", Input::from(START_HEALTH)),
                    ("x", Input::from(rng.gen_range(0.0..BOARD_SIZE))),
                    ("y", Input::from(rng.gen_range(0.0..BOARD_SIZE))),
                ])
            })
            .collect();
        let scores: Vec<(String, Input)> = players
            .iter()
            .map(|player| (player.id.clone(), Input::from(0.0)))
            .collect();

        let game = manager.track(
            GAME_KEY,
            &game_type(),
            Input::map([
                ("currentTurn", Input::from(0)),
                ("maxTurns", Input::from(self.max_turns)),
                ("currentPlayer", Input::Null),
                ("winner", Input::Null),
                ("phase", Input::from("setup")),
                ("players", Input::list(players.iter())),
                ("units", Input::List(units)),
                ("scores", Input::map(scores)),
            ]),
        )?;
        self.game = Some(game);
        Ok(())
    }

    fn play_turn(&mut self, manager: &mut DeltaManager, turn: u32) -> Result<TurnOutcome, TreeError> {
        let game = self.game()?;
        let units = field(manager, game, "units")?;
        let scores = field(manager, game, "scores")?;
        let current = self.players[(turn as usize + 1) % self.players.len()].clone();

        manager.set_key(game, "currentTurn", turn)?;
        manager.set_key(game, "currentPlayer", &current)?;
        manager.set_key(game, "phase", "playing")?;

        let mut roster = self.roster(manager, units)?;
        let attackers: Vec<usize> = (0..roster.len())
            .filter(|&i| roster[i].owner == current.id)
            .collect();
        let targets: Vec<usize> = (0..roster.len())
            .filter(|&i| roster[i].owner != current.id)
            .collect();

        let mut dealt = 0;
        for attacker in attackers {
            let alive: Vec<usize> = targets
                .iter()
                .copied()
                .filter(|&t| roster[t].health > 0)
                .collect();
            if alive.is_empty() {
                break;
            }
            let target = alive[self.rng.gen_range(0..alive.len())];
            let damage = self.rng.gen_range(5..=25);
            roster[target].health -= damage;
            dealt += damage;
            manager.set_key(roster[target].node, "health", roster[target].health)?;

            let unit = roster[attacker].node;
            self.nudge(manager, unit, "x")?;
            self.nudge(manager, unit, "y")?;
        }

        let score = manager
            .child(scores, &current.id)
            .map(|node| manager.get(node))
            .transpose()?
            .and_then(|value| value.as_float())
            .unwrap_or_default();
        manager.set_key(scores, &current.id, score + f64::from(dealt))?;

        // descending, so earlier indices stay valid
        for index in (0..roster.len()).rev() {
            if roster[index].health <= 0 {
                let removed = manager.remove_index(units, index)?;
                debug!("unit {} died on turn {}", removed.get("id").unwrap_or(&Value::Null), turn);
            }
        }

        let survivors: Vec<usize> = self
            .players
            .iter()
            .map(|player| {
                roster
                    .iter()
                    .filter(|unit| unit.health > 0 && unit.owner == player.id)
                    .count()
            })
            .collect();
        let standing: Vec<&GameObjectRef> = self
            .players
            .iter()
            .zip(&survivors)
            .filter(|(_, &count)| count > 0)
            .map(|(player, _)| player)
            .collect();

        let reason = if standing.len() <= 1 {
            "last side standing"
        } else if turn >= self.max_turns {
            "turn limit reached"
        } else {
            return Ok(TurnOutcome::Continue);
        };

        let best = survivors.iter().copied().max().unwrap_or_default();
        let leaders: Vec<&GameObjectRef> = self
            .players
            .iter()
            .zip(&survivors)
            .filter(|(_, &count)| count == best && best > 0)
            .map(|(player, _)| player)
            .collect();
        let winner = match leaders.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        };

        manager.set_key(game, "winner", winner.as_ref())?;
        manager.set_key(game, "phase", "over")?;
        Ok(TurnOutcome::Over {
            winner: winner.map(|player| player.id),
            reason: reason.to_string(),
        })
    }
}
