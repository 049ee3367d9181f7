//! # Game State Tracking Library
//!
//! This library holds the authoritative state of a turn-based game as a typed
//! tree and records, for every turn, the minimal set of changes clients need
//! to stay synchronized. Game logic mutates the tree; the tree sanitizes what
//! it is given and accumulates a sparse delta that is shipped after the turn.
//!
//! ## Core Responsibilities
//!
//! ### Type Sanitization
//! Every value entering the tree is coerced to the declared type of its slot:
//! - Booleans, 32-bit integers, floats and strings with JS-like coercion
//! - Literal (enumerated) primitives, optionally nullable
//! - Game-object references checked against the declared class
//! - Lists and dictionaries sanitized element by element
//!
//! Sanitizing is either lenient (bad input is corrected, with a warning for
//! literal fallbacks) or strict (bad input is rejected and nothing changes).
//!
//! ### Change Tracking
//! Each mutation that changes a value walks up to the root and writes the new
//! value into the delta buffer at the mirrored path:
//! - Unchanged siblings never appear
//! - Repeated writes within a turn coalesce to the last value
//! - List levels carry their length under `&LEN`
//! - Removed keys carry `&RM`
//! - References are written as `{"id": ...}`, never inlined
//!
//! ### Session Driving
//! A [`session::Session`] runs [`session::GameLogic`] turn by turn, hands each
//! turn's delta to its [`session::DeltaSink`]s and flushes the buffer.
//!
//! ## Architecture Design
//!
//! ### Arena of Nodes
//! All nodes live in one arena owned by the [`DeltaManager`] and are addressed
//! by generational [`NodeId`]s. Parent links are ids, so the tree has no
//! reference cycles and a stale handle is detected instead of aliasing a new
//! node.
//!
//! ### Single Writer
//! The manager is mutated through `&mut self` by the one game loop that owns
//! it. Nothing in the tracking core awaits or locks.
//!
//! ## Module Organization
//!
//! ### Tree (`delta`, `node`, `factory`, `list`, `dictionary`)
//! - The manager, its delta buffer and the root-ward recording walk
//! - Value nodes, reading and assigning, adoption and release
//! - Node construction from type descriptors
//! - Pooled list trackers and the length node
//! - Dictionaries and game-object records
//!
//! ### Types (`types`, `input`, `sanitize`, `rpc`)
//! - Type descriptors as emitted by the code generator
//! - Loosely typed input as it arrives from game logic or clients
//! - The sanitizer
//! - Validation of remote function arguments and return values
//!
//! ### Session (`session`, `sample`)
//! - Turn loop, gamelog and packet sinks
//! - A small sample game
//!
//! ## Usage Example
//!
//! ```rust
//! use server::{DeltaManager, Input, Mode, TypeDescriptor};
//!
//! let mut manager = DeltaManager::new(Mode::Strict);
//! let unit = TypeDescriptor::record([("health", TypeDescriptor::int())]);
//! let game = manager
//!     .track(
//!         "game",
//!         &TypeDescriptor::record([("units", TypeDescriptor::list(unit))]),
//!         Input::map([("units", Input::list(Vec::<Input>::new()))]),
//!     )
//!     .unwrap();
//! let units = manager.child(game, "units").unwrap();
//! manager.flush();
//!
//! manager.push(units, Input::map([("health", 10)])).unwrap();
//! assert_eq!(
//!     manager.dump().to_json(),
//!     serde_json::json!({"game": {"units": {"&LEN": 1, "0": {"health": 10}}}})
//! );
//! ```

pub mod delta;
pub mod dictionary;
pub mod error;
pub mod factory;
pub mod input;
pub mod list;
pub mod node;
pub mod rpc;
pub mod sample;
pub mod sanitize;
pub mod session;
pub mod types;

pub use delta::DeltaManager;
pub use error::{SanitizeError, TreeError};
pub use input::{GameObjectRef, Input};
pub use node::NodeId;
pub use rpc::{FunctionSchema, Parameter, RpcError};
pub use sanitize::Mode;
pub use session::{DeltaSink, GameLogic, GamelogWriter, PacketSender, Session, TurnOutcome};
pub use types::{DictionaryType, PrimitiveKind, PrimitiveType, TypeDescriptor};
