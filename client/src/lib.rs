//! # Game Client Library
//!
//! This library provides the client side of state synchronization: a replica
//! of the server's tracked state that is kept current by merging the sparse
//! deltas the server sends after every turn.
//!
//! ## Delta Format
//!
//! A delta is a nested object whose keys mirror field names, dictionary keys
//! and list indices (as decimal strings):
//! - An object carrying `&LEN` is a list; the list is resized to that length
//!   first, padding with null, and the remaining keys are merged per index
//! - `&RM` removes a key; for a list slot inside the new length it clears the
//!   slot to null
//! - `{"id": ...}` is a reference to a game object, kept as a reference
//! - Anything else replaces the value at its path
//!
//! Applying every delta in order to an empty [`Mirror`] reproduces the server
//! state at that point.
//!
//! ## Sources
//!
//! Deltas arrive either as bincode-encoded [`shared::Packet`]s or as lines of
//! a JSON gamelog (`{"turn":n,"delta":{...}}`).
//!
//! ## Usage Example
//!
//! ```rust
//! use client::Mirror;
//!
//! let mut mirror = Mirror::new();
//! mirror
//!     .apply_gamelog_line(r#"{"turn":1,"delta":{"units":{"&LEN":1,"0":{"health":10}}}}"#)
//!     .unwrap();
//! assert_eq!(
//!     mirror.state().to_json(),
//!     serde_json::json!({"units": [{"health": 10}]})
//! );
//! ```

pub mod mirror;

pub use mirror::{Mirror, MirrorError};
