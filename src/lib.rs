//! Umbrella crate for the turnsync workspace.
//!
//! Re-exports the protocol types (`shared`), the authoritative state tracker
//! (`server`) and the delta-applying replica (`client`) under one name.

pub use client;
pub use server;
pub use shared;
