//! Reserved keys and markers of the delta wire format.
//!
//! Both values are byte-compatible with the existing client ecosystem, so
//! clients written against the original game server keep merging deltas
//! without changes.

/// Key under which a list level carries its current length.
pub const DELTA_LIST_LENGTH: &str = "&LEN";

/// Marker written in place of a value for a removed key or index.
pub const DELTA_REMOVED: &str = "&RM";

/// Alternative spelling accepted when a list is mutated by key.
pub const LIST_LENGTH_ALIAS: &str = "length";

/// Field name used for the id of a referenced game object.
pub const REFERENCE_ID_KEY: &str = "id";

/// Returns true for keys that may never be used as application keys.
pub fn is_reserved_key(key: &str) -> bool {
    key == DELTA_LIST_LENGTH || key == DELTA_REMOVED
}
