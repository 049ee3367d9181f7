use crate::node::NodeId;
use thiserror::Error;

/// Why a raw input could not be turned into a canonical value.
///
/// This is expected bad input (usually from a remote client), so it is
/// always returned, never panicked on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SanitizeError {
    #[error("expected {expected}, got {got}")]
    Mismatch { expected: &'static str, got: String },

    #[error("{value} is outside the 32-bit integer range")]
    OutOfRange { value: f64 },

    #[error("{value} is not one of {allowed:?}")]
    NotAllowed { value: String, allowed: Vec<String> },

    #[error("expected an instance of {expected}, got {got}")]
    NotInstance { expected: String, got: String },

    #[error("no type is declared for key {key:?}")]
    UnknownKey { key: String },

    #[error("{key:?} is reserved by the delta format")]
    ReservedKey { key: String },

    #[error("at {path}: {source}")]
    Nested {
        path: String,
        source: Box<SanitizeError>,
    },
}

impl SanitizeError {
    /// Prefixes the error location with `key`.
    pub fn within(self, key: &str) -> Self {
        match self {
            SanitizeError::Nested { path, source } => SanitizeError::Nested {
                path: format!("{}.{}", key, path),
                source,
            },
            other => SanitizeError::Nested {
                path: key.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, without location wrappers.
    pub fn root_cause(&self) -> &SanitizeError {
        match self {
            SanitizeError::Nested { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors from operations on the tracked tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("invalid value: {0}")]
    Invalid(#[from] SanitizeError),

    #[error("key {key:?} is not tracked")]
    UntrackedKey { key: String },

    #[error("node {child} already belongs to another parent")]
    AlreadyAdopted { child: NodeId },

    #[error("no type is declared for key {key:?}")]
    UntypedKey { key: String },

    #[error("{key:?} is neither a list index nor the length key")]
    InvalidListKey { key: String },

    #[error("the root node cannot be deleted")]
    RootDeletion,

    #[error("key {key:?} is already tracked")]
    KeyInUse { key: String },

    #[error("node {0} no longer exists")]
    StaleNode(NodeId),

    #[error("node {0} is not attached to the tree")]
    Detached(NodeId),

    #[error("node {node} is not a {expected}")]
    WrongKind { node: NodeId, expected: &'static str },

    #[error("list slots are removed by shrinking the list")]
    ListSlot,
}

impl TreeError {
    /// True for caller or codegen bugs, as opposed to bad input.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TreeError::Invalid(_) | TreeError::UntrackedKey { .. })
    }
}
