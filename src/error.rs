use crate::block::{BlockId, BlockKind};

/// Errors reported by [`BlockGraph`](crate::BlockGraph) mutations.
///
/// Every variant leaves the graph untouched: a failed call is a no-op.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("block not found: {0}")]
    UnknownBlock(BlockId),

    #[error("{what} references missing block {target}")]
    MissingReference { what: String, target: BlockId },

    #[error("{kind} block {block} cannot take role {role}: {reason}")]
    IncompatibleKind {
        block: BlockId,
        kind: BlockKind,
        role: String,
        reason: String,
    },

    #[error("placing {block} under {target} would create a cycle")]
    WouldCreateCycle { block: BlockId, target: BlockId },

    #[error("block {block} has no slot named '{slot}'")]
    UnknownSlot { block: BlockId, slot: String },

    #[error("{role} is already occupied by {occupant}")]
    Occupied { role: String, occupant: BlockId },

    #[error("block {0} already exists")]
    DuplicateBlock(BlockId),

    #[error("block {block} does not support {operation}")]
    NotEditable { block: BlockId, operation: &'static str },
}

impl GraphError {
    /// True for the compatibility failures the engine silently skips.
    pub fn is_incompatible(&self) -> bool {
        matches!(
            self,
            GraphError::IncompatibleKind { .. } | GraphError::WouldCreateCycle { .. }
        )
    }
}

/// Reasons a workspace snapshot import is rejected.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
