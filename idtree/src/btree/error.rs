//! Errors surfaced by tree and cache operations.

use crate::btree::codec::CodecError;
use crate::btree::id::{NodeId, NodeKind};
use crate::storage::StorageError;

/// Errors that can occur during B-tree operations.
///
/// A missing key is not an error; lookups and deletes report it as
/// `None`/`false`.
#[derive(Debug)]
pub enum BTreeError {
    /// The ID counter for this kind has no values left.
    AllocationExhausted(NodeKind),
    /// A referenced node is neither resident nor on storage.
    MissingNode(NodeId),
    /// A referenced node exists but is of the other kind.
    WrongNodeKind { id: NodeId, expected: NodeKind },
    /// A page decoded to a node with a different ID than the one requested.
    IdMismatch { expected: NodeId, found: NodeId },
    /// Storage I/O error.
    Storage(StorageError),
    /// Malformed page image.
    Codec(CodecError),
    /// Structural invariant violated (reported by `verify` only).
    Invariant(String),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllocationExhausted(kind) => write!(f, "{kind} node IDs exhausted"),
            Self::MissingNode(id) => write!(f, "node {id:#x} not found"),
            Self::WrongNodeKind { id, expected } => {
                write!(f, "node {id:#x} is not a {expected} node")
            }
            Self::IdMismatch { expected, found } => {
                write!(f, "page for node {expected:#x} holds node {found:#x}")
            }
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Invariant(msg) => write!(f, "invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::AllocationExhausted(_)
            | Self::MissingNode(_)
            | Self::WrongNodeKind { .. }
            | Self::IdMismatch { .. }
            | Self::Invariant(_) => None,
        }
    }
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<CodecError> for BTreeError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}
