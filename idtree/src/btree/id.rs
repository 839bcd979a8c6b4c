//! Node IDs.
//!
//! A node ID is a `u64`. `0` is the null reference. The most significant bit
//! tags the kind: clear for internal nodes, set for leaves. Each kind draws
//! from its own counter, so the low 63 bits are a per-kind sequence number
//! starting at 1.

use crate::storage::PageIndex;

/// A node identifier.
pub type NodeId = u64;

/// The null node reference.
pub const NULL_ID: NodeId = 0;

/// Tag bit marking a leaf ID.
pub const LEAF_TAG: NodeId = 1 << 63;

/// Largest sequence number either namespace can hand out.
pub const MAX_SEQUENCE: u64 = LEAF_TAG - 1;

/// The two node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Internal,
    Leaf,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Leaf => write!(f, "leaf"),
        }
    }
}

/// Kind encoded in an ID's tag bit.
#[must_use]
pub const fn kind_of(id: NodeId) -> NodeKind {
    if id & LEAF_TAG == 0 {
        NodeKind::Internal
    } else {
        NodeKind::Leaf
    }
}

/// Per-kind sequence number (the ID without its tag bit).
#[must_use]
pub const fn sequence(id: NodeId) -> u64 {
    id & !LEAF_TAG
}

/// Build an ID from a kind and a sequence number.
#[must_use]
pub const fn make_id(kind: NodeKind, sequence: u64) -> NodeId {
    match kind {
        NodeKind::Internal => sequence,
        NodeKind::Leaf => sequence | LEAF_TAG,
    }
}

/// True iff `id` can name a node: nonzero and not the bare leaf tag.
#[must_use]
pub const fn is_valid(id: NodeId) -> bool {
    sequence(id) != 0
}

/// Page holding the node with this ID.
///
/// The namespaces interleave: internal sequence `n` maps to page `2(n-1)`,
/// leaf sequence `n` to page `2(n-1)+1`. Only meaningful for valid IDs.
#[must_use]
pub const fn page_index(id: NodeId) -> PageIndex {
    let slot = (sequence(id) - 1) * 2;
    match kind_of(id) {
        NodeKind::Internal => slot,
        NodeKind::Leaf => slot + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tagging() {
        assert_eq!(kind_of(1), NodeKind::Internal);
        assert_eq!(kind_of(MAX_SEQUENCE), NodeKind::Internal);
        assert_eq!(kind_of(LEAF_TAG | 1), NodeKind::Leaf);
        assert_eq!(kind_of(u64::MAX), NodeKind::Leaf);

        assert_eq!(make_id(NodeKind::Leaf, 5), LEAF_TAG | 5);
        assert_eq!(sequence(make_id(NodeKind::Leaf, 5)), 5);
        assert_eq!(make_id(NodeKind::Internal, 5), 5);
    }

    #[test]
    fn test_validity() {
        assert!(!is_valid(NULL_ID));
        assert!(!is_valid(LEAF_TAG));
        assert!(is_valid(1));
        assert!(is_valid(LEAF_TAG | 1));
        assert!(is_valid(u64::MAX));
    }

    fn first_pages(kind: NodeKind) -> Vec<PageIndex> {
        (1..=4).map(|s| page_index(make_id(kind, s))).collect()
    }

    #[test]
    fn test_page_index_is_dense_and_disjoint() {
        assert_eq!(first_pages(NodeKind::Internal), vec![0, 2, 4, 6]);
        assert_eq!(first_pages(NodeKind::Leaf), vec![1, 3, 5, 7]);
    }
}
