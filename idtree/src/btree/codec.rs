//! Binary node format.
//!
//! One node per page, all fields little-endian u64:
//!
//! ```text
//! internal: id | parent_id | child_count (N) | N x (key, child_id)
//! leaf:     id | parent_id | next_id | prev_id | val_count (N) | N x (key, val)
//! ```
//!
//! An internal node with N children has N-1 separators. It is written with
//! N pairs for a uniform stride; the key of the last pair is zero and is
//! dropped on decode. The kind is read from the tag bit of the ID field
//! (most significant bit of byte 7). There is no checksum or version: a
//! malformed page is a hard error.

use crate::btree::id::NodeKind;
use crate::btree::node::{InternalNode, LeafNode, Node};
use crate::storage::{PAGE_SIZE, Page};

const FIELD_SIZE: usize = 8;

/// Size of one (key, child) or (key, value) pair.
const PAIR_SIZE: usize = 2 * FIELD_SIZE;

/// id + `parent_id` + `child_count`.
const INTERNAL_FIXED_SIZE: usize = 3 * FIELD_SIZE;

/// Fixed fields plus the pair carrying the child beyond the last separator.
pub const INTERNAL_HEADER_SIZE: usize = INTERNAL_FIXED_SIZE + PAIR_SIZE;

/// id + `parent_id` + `next_id` + `prev_id` + `val_count`.
pub const LEAF_HEADER_SIZE: usize = 5 * FIELD_SIZE;

/// Most separator keys an internal node image can hold.
pub const INTERNAL_ORDER: usize = (PAGE_SIZE - INTERNAL_HEADER_SIZE) / PAIR_SIZE;

/// Most key/value pairs a leaf image can hold.
pub const LEAF_ORDER: usize = (PAGE_SIZE - LEAF_HEADER_SIZE) / PAIR_SIZE;

/// Byte holding the tag bit of the ID field.
const TAG_BYTE: usize = 7;

/// Errors from encoding or decoding a node image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ends before the image does.
    ShortBuffer { needed: usize, actual: usize },
    /// The count field is zero (internal) or beyond what a page can hold.
    InvalidCount {
        kind: NodeKind,
        count: u64,
        max: usize,
    },
    /// The node has more entries than one page can hold.
    Overfull {
        kind: NodeKind,
        count: usize,
        max: usize,
    },
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortBuffer { needed, actual } => {
                write!(f, "short buffer: need {needed} bytes, got {actual}")
            }
            Self::InvalidCount { kind, count, max } => {
                write!(f, "invalid {kind} entry count {count} (max {max})")
            }
            Self::Overfull { kind, count, max } => {
                write!(f, "{kind} node has {count} entries, a page holds {max}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Encode a node into a fresh page image.
pub fn encode(node: &Node) -> Result<Page, CodecError> {
    match node {
        Node::Internal(n) => encode_internal(n),
        Node::Leaf(n) => encode_leaf(n),
    }
}

/// Decode a node image, dispatching on the ID's tag bit.
pub fn decode(bytes: &[u8]) -> Result<Node, CodecError> {
    require(bytes, FIELD_SIZE)?;
    if bytes[TAG_BYTE] & 0x80 == 0 {
        decode_internal(bytes).map(Node::Internal)
    } else {
        decode_leaf(bytes).map(Node::Leaf)
    }
}

fn encode_internal(node: &InternalNode) -> Result<Page, CodecError> {
    let count = node.child_ids.len();
    if count > INTERNAL_ORDER + 1 {
        return Err(CodecError::Overfull {
            kind: NodeKind::Internal,
            count,
            max: INTERNAL_ORDER + 1,
        });
    }

    let mut page = Page::new();
    page.write_u64(0, node.id);
    page.write_u64(8, node.parent_id);
    page.write_u64(16, count as u64);

    let mut offset = INTERNAL_FIXED_SIZE;
    for (i, &child_id) in node.child_ids.iter().enumerate() {
        page.write_u64(offset, node.keys.get(i).copied().unwrap_or(0));
        page.write_u64(offset + FIELD_SIZE, child_id);
        offset += PAIR_SIZE;
    }

    Ok(page)
}

fn encode_leaf(node: &LeafNode) -> Result<Page, CodecError> {
    let count = node.keys.len();
    if count > LEAF_ORDER {
        return Err(CodecError::Overfull {
            kind: NodeKind::Leaf,
            count,
            max: LEAF_ORDER,
        });
    }

    let mut page = Page::new();
    page.write_u64(0, node.id);
    page.write_u64(8, node.parent_id);
    page.write_u64(16, node.next_id);
    page.write_u64(24, node.prev_id);
    page.write_u64(32, count as u64);

    let mut offset = LEAF_HEADER_SIZE;
    for (&key, &val) in node.keys.iter().zip(&node.vals) {
        page.write_u64(offset, key);
        page.write_u64(offset + FIELD_SIZE, val);
        offset += PAIR_SIZE;
    }

    Ok(page)
}

fn decode_internal(bytes: &[u8]) -> Result<InternalNode, CodecError> {
    require(bytes, INTERNAL_FIXED_SIZE)?;
    let raw_count = read_u64(bytes, 16);
    let count = checked_count(NodeKind::Internal, raw_count, INTERNAL_ORDER + 1)?;
    if count == 0 {
        return Err(CodecError::InvalidCount {
            kind: NodeKind::Internal,
            count: raw_count,
            max: INTERNAL_ORDER + 1,
        });
    }
    require(bytes, INTERNAL_FIXED_SIZE + count * PAIR_SIZE)?;

    let mut node = InternalNode::new(read_u64(bytes, 8));
    node.id = read_u64(bytes, 0);
    node.keys.reserve(count - 1);
    node.child_ids.reserve(count);

    let mut offset = INTERNAL_FIXED_SIZE;
    for i in 0..count {
        if i + 1 < count {
            node.keys.push(read_u64(bytes, offset));
        }
        node.child_ids.push(read_u64(bytes, offset + FIELD_SIZE));
        offset += PAIR_SIZE;
    }

    Ok(node)
}

fn decode_leaf(bytes: &[u8]) -> Result<LeafNode, CodecError> {
    require(bytes, LEAF_HEADER_SIZE)?;
    let count = checked_count(NodeKind::Leaf, read_u64(bytes, 32), LEAF_ORDER)?;
    require(bytes, LEAF_HEADER_SIZE + count * PAIR_SIZE)?;

    let mut node = LeafNode::new(read_u64(bytes, 8));
    node.id = read_u64(bytes, 0);
    node.next_id = read_u64(bytes, 16);
    node.prev_id = read_u64(bytes, 24);
    node.keys.reserve(count);
    node.vals.reserve(count);

    let mut offset = LEAF_HEADER_SIZE;
    for _ in 0..count {
        node.keys.push(read_u64(bytes, offset));
        node.vals.push(read_u64(bytes, offset + FIELD_SIZE));
        offset += PAIR_SIZE;
    }

    Ok(node)
}

fn checked_count(kind: NodeKind, count: u64, max: usize) -> Result<usize, CodecError> {
    usize::try_from(count)
        .ok()
        .filter(|&c| c <= max)
        .ok_or(CodecError::InvalidCount { kind, count, max })
}

const fn require(bytes: &[u8], needed: usize) -> Result<(), CodecError> {
    if bytes.len() < needed {
        return Err(CodecError::ShortBuffer {
            needed,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; FIELD_SIZE];
    buf.copy_from_slice(&bytes[offset..offset + FIELD_SIZE]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::id::{NodeKind, make_id};

    fn sample_internal() -> InternalNode {
        let mut node = InternalNode::new(3);
        node.id = make_id(NodeKind::Internal, 7);
        node.keys = vec![10, 20, 30];
        node.child_ids = vec![
            make_id(NodeKind::Leaf, 1),
            make_id(NodeKind::Leaf, 2),
            make_id(NodeKind::Leaf, 3),
            make_id(NodeKind::Leaf, 4),
        ];
        node
    }

    fn sample_leaf() -> LeafNode {
        let mut node = LeafNode::new(make_id(NodeKind::Internal, 2));
        node.id = make_id(NodeKind::Leaf, 9);
        node.next_id = make_id(NodeKind::Leaf, 10);
        node.prev_id = make_id(NodeKind::Leaf, 8);
        node.keys = vec![1, 5, 9];
        node.vals = vec![100, 500, 900];
        node
    }

    #[test]
    fn test_orders_fit_one_page() {
        assert_eq!(INTERNAL_ORDER, 253);
        assert_eq!(LEAF_ORDER, 253);
        assert!(INTERNAL_FIXED_SIZE + (INTERNAL_ORDER + 1) * PAIR_SIZE <= PAGE_SIZE);
        assert!(LEAF_HEADER_SIZE + LEAF_ORDER * PAIR_SIZE <= PAGE_SIZE);
    }

    #[test]
    fn test_internal_layout() {
        let page = encode(&Node::Internal(sample_internal())).expect("encode");
        assert_eq!(page.read_u64(0), 7);
        assert_eq!(page.read_u64(8), 3);
        assert_eq!(page.read_u64(16), 4, "child count");
        assert_eq!(page.read_u64(24), 10);
        assert_eq!(page.read_u64(32), make_id(NodeKind::Leaf, 1));
        // Last pair: padding key, real child.
        assert_eq!(page.read_u64(24 + 3 * 16), 0);
        assert_eq!(page.read_u64(24 + 3 * 16 + 8), make_id(NodeKind::Leaf, 4));
        assert_eq!(page.as_bytes()[7] & 0x80, 0);
    }

    #[test]
    fn test_leaf_layout() {
        let page = encode(&Node::Leaf(sample_leaf())).expect("encode");
        assert_eq!(page.read_u64(0), make_id(NodeKind::Leaf, 9));
        assert_eq!(page.read_u64(16), make_id(NodeKind::Leaf, 10), "next");
        assert_eq!(page.read_u64(24), make_id(NodeKind::Leaf, 8), "prev");
        assert_eq!(page.read_u64(32), 3);
        assert_eq!(page.read_u64(40), 1);
        assert_eq!(page.read_u64(48), 100);
        assert_eq!(page.as_bytes()[7] & 0x80, 0x80);
    }

    #[test]
    fn test_internal_roundtrip() {
        let node = Node::Internal(sample_internal());
        let page = encode(&node).expect("encode");
        let decoded = decode(page.as_bytes()).expect("decode");
        assert_eq!(decoded, node);

        let again = encode(&decoded).expect("re-encode");
        assert_eq!(again.as_bytes(), page.as_bytes());
    }

    #[test]
    fn test_leaf_roundtrip() {
        let node = Node::Leaf(sample_leaf());
        let page = encode(&node).expect("encode");
        let decoded = decode(page.as_bytes()).expect("decode");
        assert_eq!(decoded, node);

        let again = encode(&decoded).expect("re-encode");
        assert_eq!(again.as_bytes(), page.as_bytes());
    }

    #[test]
    fn test_full_nodes_roundtrip() {
        let mut leaf = sample_leaf();
        leaf.keys = (0..LEAF_ORDER as u64).collect();
        leaf.vals = (0..LEAF_ORDER as u64).map(|k| k + 1).collect();
        let node = Node::Leaf(leaf);
        let decoded = decode(encode(&node).expect("encode").as_bytes()).expect("decode");
        assert_eq!(decoded, node);

        let mut internal = sample_internal();
        internal.keys = (1..=INTERNAL_ORDER as u64).collect();
        internal.child_ids = (1..=INTERNAL_ORDER as u64 + 1)
            .map(|s| make_id(NodeKind::Leaf, s))
            .collect();
        let node = Node::Internal(internal);
        let decoded = decode(encode(&node).expect("encode").as_bytes()).expect("decode");
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_overfull_is_rejected() {
        let mut leaf = sample_leaf();
        leaf.keys = (0..=LEAF_ORDER as u64).collect();
        leaf.vals = leaf.keys.clone();
        assert!(matches!(
            encode(&Node::Leaf(leaf)),
            Err(CodecError::Overfull {
                kind: NodeKind::Leaf,
                ..
            })
        ));

        let mut internal = sample_internal();
        internal.child_ids = vec![1; INTERNAL_ORDER + 2];
        assert!(matches!(
            encode(&Node::Internal(internal)),
            Err(CodecError::Overfull {
                kind: NodeKind::Internal,
                ..
            })
        ));
    }

    #[test]
    fn test_short_buffers() {
        assert!(matches!(decode(&[0u8; 4]), Err(CodecError::ShortBuffer { .. })));

        let page = encode(&Node::Leaf(sample_leaf())).expect("encode");
        let truncated = &page.as_bytes()[..LEAF_HEADER_SIZE + PAIR_SIZE];
        assert_eq!(
            decode(truncated),
            Err(CodecError::ShortBuffer {
                needed: LEAF_HEADER_SIZE + 3 * PAIR_SIZE,
                actual: LEAF_HEADER_SIZE + PAIR_SIZE,
            })
        );

        let page = encode(&Node::Internal(sample_internal())).expect("encode");
        let header = &page.as_bytes()[..20];
        assert!(matches!(decode(header), Err(CodecError::ShortBuffer { .. })));
    }

    #[test]
    fn test_malformed_counts() {
        let mut page = encode(&Node::Leaf(sample_leaf())).expect("encode");
        page.write_u64(32, LEAF_ORDER as u64 + 1);
        assert!(matches!(
            decode(page.as_bytes()),
            Err(CodecError::InvalidCount {
                kind: NodeKind::Leaf,
                ..
            })
        ));

        let mut page = encode(&Node::Internal(sample_internal())).expect("encode");
        page.write_u64(16, 0);
        assert!(matches!(
            decode(page.as_bytes()),
            Err(CodecError::InvalidCount {
                kind: NodeKind::Internal,
                count: 0,
                ..
            })
        ));
        page.write_u64(16, u64::MAX);
        assert!(matches!(
            decode(page.as_bytes()),
            Err(CodecError::InvalidCount { .. })
        ));
    }
}
