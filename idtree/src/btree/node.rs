//! In-memory node representations.
//!
//! Nodes reference each other only by [`NodeId`]. The methods here touch a
//! single node; anything that needs a parent or sibling lives in
//! `leaf.rs`/`internal.rs` and goes through the node cache.

use crate::btree::codec::{INTERNAL_ORDER, LEAF_ORDER};
use crate::btree::id::{NULL_ID, NodeId, NodeKind};

/// Keys are fixed-width unsigned integers.
pub type Key = u64;

/// Values are fixed-width unsigned integers.
pub type Value = u64;

/// Node capacities.
///
/// `leaf` is the most key/value pairs a leaf holds, `internal` the most
/// separator keys an internal node holds (it then has `internal + 1`
/// children). Both default to the largest values whose images fit one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orders {
    leaf: usize,
    internal: usize,
}

impl Orders {
    /// Page-derived orders.
    pub const PAGE: Self = Self {
        leaf: LEAF_ORDER,
        internal: INTERNAL_ORDER,
    };

    /// Smallest order accepted for either kind.
    pub const MIN_ORDER: usize = 3;

    /// Custom orders, for producing deep trees from few keys.
    ///
    /// Returns `None` unless both lie in `[MIN_ORDER, page-derived maximum]`.
    #[must_use]
    pub const fn new(leaf: usize, internal: usize) -> Option<Self> {
        if leaf < Self::MIN_ORDER
            || internal < Self::MIN_ORDER
            || leaf > LEAF_ORDER
            || internal > INTERNAL_ORDER
        {
            return None;
        }
        Some(Self { leaf, internal })
    }

    /// Maximum key/value pairs in a leaf.
    #[must_use]
    pub const fn leaf(&self) -> usize {
        self.leaf
    }

    /// Maximum separator keys in an internal node.
    #[must_use]
    pub const fn internal(&self) -> usize {
        self.internal
    }

    /// A non-root leaf with fewer pairs than this must rebalance.
    #[must_use]
    pub const fn leaf_min_keys(&self) -> usize {
        self.leaf / 2
    }

    /// Maximum children of an internal node.
    #[must_use]
    pub const fn internal_max_children(&self) -> usize {
        self.internal + 1
    }

    /// A non-root internal node with fewer children than this must rebalance.
    #[must_use]
    pub const fn internal_min_children(&self) -> usize {
        (self.internal + 1).div_ceil(2)
    }
}

impl Default for Orders {
    fn default() -> Self {
        Self::PAGE
    }
}

/// A leaf node.
///
/// Keys are strictly ascending and `keys.len() == vals.len()`. Leaves form a
/// doubly linked list in key order through `next_id`/`prev_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub next_id: NodeId,
    pub prev_id: NodeId,
    pub keys: Vec<Key>,
    pub vals: Vec<Value>,
}

impl LeafNode {
    /// Create an empty, unregistered leaf.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::new() is not const-stable here
    pub fn new(parent_id: NodeId) -> Self {
        Self {
            id: NULL_ID,
            parent_id,
            next_id: NULL_ID,
            prev_id: NULL_ID,
            keys: Vec::new(),
            vals: Vec::new(),
        }
    }

    /// Number of key/value pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the leaf holds no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Smallest key, if any.
    #[must_use]
    pub fn first_key(&self) -> Option<Key> {
        self.keys.first().copied()
    }

    /// Insertion index of `key` (first key >= target) and whether it matched exactly.
    #[must_use]
    pub fn find(&self, key: Key) -> (usize, bool) {
        match self.keys.binary_search(&key) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        }
    }

    /// Exact-match lookup.
    #[must_use]
    pub fn get(&self, key: Key) -> Option<Value> {
        match self.find(key) {
            (i, true) => Some(self.vals[i]),
            (_, false) => None,
        }
    }

    /// Insert or overwrite. Returns true if a new key was inserted.
    pub fn upsert(&mut self, key: Key, val: Value) -> bool {
        match self.find(key) {
            (i, true) => {
                self.vals[i] = val;
                false
            }
            (i, false) => {
                self.keys.insert(i, key);
                self.vals.insert(i, val);
                true
            }
        }
    }

    /// Remove `key`, returning the index it occupied.
    pub fn remove(&mut self, key: Key) -> Option<usize> {
        match self.find(key) {
            (i, true) => {
                self.keys.remove(i);
                self.vals.remove(i);
                Some(i)
            }
            (_, false) => None,
        }
    }

    /// Cut the leaf at its midpoint, returning the upper half.
    pub fn split_off_upper(&mut self) -> (Vec<Key>, Vec<Value>) {
        let mid = self.keys.len() / 2;
        (self.keys.split_off(mid), self.vals.split_off(mid))
    }

    /// Remove and return the smallest pair.
    pub fn pop_first(&mut self) -> Option<(Key, Value)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.vals.remove(0)))
    }

    /// Remove and return the largest pair.
    pub fn pop_last(&mut self) -> Option<(Key, Value)> {
        Some((self.keys.pop()?, self.vals.pop()?))
    }

    /// Take every pair, leaving the leaf empty.
    pub fn take_entries(&mut self) -> (Vec<Key>, Vec<Value>) {
        (std::mem::take(&mut self.keys), std::mem::take(&mut self.vals))
    }
}

/// An internal node.
///
/// Stores N separator keys and N+1 child IDs.
/// `child_ids[i]` holds keys < `keys[i]`,
/// `child_ids[i+1]` holds keys >= `keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub keys: Vec<Key>,
    pub child_ids: Vec<NodeId>,
}

impl InternalNode {
    /// Create an empty, unregistered internal node.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::new() is not const-stable here
    pub fn new(parent_id: NodeId) -> Self {
        Self {
            id: NULL_ID,
            parent_id,
            keys: Vec::new(),
            child_ids: Vec::new(),
        }
    }

    /// A parentless node over a single child, used when a root splits.
    #[must_use]
    pub fn with_child(child_id: NodeId) -> Self {
        Self {
            id: NULL_ID,
            parent_id: NULL_ID,
            keys: Vec::new(),
            child_ids: vec![child_id],
        }
    }

    /// Index of the child subtree that must contain `key`.
    #[must_use]
    pub fn find(&self, key: Key) -> usize {
        self.keys.partition_point(|&k| k <= key)
    }

    /// ID of the child subtree that must contain `key`.
    #[must_use]
    pub fn child_for(&self, key: Key) -> NodeId {
        self.child_ids[self.find(key)]
    }

    /// Position of `child_id` among the children.
    #[must_use]
    pub fn child_index(&self, child_id: NodeId) -> Option<usize> {
        self.child_ids.iter().position(|&c| c == child_id)
    }

    /// Insert `key` and `new_child` directly to the right of the child at `index`.
    pub fn insert_after(&mut self, index: usize, key: Key, new_child: NodeId) {
        self.keys.insert(index, key);
        self.child_ids.insert(index + 1, new_child);
    }

    /// Cut the node around its middle key.
    ///
    /// Returns the middle key, which leaves this node, along with the keys
    /// and children that move to a new right sibling.
    pub fn split_off_upper(&mut self) -> Option<(Key, Vec<Key>, Vec<NodeId>)> {
        let mid = self.keys.len() / 2;
        let upper_keys = self.keys.split_off(mid + 1);
        let promoted = self.keys.pop()?;
        let upper_children = self.child_ids.split_off(mid + 1);
        Some((promoted, upper_keys, upper_children))
    }

    /// Remove the separator at `key_index` and the child at `child_index`.
    pub fn remove_slot(&mut self, key_index: usize, child_index: usize) {
        self.keys.remove(key_index);
        self.child_ids.remove(child_index);
    }

    /// Rewrite the separator equal to `old`, if this node holds one.
    pub fn rewrite_separator(&mut self, old: Key, new: Key) -> bool {
        match self.keys.binary_search(&old) {
            Ok(i) => {
                self.keys[i] = new;
                true
            }
            Err(_) => false,
        }
    }

    /// Whether `key` belongs to an ancestor's separator range rather than this node's.
    #[must_use]
    pub fn defers_to_parent(&self, key: Key) -> bool {
        self.keys.first().is_none_or(|&first| key < first)
    }
}

/// A node of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    /// The node's kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Internal(_) => NodeKind::Internal,
            Self::Leaf(_) => NodeKind::Leaf,
        }
    }

    /// The node's ID (`NULL_ID` until registered).
    #[must_use]
    pub const fn id(&self) -> NodeId {
        match self {
            Self::Internal(n) => n.id,
            Self::Leaf(n) => n.id,
        }
    }

    pub(crate) const fn set_id(&mut self, id: NodeId) {
        match self {
            Self::Internal(n) => n.id = id,
            Self::Leaf(n) => n.id = id,
        }
    }

    /// The parent's ID (`NULL_ID` for the root).
    #[must_use]
    pub const fn parent_id(&self) -> NodeId {
        match self {
            Self::Internal(n) => n.parent_id,
            Self::Leaf(n) => n.parent_id,
        }
    }

    /// Point the node at a new parent.
    pub const fn set_parent_id(&mut self, parent_id: NodeId) {
        match self {
            Self::Internal(n) => n.parent_id = parent_id,
            Self::Leaf(n) => n.parent_id = parent_id,
        }
    }

    /// The node's keys (separators for internal nodes).
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        match self {
            Self::Internal(n) => &n.keys,
            Self::Leaf(n) => &n.keys,
        }
    }

    /// ID that should be root if this node was root before a delete.
    ///
    /// An internal node left without separators hands the root to its only
    /// child; an empty leaf empties the tree.
    #[must_use]
    pub fn new_root_id(&self) -> NodeId {
        match self {
            Self::Internal(n) if n.keys.is_empty() => {
                n.child_ids.first().copied().unwrap_or(NULL_ID)
            }
            Self::Internal(n) => n.id,
            Self::Leaf(n) if n.is_empty() => NULL_ID,
            Self::Leaf(n) => n.id,
        }
    }
}
