//! Node cache: the directory from node IDs to live nodes.
//!
//! The cache owns every resident node and is the only place IDs are handed
//! out. Nodes never hold references to each other, only IDs, so any node can
//! be evicted and later reloaded without invalidating anything.
//!
//! # Design
//!
//! - Resident nodes sit in an LRU keyed by ID, each with a dirty flag
//! - Mutable access marks a node dirty
//! - When bounded and full, the least recently used node is written back
//!   (if dirty) and dropped before a new one is admitted
//! - A miss on an allocated ID reads the node's page and decodes it
//!
//! # Invariants
//!
//! - `next_internal` / `next_leaf` only grow; an ID is allocated iff its
//!   sequence is below the counter for its kind
//! - A failed allocation consumes nothing

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::btree::codec;
use crate::btree::error::BTreeError;
use crate::btree::id::{self, MAX_SEQUENCE, NULL_ID, NodeId, NodeKind};
use crate::btree::node::{InternalNode, LeafNode, Node, Orders};
use crate::storage::StorageManager;

/// Smallest resident-set bound accepted for a bounded cache.
pub const MIN_CACHE_CAPACITY: usize = 8;

/// Node cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheConfig {
    /// Maximum resident nodes; `None` keeps everything resident.
    pub capacity: Option<NonZeroUsize>,
    /// Node capacities.
    pub orders: Orders,
}

impl CacheConfig {
    /// Bounded cache holding at most `capacity` nodes (at least `MIN_CACHE_CAPACITY`).
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: NonZeroUsize::new(capacity.max(MIN_CACHE_CAPACITY)),
            orders: Orders::PAGE,
        }
    }

    /// Same configuration with different orders.
    #[must_use]
    pub const fn with_orders(mut self, orders: Orders) -> Self {
        self.orders = orders;
        self
    }
}

/// ID allocation state, persisted by whoever owns the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdCounters {
    /// Sequence the next internal node will get.
    pub next_internal: u64,
    /// Sequence the next leaf will get.
    pub next_leaf: u64,
}

impl IdCounters {
    const fn next(&self, kind: NodeKind) -> u64 {
        match kind {
            NodeKind::Internal => self.next_internal,
            NodeKind::Leaf => self.next_leaf,
        }
    }

    const fn advance(&mut self, kind: NodeKind) {
        match kind {
            NodeKind::Internal => self.next_internal += 1,
            NodeKind::Leaf => self.next_leaf += 1,
        }
    }
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            next_internal: 1,
            next_leaf: 1,
        }
    }
}

#[derive(Debug)]
struct Entry {
    node: Node,
    dirty: bool,
}

/// Directory mapping node IDs to live nodes, backed by a storage manager.
pub struct NodeCache<S> {
    storage: S,
    nodes: LruCache<NodeId, Entry>,
    counters: IdCounters,
    orders: Orders,
}

impl<S: StorageManager> NodeCache<S> {
    /// Create a cache over an empty store.
    pub fn new(storage: S, config: CacheConfig) -> Self {
        Self::resume(storage, config, IdCounters::default())
    }

    /// Create a cache over a store whose nodes were allocated up to `counters`.
    pub fn resume(storage: S, config: CacheConfig, counters: IdCounters) -> Self {
        let nodes = config
            .capacity
            .map_or_else(LruCache::unbounded, LruCache::new);
        Self {
            storage,
            nodes,
            counters,
            orders: config.orders,
        }
    }

    /// Node capacities in effect.
    #[must_use]
    pub const fn orders(&self) -> Orders {
        self.orders
    }

    /// Current allocation state.
    #[must_use]
    pub const fn counters(&self) -> IdCounters {
        self.counters
    }

    /// Number of resident nodes.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.nodes.len()
    }

    /// The backing store.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Give up the cache, returning the backing store. Unflushed changes are lost.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// True iff `id` is nonzero and not a reserved sentinel.
    #[must_use]
    pub const fn is_valid(&self, id: NodeId) -> bool {
        id::is_valid(id)
    }

    /// True iff `id` is valid and its sequence has been handed out.
    #[must_use]
    pub const fn is_allocated(&self, id: NodeId) -> bool {
        self.is_valid(id) && id::sequence(id) < self.counters.next(id::kind_of(id))
    }

    /// Fail unless `count` more IDs of `kind` can still be allocated.
    pub const fn check_available(&self, kind: NodeKind, count: u64) -> Result<(), BTreeError> {
        let next = self.counters.next(kind);
        if next.saturating_add(count.saturating_sub(1)) > MAX_SEQUENCE {
            return Err(BTreeError::AllocationExhausted(kind));
        }
        Ok(())
    }

    /// Assign a fresh ID to `node`, store it, and return the ID.
    pub fn register(&mut self, mut node: Node) -> Result<NodeId, BTreeError> {
        let kind = node.kind();
        self.check_available(kind, 1)?;

        let id = id::make_id(kind, self.counters.next(kind));
        self.admit(id)?;
        self.counters.advance(kind);
        node.set_id(id);
        self.nodes.put(id, Entry { node, dirty: true });
        Ok(id)
    }

    /// Resolve an ID to a node. `NULL_ID` and unallocated IDs resolve to `None`.
    pub fn get(&mut self, id: NodeId) -> Result<Option<&Node>, BTreeError> {
        if !self.ensure_resident(id)? {
            return Ok(None);
        }
        Ok(self.nodes.get(&id).map(|e| &e.node))
    }

    /// Resolve an ID to a node for modification, marking it dirty.
    pub fn get_mut(&mut self, id: NodeId) -> Result<Option<&mut Node>, BTreeError> {
        if !self.ensure_resident(id)? {
            return Ok(None);
        }
        Ok(self.nodes.get_mut(&id).map(|e| {
            e.dirty = true;
            &mut e.node
        }))
    }

    /// Resolve an ID that must exist.
    pub fn node(&mut self, id: NodeId) -> Result<&Node, BTreeError> {
        self.get(id)?.ok_or(BTreeError::MissingNode(id))
    }

    /// Resolve an ID that must exist, for modification.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, BTreeError> {
        self.get_mut(id)?.ok_or(BTreeError::MissingNode(id))
    }

    /// Resolve an ID that must name a leaf.
    pub fn leaf(&mut self, id: NodeId) -> Result<&LeafNode, BTreeError> {
        match self.node(id)? {
            Node::Leaf(n) => Ok(n),
            Node::Internal(_) => Err(wrong_kind(id, NodeKind::Leaf)),
        }
    }

    /// Resolve an ID that must name a leaf, for modification.
    pub fn leaf_mut(&mut self, id: NodeId) -> Result<&mut LeafNode, BTreeError> {
        match self.node_mut(id)? {
            Node::Leaf(n) => Ok(n),
            Node::Internal(_) => Err(wrong_kind(id, NodeKind::Leaf)),
        }
    }

    /// Resolve an ID that must name an internal node.
    pub fn internal(&mut self, id: NodeId) -> Result<&InternalNode, BTreeError> {
        match self.node(id)? {
            Node::Internal(n) => Ok(n),
            Node::Leaf(_) => Err(wrong_kind(id, NodeKind::Internal)),
        }
    }

    /// Resolve an ID that must name an internal node, for modification.
    pub fn internal_mut(&mut self, id: NodeId) -> Result<&mut InternalNode, BTreeError> {
        match self.node_mut(id)? {
            Node::Internal(n) => Ok(n),
            Node::Leaf(_) => Err(wrong_kind(id, NodeKind::Internal)),
        }
    }

    /// Point a node of either kind at a new parent.
    pub fn set_parent(&mut self, id: NodeId, parent_id: NodeId) -> Result<(), BTreeError> {
        self.node_mut(id)?.set_parent_id(parent_id);
        Ok(())
    }

    /// Drop a node that is no longer part of the tree. Its page is not reclaimed.
    pub fn discard(&mut self, id: NodeId) {
        self.nodes.pop(&id);
    }

    /// Write every dirty resident node back and sync the store.
    pub fn flush(&mut self) -> Result<(), BTreeError> {
        let mut written = 0usize;
        for (&id, entry) in &mut self.nodes {
            if entry.dirty {
                write_back(&mut self.storage, id, &entry.node)?;
                entry.dirty = false;
                written += 1;
            }
        }
        self.storage.sync()?;
        tracing::debug!(written, "flushed node cache");
        Ok(())
    }

    /// Make `id` resident if it is allocated, reading it from storage on a miss.
    fn ensure_resident(&mut self, id: NodeId) -> Result<bool, BTreeError> {
        if !self.is_allocated(id) {
            return Ok(false);
        }
        if self.nodes.contains(&id) {
            return Ok(true);
        }
        self.load(id)
    }

    /// Materialize a node from its page. A page never written reads as absent.
    fn load(&mut self, id: NodeId) -> Result<bool, BTreeError> {
        let page = self.storage.read_page(id::page_index(id))?;
        if page.read_u64(0) == NULL_ID {
            return Ok(false);
        }

        let node = codec::decode(page.as_bytes())?;
        if node.id() != id {
            return Err(BTreeError::IdMismatch {
                expected: id,
                found: node.id(),
            });
        }

        tracing::trace!(id, "materialized node from storage");
        self.admit(id)?;
        self.nodes.put(id, Entry { node, dirty: false });
        Ok(true)
    }

    /// Make room for `id`, writing back the least recently used node if needed.
    fn admit(&mut self, id: NodeId) -> Result<(), BTreeError> {
        if self.nodes.len() < self.nodes.cap().get() || self.nodes.contains(&id) {
            return Ok(());
        }
        if let Some((&victim, entry)) = self.nodes.peek_lru() {
            if entry.dirty {
                tracing::debug!(victim, "writing back evicted node");
                write_back(&mut self.storage, victim, &entry.node)?;
            }
            self.nodes.pop_lru();
        }
        Ok(())
    }
}

impl<S> std::fmt::Debug for NodeCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("resident", &self.nodes.len())
            .field("counters", &self.counters)
            .field("orders", &self.orders)
            .finish_non_exhaustive()
    }
}

fn write_back<S: StorageManager>(
    storage: &mut S,
    id: NodeId,
    node: &Node,
) -> Result<(), BTreeError> {
    let page = codec::encode(node)?;
    storage.write_page(id::page_index(id), &page)?;
    Ok(())
}

const fn wrong_kind(id: NodeId, expected: NodeKind) -> BTreeError {
    BTreeError::WrongNodeKind { id, expected }
}
