//! The tree facade: a root ID and a size counter over a node cache.
//!
//! # State
//!
//! The tree is empty iff `root_id == NULL_ID`. `set` on an empty tree
//! allocates a root leaf. After every `set` the root is re-derived by
//! climbing parent pointers from the old root (splits may have grown the
//! tree). After every `delete` the root is re-derived with
//! `Node::new_root_id` until it settles (merges may have shrunk the tree),
//! and the new root's parent is cleared.
//!
//! # Persistence
//!
//! Root ID, size and ID counters are not stored in the page file. Callers
//! that reopen a store keep the `TreeMeta` from `meta()` themselves.

use crate::btree::cache::{IdCounters, NodeCache};
use crate::btree::error::BTreeError;
use crate::btree::id::{NULL_ID, NodeId};
use crate::btree::internal;
use crate::btree::node::{Key, LeafNode, Node, Value};
use crate::btree::verify::{self, TreeStats};
use crate::storage::StorageManager;

/// Everything needed to reattach a tree to a flushed store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMeta {
    /// Root node, `NULL_ID` if empty.
    pub root_id: NodeId,
    /// Number of keys.
    pub size: u64,
    /// ID allocation state.
    pub counters: IdCounters,
}

/// A B+tree of `u64` keys and values over a node cache.
pub struct BTree<S> {
    cache: NodeCache<S>,
    root_id: NodeId,
    size: u64,
}

impl<S: StorageManager> BTree<S> {
    /// Create an empty tree. The cache should not hold nodes of another tree.
    pub const fn new(cache: NodeCache<S>) -> Self {
        Self {
            cache,
            root_id: NULL_ID,
            size: 0,
        }
    }

    /// Reattach to a tree whose cache was resumed from `meta.counters`.
    pub const fn open(cache: NodeCache<S>, meta: TreeMeta) -> Self {
        Self {
            cache,
            root_id: meta.root_id,
            size: meta.size,
        }
    }

    /// Root node ID, `NULL_ID` when empty.
    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        self.root_id
    }

    /// Number of keys.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.size
    }

    /// Whether the tree holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root_id == NULL_ID
    }

    /// State to pass to `open` after a `flush`.
    #[must_use]
    pub const fn meta(&self) -> TreeMeta {
        TreeMeta {
            root_id: self.root_id,
            size: self.size,
            counters: self.cache.counters(),
        }
    }

    /// The node cache.
    #[must_use]
    pub const fn cache(&self) -> &NodeCache<S> {
        &self.cache
    }

    /// Give up the tree, returning its cache. Unflushed changes stay in the cache.
    pub fn into_cache(self) -> NodeCache<S> {
        self.cache
    }

    /// Look up `key`.
    pub fn get(&mut self, key: Key) -> Result<Option<Value>, BTreeError> {
        if self.root_id == NULL_ID {
            return Ok(None);
        }
        internal::get(&mut self.cache, self.root_id, key)
    }

    /// Insert or overwrite `key`. Returns true if the key is new.
    pub fn set(&mut self, key: Key, val: Value) -> Result<bool, BTreeError> {
        if self.root_id == NULL_ID {
            self.root_id = self.cache.register(Node::Leaf(LeafNode::new(NULL_ID)))?;
            tracing::debug!(root = self.root_id, "allocated root leaf");
        }

        // Re-derive the root even after a failed insert, but report the insert's error.
        let outcome = internal::set(&mut self.cache, self.root_id, key, val);
        let climbed = self.climb_to_root();
        let inserted = outcome?;
        climbed?;
        if inserted {
            self.size += 1;
        }
        Ok(inserted)
    }

    /// Remove `key`. Returns true if it was present.
    pub fn delete(&mut self, key: Key) -> Result<bool, BTreeError> {
        if self.root_id == NULL_ID {
            return Ok(false);
        }

        let outcome = internal::delete(&mut self.cache, self.root_id, key);
        let settled = self.settle_root();
        let removed = outcome?;
        settled?;
        if removed {
            self.size -= 1;
        }
        Ok(removed)
    }

    /// Values with keys in `[start, end)`, in key order.
    pub fn get_range(&mut self, start: Key, end: Key) -> Result<Vec<Value>, BTreeError> {
        if self.root_id == NULL_ID {
            return Ok(Vec::new());
        }
        internal::get_range(&mut self.cache, self.root_id, start, end)
    }

    /// Every value, in key order.
    pub fn traverse(&mut self) -> Result<Vec<Value>, BTreeError> {
        if self.root_id == NULL_ID {
            return Ok(Vec::new());
        }
        internal::traverse(&mut self.cache, self.root_id)
    }

    /// Write every dirty node to storage and sync.
    pub fn flush(&mut self) -> Result<(), BTreeError> {
        self.cache.flush()
    }

    /// Full consistency check. Visits every node.
    pub fn verify(&mut self) -> Result<TreeStats, BTreeError> {
        verify::verify(&mut self.cache, self.root_id, self.size)
    }

    /// Depth-first dump, parents before children.
    pub fn describe<F: FnMut(usize, &Node)>(&mut self, visit: F) -> Result<(), BTreeError> {
        verify::describe(&mut self.cache, self.root_id, visit)
    }

    /// Follow parent pointers up from the current root.
    fn climb_to_root(&mut self) -> Result<(), BTreeError> {
        let mut current = self.root_id;
        loop {
            let parent = self.cache.node(current)?.parent_id();
            if parent == NULL_ID {
                break;
            }
            current = parent;
        }
        if current != self.root_id {
            tracing::debug!(old = self.root_id, new = current, "tree grew");
            self.root_id = current;
        }
        Ok(())
    }

    /// Replace a root left without separators (or keys) until it settles.
    fn settle_root(&mut self) -> Result<(), BTreeError> {
        loop {
            let next = self.cache.node(self.root_id)?.new_root_id();
            if next == self.root_id {
                return Ok(());
            }

            tracing::debug!(old = self.root_id, new = next, "tree shrank");
            self.cache.discard(self.root_id);
            self.root_id = next;
            if next == NULL_ID {
                return Ok(());
            }
            self.cache.set_parent(next, NULL_ID)?;
        }
    }
}

impl<S> std::fmt::Debug for BTree<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("root_id", &self.root_id)
            .field("size", &self.size)
            .field("cache", &self.cache)
            .finish()
    }
}
