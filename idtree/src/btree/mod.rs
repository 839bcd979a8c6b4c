//! B+tree over a page store, with nodes addressed by ID.
//!
//! Nodes never point at each other directly. Parent, child and sibling links
//! are [`NodeId`]s resolved through a [`NodeCache`], which owns every live
//! node, hands out IDs, and pages nodes in and out through a
//! [`StorageManager`](crate::storage::StorageManager).
//!
//! # Usage
//!
//! ```
//! use idtree::btree::{BTree, CacheConfig, NodeCache};
//! use idtree::storage::MemoryStorage;
//!
//! let cache = NodeCache::new(MemoryStorage::new(1), CacheConfig::default());
//! let mut tree = BTree::new(cache);
//!
//! tree.set(3, 30).unwrap();
//! tree.set(1, 10).unwrap();
//! tree.set(2, 20).unwrap();
//!
//! assert_eq!(tree.get(2).unwrap(), Some(20));
//! assert_eq!(tree.get_range(1, 3).unwrap(), vec![10, 20]);
//! assert!(tree.delete(1).unwrap());
//! assert_eq!(tree.traverse().unwrap(), vec![20, 30]);
//! ```

mod cache;
mod codec;
mod error;
mod id;
mod internal;
mod leaf;
mod node;
mod tree;
mod verify;

pub use cache::{CacheConfig, IdCounters, MIN_CACHE_CAPACITY, NodeCache};
pub use codec::{
    CodecError, INTERNAL_HEADER_SIZE, INTERNAL_ORDER, LEAF_HEADER_SIZE, LEAF_ORDER, decode, encode,
};
pub use error::BTreeError;
pub use id::{
    LEAF_TAG, MAX_SEQUENCE, NULL_ID, NodeId, NodeKind, is_valid, kind_of, make_id, page_index,
    sequence,
};
pub use node::{InternalNode, Key, LeafNode, Node, Orders, Value};
pub use tree::{BTree, TreeMeta};
pub use verify::{TreeStats, render};
