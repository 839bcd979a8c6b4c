// Layering, bottom up:
//  - storage: fixed-size pages against a file or an in-memory store
//  - btree::codec: one node per page, little-endian, tag bit in the ID
//  - btree::cache: ID -> node directory, allocation, write-back on eviction
//  - btree::leaf / btree::internal: the split/merge algorithm, on IDs only
//  - btree::tree: root ID + size, the public Get/Set/Delete/Range/Traverse
#![cfg_attr(
    test,
    allow(clippy::disallowed_methods, clippy::expect_used, clippy::unwrap_used)
)]

pub mod btree;
pub mod config;
pub mod storage;

pub use btree::{BTree, BTreeError, Key, NodeId, TreeMeta, TreeStats, Value};
pub use config::{ConfigError, TreeConfig};
