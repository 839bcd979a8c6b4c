//! Internal-node operations and the descent that dispatches to leaves.
//!
//! The node kind is read off the ID tag, so descending never needs to load
//! a node just to learn what it is.

use crate::btree::cache::NodeCache;
use crate::btree::error::BTreeError;
use crate::btree::id::{self, NULL_ID, NodeId, NodeKind};
use crate::btree::leaf;
use crate::btree::node::{InternalNode, Key, Node, Value};
use crate::storage::StorageManager;

/// Leaf under `id` whose key range contains `key`.
pub fn descend<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    key: Key,
) -> Result<NodeId, BTreeError> {
    let mut current = id;
    while id::kind_of(current) == NodeKind::Internal {
        current = cache.internal(current)?.child_for(key);
    }
    Ok(current)
}

/// Leftmost leaf under `id`.
pub fn leftmost<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
) -> Result<NodeId, BTreeError> {
    let mut current = id;
    while id::kind_of(current) == NodeKind::Internal {
        let node = cache.internal(current)?;
        let Some(&first) = node.child_ids.first() else {
            return Err(BTreeError::Invariant(format!(
                "internal node {current:#x} has no children"
            )));
        };
        current = first;
    }
    Ok(current)
}

/// Look up `key` in the subtree rooted at `id`.
pub fn get<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    key: Key,
) -> Result<Option<Value>, BTreeError> {
    let leaf_id = descend(cache, id, key)?;
    leaf::get(cache, leaf_id, key)
}

/// Values with keys in `[start, end)` in the subtree rooted at `id`.
pub fn get_range<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    start: Key,
    end: Key,
) -> Result<Vec<Value>, BTreeError> {
    if start >= end {
        return Ok(Vec::new());
    }
    let leaf_id = descend(cache, id, start)?;
    leaf::get_range(cache, leaf_id, start, end)
}

/// Every value in the subtree rooted at `id`, in key order.
pub fn traverse<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
) -> Result<Vec<Value>, BTreeError> {
    let leaf_id = leftmost(cache, id)?;
    leaf::traverse(cache, leaf_id)
}

/// Upsert into the subtree rooted at `id`. Returns true if the key is new.
pub fn set<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    key: Key,
    val: Value,
) -> Result<bool, BTreeError> {
    let leaf_id = descend(cache, id, key)?;
    leaf::set(cache, leaf_id, key, val)
}

/// Remove `key` from the subtree rooted at `id`. Returns true if it was present.
pub fn delete<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    key: Key,
) -> Result<bool, BTreeError> {
    let leaf_id = descend(cache, id, key)?;
    leaf::delete(cache, leaf_id, key)
}

/// Rewrite the separator `old` to `new`, starting at `id` and climbing to the
/// ancestor whose range actually holds `old`.
pub fn replace_key<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    old: Key,
    new: Key,
) -> Result<(), BTreeError> {
    let mut current = id;
    loop {
        let node = cache.internal(current)?;
        if !node.defers_to_parent(old) {
            break;
        }
        if node.parent_id == NULL_ID {
            return Ok(());
        }
        current = node.parent_id;
    }

    if cache.internal_mut(current)?.rewrite_separator(old, new) {
        tracing::trace!(node = current, old, new, "rewrote separator");
    }
    Ok(())
}

/// Put a fresh root above `child`, which must currently be the root.
pub fn grow_root<S: StorageManager>(
    cache: &mut NodeCache<S>,
    child: NodeId,
) -> Result<NodeId, BTreeError> {
    let root = cache.register(Node::Internal(InternalNode::with_child(child)))?;
    cache.set_parent(child, root)?;
    tracing::debug!(root, child, "grew new root");
    Ok(root)
}

/// Position of `child` in `parent`.
pub fn slot_of(parent: &InternalNode, child: NodeId) -> Result<usize, BTreeError> {
    parent.child_index(child).ok_or_else(|| {
        BTreeError::Invariant(format!("node {child:#x} is not a child of {:#x}", parent.id))
    })
}

/// Position of `child` in `parent_id` and the IDs of its left and right
/// siblings (`NULL_ID` where absent).
pub fn siblings<S: StorageManager>(
    cache: &mut NodeCache<S>,
    parent_id: NodeId,
    child: NodeId,
) -> Result<(usize, NodeId, NodeId), BTreeError> {
    let parent = cache.internal(parent_id)?;
    let index = slot_of(parent, child)?;
    let left = match index.checked_sub(1) {
        Some(i) => parent.child_ids[i],
        None => NULL_ID,
    };
    let right = parent.child_ids.get(index + 1).copied().unwrap_or(NULL_ID);
    Ok((index, left, right))
}

/// Split internal node `id` if it has more than `internal + 1` children.
///
/// The middle separator moves up into the parent; keys and children above it
/// move to a new right sibling, and those children are reparented.
pub fn split<S: StorageManager>(cache: &mut NodeCache<S>, id: NodeId) -> Result<(), BTreeError> {
    let max = cache.orders().internal_max_children();
    let (children, parent_id) = {
        let node = cache.internal(id)?;
        (node.child_ids.len(), node.parent_id)
    };
    if children <= max {
        return Ok(());
    }

    let needed = if parent_id == NULL_ID { 2 } else { 1 };
    cache.check_available(NodeKind::Internal, needed)?;

    let parent_id = if parent_id == NULL_ID {
        grow_root(cache, id)?
    } else {
        parent_id
    };
    let sibling_id = cache.register(Node::Internal(InternalNode::new(parent_id)))?;

    let Some((promoted, keys, moved)) = cache.internal_mut(id)?.split_off_upper() else {
        return Err(BTreeError::Invariant(format!(
            "internal node {id:#x} split without separators"
        )));
    };

    let sibling = cache.internal_mut(sibling_id)?;
    sibling.keys = keys;
    sibling.child_ids.clone_from(&moved);
    for child in moved {
        cache.set_parent(child, sibling_id)?;
    }

    tracing::debug!(
        node = id,
        sibling = sibling_id,
        promoted,
        "split internal node"
    );

    let parent = cache.internal_mut(parent_id)?;
    let index = slot_of(parent, id)?;
    parent.insert_after(index, promoted, sibling_id);

    split(cache, parent_id)
}

/// Rebalance internal node `id` if it has fewer than `⌈(internal + 1) / 2⌉`
/// children, with the same priority as leaves: steal right, steal left,
/// fold into left, fold right in. Separators rotate through the parent.
pub fn merge<S: StorageManager>(cache: &mut NodeCache<S>, id: NodeId) -> Result<(), BTreeError> {
    let min = cache.orders().internal_min_children();
    let (children, parent_id) = {
        let node = cache.internal(id)?;
        (node.child_ids.len(), node.parent_id)
    };
    if children >= min || parent_id == NULL_ID {
        return Ok(());
    }

    let (index, left_id, right_id) = siblings(cache, parent_id, id)?;

    if right_id != NULL_ID && cache.internal(right_id)?.child_ids.len() > min {
        return steal_from_right(cache, id, parent_id, index, right_id);
    }
    if left_id != NULL_ID && cache.internal(left_id)?.child_ids.len() > min {
        return steal_from_left(cache, id, parent_id, index, left_id);
    }

    if left_id != NULL_ID {
        absorb(cache, parent_id, index - 1, left_id, id)?;
        tracing::debug!(node = id, into = left_id, "merged into left sibling");
    } else if right_id != NULL_ID {
        absorb(cache, parent_id, index, id, right_id)?;
        tracing::debug!(node = right_id, into = id, "merged right sibling in");
    } else {
        return Ok(());
    }

    merge(cache, parent_id)
}

fn steal_from_right<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    parent_id: NodeId,
    index: usize,
    right_id: NodeId,
) -> Result<(), BTreeError> {
    let right = cache.internal_mut(right_id)?;
    if right.keys.is_empty() {
        return Err(no_separators(right_id));
    }
    let right_key = right.keys.remove(0);
    let child = right.child_ids.remove(0);

    let parent = cache.internal_mut(parent_id)?;
    let separator = std::mem::replace(&mut parent.keys[index], right_key);

    let node = cache.internal_mut(id)?;
    node.keys.push(separator);
    node.child_ids.push(child);
    cache.set_parent(child, id)?;

    tracing::debug!(node = id, from = right_id, child, "stole from right");
    Ok(())
}

fn steal_from_left<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    parent_id: NodeId,
    index: usize,
    left_id: NodeId,
) -> Result<(), BTreeError> {
    let left = cache.internal_mut(left_id)?;
    let (Some(left_key), Some(child)) = (left.keys.pop(), left.child_ids.pop()) else {
        return Err(no_separators(left_id));
    };

    let parent = cache.internal_mut(parent_id)?;
    let separator = std::mem::replace(&mut parent.keys[index - 1], left_key);

    let node = cache.internal_mut(id)?;
    node.keys.insert(0, separator);
    node.child_ids.insert(0, child);
    cache.set_parent(child, id)?;

    tracing::debug!(node = id, from = left_id, child, "stole from left");
    Ok(())
}

fn no_separators(id: NodeId) -> BTreeError {
    BTreeError::Invariant(format!("internal node {id:#x} has no separators"))
}

/// Fold `victim` into its left neighbour `survivor`, pulling down the
/// parent separator at `key_index` between them, and drop `victim`.
fn absorb<S: StorageManager>(
    cache: &mut NodeCache<S>,
    parent_id: NodeId,
    key_index: usize,
    survivor: NodeId,
    victim: NodeId,
) -> Result<(), BTreeError> {
    let parent = cache.internal_mut(parent_id)?;
    let separator = parent.keys[key_index];
    parent.remove_slot(key_index, key_index + 1);

    let victim_node = cache.internal_mut(victim)?;
    let keys = std::mem::take(&mut victim_node.keys);
    let moved = std::mem::take(&mut victim_node.child_ids);

    let node = cache.internal_mut(survivor)?;
    node.keys.push(separator);
    node.keys.extend(keys);
    node.child_ids.extend_from_slice(&moved);

    for child in moved {
        cache.set_parent(child, survivor)?;
    }
    cache.discard(victim);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::cache::CacheConfig;
    use crate::btree::node::{LeafNode, Orders};
    use crate::storage::MemoryStorage;

    fn small_cache() -> NodeCache<MemoryStorage> {
        let orders = Orders::new(3, 3).expect("valid orders");
        let config = CacheConfig::default().with_orders(orders);
        NodeCache::new(MemoryStorage::new(1), config)
    }

    /// Grow a tree from a root leaf by repeated leaf-level upserts.
    fn build(cache: &mut NodeCache<MemoryStorage>, keys: impl IntoIterator<Item = Key>) -> NodeId {
        let mut root = cache
            .register(Node::Leaf(LeafNode::new(NULL_ID)))
            .expect("register");
        for k in keys {
            set(cache, root, k, k * 10).expect("set");
            while let Some(parent) = cache.get(root).expect("get").map(Node::parent_id) {
                if parent == NULL_ID {
                    break;
                }
                root = parent;
            }
        }
        root
    }

    /// Hang one single-key leaf per key under `parent`.
    fn attach_leaves(cache: &mut NodeCache<MemoryStorage>, parent: NodeId, keys: &[Key]) {
        for (i, &key) in keys.iter().enumerate() {
            let leaf = cache
                .register(Node::Leaf(LeafNode::new(parent)))
                .expect("register");
            cache.leaf_mut(leaf).expect("leaf").upsert(key, key * 10);
            let node = cache.internal_mut(parent).expect("parent");
            if i > 0 {
                node.keys.push(key);
            }
            node.child_ids.push(leaf);
        }
    }

    /// Two internal nodes under one root, each over single-key leaves.
    fn two_internals(
        cache: &mut NodeCache<MemoryStorage>,
        left: &[Key],
        right: &[Key],
    ) -> (NodeId, NodeId, NodeId) {
        let left_id = cache
            .register(Node::Internal(InternalNode::new(NULL_ID)))
            .expect("register");
        let root = grow_root(cache, left_id).expect("grow");
        let right_id = cache
            .register(Node::Internal(InternalNode::new(root)))
            .expect("register");
        attach_leaves(cache, left_id, left);
        attach_leaves(cache, right_id, right);
        cache
            .internal_mut(root)
            .expect("root")
            .insert_after(0, right[0], right_id);
        (root, left_id, right_id)
    }

    #[test]
    fn test_descend_and_get() {
        let mut cache = small_cache();
        let root = build(&mut cache, 1..=20);
        assert_eq!(id::kind_of(root), NodeKind::Internal);

        for k in 1..=20 {
            assert_eq!(get(&mut cache, root, k).expect("get"), Some(k * 10));
        }
        assert_eq!(get(&mut cache, root, 0).expect("get"), None);
        assert_eq!(get(&mut cache, root, 21).expect("get"), None);

        let first = leftmost(&mut cache, root).expect("leftmost");
        assert_eq!(cache.leaf(first).expect("leaf").first_key(), Some(1));
        assert_eq!(descend(&mut cache, root, 0).expect("descend"), first);
    }

    #[test]
    fn test_range_and_traverse() {
        let mut cache = small_cache();
        let root = build(&mut cache, (1..=30).rev());

        let expected: Vec<Value> = (1..=30).map(|k| k * 10).collect();
        assert_eq!(traverse(&mut cache, root).expect("traverse"), expected);
        assert_eq!(
            get_range(&mut cache, root, 5, 9).expect("range"),
            vec![50, 60, 70, 80]
        );
        let inverted = get_range(&mut cache, root, 9, 5).expect("inverted");
        assert!(inverted.is_empty());
    }

    #[test]
    fn test_split_cascades_and_reparents() {
        let mut cache = small_cache();
        let root = build(&mut cache, 1..=40);

        // Every child of every internal node points back at it.
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if id::kind_of(current) == NodeKind::Leaf {
                continue;
            }
            let node = cache.internal(current).expect("internal").clone();
            assert!(node.child_ids.len() <= 4);
            assert_eq!(node.child_ids.len(), node.keys.len() + 1);
            for child in node.child_ids {
                assert_eq!(cache.node(child).expect("child").parent_id(), current);
                stack.push(child);
            }
        }
    }

    #[test]
    fn test_replace_key_climbs_to_owning_ancestor() {
        let mut cache = small_cache();
        let root = build(&mut cache, 1..=20);

        // A root separator is the first key of the leftmost leaf to its right.
        let separator = cache.internal(root).expect("root").keys[0];
        let leaf_id = descend(&mut cache, root, separator).expect("descend");
        let parent = cache.leaf(leaf_id).expect("leaf").parent_id;
        assert_ne!(parent, root);

        // The separator sits two levels up, so the rewrite has to climb.
        let next = separator + 1;
        assert!(delete(&mut cache, root, separator).expect("delete"));
        assert_eq!(cache.internal(root).expect("root").keys[0], next);
        assert_eq!(get(&mut cache, root, next).expect("get"), Some(next * 10));
    }

    #[test]
    fn test_merge_steals_child_from_right_first() {
        let mut cache = small_cache();
        let (root, left, right) = two_internals(&mut cache, &[10], &[100, 110, 120]);
        let moved = cache.internal(right).expect("right").child_ids[0];

        merge(&mut cache, left).expect("merge");

        // The root separator comes down and the right sibling's first key goes up.
        let left_node = cache.internal(left).expect("left").clone();
        assert_eq!(left_node.keys, vec![100]);
        assert_eq!(left_node.child_ids.len(), 2);
        assert_eq!(left_node.child_ids[1], moved);
        assert_eq!(cache.internal(right).expect("right").keys, vec![120]);
        assert_eq!(cache.internal(root).expect("root").keys, vec![110]);
        assert_eq!(cache.node(moved).expect("moved").parent_id(), left);
        assert_eq!(get(&mut cache, root, 100).expect("get"), Some(1000));
    }

    #[test]
    fn test_merge_steals_child_from_left() {
        let mut cache = small_cache();
        let (root, left, right) = two_internals(&mut cache, &[10, 20, 30], &[100]);
        let moved = cache.internal(left).expect("left").child_ids[2];

        merge(&mut cache, right).expect("merge");

        let right_node = cache.internal(right).expect("right").clone();
        assert_eq!(right_node.keys, vec![100]);
        assert_eq!(right_node.child_ids.len(), 2);
        assert_eq!(right_node.child_ids[0], moved);
        assert_eq!(cache.internal(left).expect("left").keys, vec![20]);
        assert_eq!(cache.internal(root).expect("root").keys, vec![30]);
        assert_eq!(cache.node(moved).expect("moved").parent_id(), right);
        assert_eq!(get(&mut cache, root, 30).expect("get"), Some(300));
    }

    #[test]
    fn test_merge_folds_right_into_leftmost() {
        let mut cache = small_cache();
        let (root, left, right) = two_internals(&mut cache, &[10], &[100, 110]);

        merge(&mut cache, left).expect("merge");

        let left_node = cache.internal(left).expect("left").clone();
        assert_eq!(left_node.keys, vec![100, 110]);
        assert_eq!(left_node.child_ids.len(), 3);
        for child in left_node.child_ids {
            assert_eq!(cache.node(child).expect("child").parent_id(), left);
        }

        let root_node = cache.internal(root).expect("root").clone();
        assert!(root_node.keys.is_empty());
        assert_eq!(root_node.child_ids, vec![left]);
        assert_eq!(Node::Internal(root_node).new_root_id(), left);
        assert!(cache.get(right).expect("get").is_none());
    }

    #[test]
    fn test_delete_everything_collapses_to_leaf() {
        let mut cache = small_cache();
        let mut root = build(&mut cache, 1..=40);

        for k in 1..=39 {
            assert!(delete(&mut cache, root, k).expect("delete"));
            loop {
                let next = cache.node(root).expect("root").new_root_id();
                if next == root {
                    break;
                }
                cache.discard(root);
                root = next;
                cache.set_parent(root, NULL_ID).expect("set parent");
            }
        }

        assert_eq!(id::kind_of(root), NodeKind::Leaf);
        assert_eq!(cache.leaf(root).expect("leaf").keys, vec![40]);
        assert!(!delete(&mut cache, root, 1).expect("delete missing"));
    }
}
