//! Leaf operations.
//!
//! Every function takes the cache and a leaf ID. Borrows of a node never
//! outlive a single cache call; whatever is needed across calls is copied
//! out first.

use crate::btree::cache::NodeCache;
use crate::btree::error::BTreeError;
use crate::btree::id::{NULL_ID, NodeId, NodeKind};
use crate::btree::internal;
use crate::btree::node::{Key, LeafNode, Node, Value};
use crate::storage::StorageManager;

/// Exact-match lookup in one leaf.
pub fn get<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    key: Key,
) -> Result<Option<Value>, BTreeError> {
    Ok(cache.leaf(id)?.get(key))
}

/// Values with keys in `[start, end)`, starting at leaf `id` and following
/// the chain while the range runs past the end of each leaf.
pub fn get_range<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    start: Key,
    end: Key,
) -> Result<Vec<Value>, BTreeError> {
    let mut values = Vec::new();
    if start >= end {
        return Ok(values);
    }

    let mut current = id;
    while current != NULL_ID {
        let leaf = cache.leaf(current)?;
        let (lo, _) = leaf.find(start);
        let (hi, _) = leaf.find(end);
        values.extend_from_slice(&leaf.vals[lo..hi]);
        if hi < leaf.len() {
            break;
        }
        current = leaf.next_id;
    }
    Ok(values)
}

/// Values of leaf `id` and of every leaf after it in the chain.
pub fn traverse<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
) -> Result<Vec<Value>, BTreeError> {
    let mut values = Vec::new();
    let mut current = id;
    while current != NULL_ID {
        let leaf = cache.leaf(current)?;
        values.extend_from_slice(&leaf.vals);
        current = leaf.next_id;
    }
    Ok(values)
}

/// Upsert into leaf `id`, splitting if it overflows. Returns true if the key is new.
pub fn set<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    key: Key,
    val: Value,
) -> Result<bool, BTreeError> {
    if cache.leaf(id)?.get(key).is_none() {
        check_split_capacity(cache, id)?;
    }
    let inserted = cache.leaf_mut(id)?.upsert(key, val);
    split(cache, id)?;
    Ok(inserted)
}

/// Fail with `AllocationExhausted` unless every node that one more key in
/// leaf `id` could split is able to get a fresh ID.
fn check_split_capacity<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
) -> Result<(), BTreeError> {
    let orders = cache.orders();
    let leaf = cache.leaf(id)?;
    if leaf.len() < orders.leaf() {
        return Ok(());
    }

    let mut internal_needed = 0u64;
    let mut parent_id = leaf.parent_id;
    loop {
        if parent_id == NULL_ID {
            // New root.
            internal_needed += 1;
            break;
        }
        let parent = cache.internal(parent_id)?;
        if parent.child_ids.len() < orders.internal_max_children() {
            break;
        }
        internal_needed += 1;
        parent_id = parent.parent_id;
    }

    cache.check_available(NodeKind::Leaf, 1)?;
    if internal_needed > 0 {
        cache.check_available(NodeKind::Internal, internal_needed)?;
    }
    Ok(())
}

/// Remove `key` from leaf `id`, rebalancing if it underflows. Returns true if it was present.
pub fn delete<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    key: Key,
) -> Result<bool, BTreeError> {
    let leaf = cache.leaf_mut(id)?;
    let Some(index) = leaf.remove(key) else {
        return Ok(false);
    };
    let parent_id = leaf.parent_id;
    let new_first = leaf.first_key();

    if index == 0
        && parent_id != NULL_ID
        && let Some(new_first) = new_first
    {
        internal::replace_key(cache, parent_id, key, new_first)?;
    }

    merge(cache, id)?;
    Ok(true)
}

/// Split leaf `id` in two if it holds more than the leaf order.
///
/// The upper half moves to a new right sibling whose first key becomes the
/// separator in the parent. A root leaf first gets a fresh parent.
pub fn split<S: StorageManager>(cache: &mut NodeCache<S>, id: NodeId) -> Result<(), BTreeError> {
    let order = cache.orders().leaf();
    let (len, parent_id) = {
        let leaf = cache.leaf(id)?;
        (leaf.len(), leaf.parent_id)
    };
    if len <= order {
        return Ok(());
    }

    // Check up front so exhaustion leaves the tree untouched.
    cache.check_available(NodeKind::Leaf, 1)?;
    if parent_id == NULL_ID {
        cache.check_available(NodeKind::Internal, 1)?;
    }

    let parent_id = if parent_id == NULL_ID {
        internal::grow_root(cache, id)?
    } else {
        parent_id
    };
    let sibling_id = cache.register(Node::Leaf(LeafNode::new(parent_id)))?;

    let leaf = cache.leaf_mut(id)?;
    let (keys, vals) = leaf.split_off_upper();
    let old_next = leaf.next_id;
    leaf.next_id = sibling_id;

    let Some(&separator) = keys.first() else {
        return Err(BTreeError::Invariant(format!("leaf {id:#x} split into an empty half")));
    };

    let sibling = cache.leaf_mut(sibling_id)?;
    sibling.keys = keys;
    sibling.vals = vals;
    sibling.prev_id = id;
    sibling.next_id = old_next;

    if old_next != NULL_ID {
        cache.leaf_mut(old_next)?.prev_id = sibling_id;
    }

    tracing::debug!(leaf = id, sibling = sibling_id, separator, "split leaf");

    let parent = cache.internal_mut(parent_id)?;
    let index = internal::slot_of(parent, id)?;
    parent.insert_after(index, separator, sibling_id);

    internal::split(cache, parent_id)
}

/// Rebalance leaf `id` if it fell below half the leaf order.
///
/// Tries, in order: take the first pair of the right sibling, take the last
/// pair of the left sibling, fold this leaf into the left sibling, fold the
/// right sibling into this leaf. Folding removes a slot from the parent,
/// which is then rebalanced in turn.
pub fn merge<S: StorageManager>(cache: &mut NodeCache<S>, id: NodeId) -> Result<(), BTreeError> {
    let min = cache.orders().leaf_min_keys();
    let (len, parent_id) = {
        let leaf = cache.leaf(id)?;
        (leaf.len(), leaf.parent_id)
    };
    if len >= min || parent_id == NULL_ID {
        return Ok(());
    }

    let (index, left_id, right_id) = internal::siblings(cache, parent_id, id)?;

    if right_id != NULL_ID && cache.leaf(right_id)?.len() > min {
        return steal_from_right(cache, id, parent_id, index, right_id);
    }
    if left_id != NULL_ID && cache.leaf(left_id)?.len() > min {
        return steal_from_left(cache, id, parent_id, index, left_id);
    }

    if left_id != NULL_ID {
        absorb(cache, left_id, id)?;
        cache.internal_mut(parent_id)?.remove_slot(index - 1, index);
        tracing::debug!(leaf = id, into = left_id, "merged leaf into left sibling");
    } else if right_id != NULL_ID {
        absorb(cache, id, right_id)?;
        cache.internal_mut(parent_id)?.remove_slot(index, index + 1);
        tracing::debug!(leaf = right_id, into = id, "merged right sibling in");
    } else {
        return Ok(());
    }

    internal::merge(cache, parent_id)
}

fn steal_from_right<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    parent_id: NodeId,
    index: usize,
    right_id: NodeId,
) -> Result<(), BTreeError> {
    let right = cache.leaf_mut(right_id)?;
    let Some((key, val)) = right.pop_first() else {
        return Err(BTreeError::Invariant(format!("leaf {right_id:#x} is empty")));
    };
    let Some(right_first) = right.first_key() else {
        return Err(BTreeError::Invariant(format!("leaf {right_id:#x} emptied by a steal")));
    };

    let leaf = cache.leaf_mut(id)?;
    leaf.keys.push(key);
    leaf.vals.push(val);

    cache.internal_mut(parent_id)?.keys[index] = right_first;
    tracing::debug!(leaf = id, from = right_id, key, "stole from right leaf");
    Ok(())
}

fn steal_from_left<S: StorageManager>(
    cache: &mut NodeCache<S>,
    id: NodeId,
    parent_id: NodeId,
    index: usize,
    left_id: NodeId,
) -> Result<(), BTreeError> {
    let Some((key, val)) = cache.leaf_mut(left_id)?.pop_last() else {
        return Err(BTreeError::Invariant(format!("leaf {left_id:#x} is empty")));
    };

    let leaf = cache.leaf_mut(id)?;
    leaf.keys.insert(0, key);
    leaf.vals.insert(0, val);

    cache.internal_mut(parent_id)?.keys[index - 1] = key;
    tracing::debug!(leaf = id, from = left_id, key, "stole from left leaf");
    Ok(())
}

/// Append every pair of `victim` (the right neighbour of `survivor`) to
/// `survivor`, unlink `victim` from the chain and drop it.
fn absorb<S: StorageManager>(
    cache: &mut NodeCache<S>,
    survivor: NodeId,
    victim: NodeId,
) -> Result<(), BTreeError> {
    let victim_leaf = cache.leaf_mut(victim)?;
    let (keys, vals) = victim_leaf.take_entries();
    let next_id = victim_leaf.next_id;

    let leaf = cache.leaf_mut(survivor)?;
    leaf.keys.extend(keys);
    leaf.vals.extend(vals);
    leaf.next_id = next_id;

    if next_id != NULL_ID {
        cache.leaf_mut(next_id)?.prev_id = survivor;
    }
    cache.discard(victim);
    Ok(())
}
