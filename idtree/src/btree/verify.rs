//! Explicit consistency check and depth-first dump.
//!
//! Nothing on the Get/Set/Delete path calls into this module. `verify`
//! visits every node, so it costs a full scan.

use crate::btree::cache::NodeCache;
use crate::btree::error::BTreeError;
use crate::btree::id::{NULL_ID, NodeId};
use crate::btree::node::{Key, Node};
use crate::storage::StorageManager;

/// Shape of a tree that passed `verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    /// Levels from root to leaf; 0 for an empty tree.
    pub height: usize,
    /// Number of internal nodes.
    pub internal_nodes: usize,
    /// Number of leaves.
    pub leaf_nodes: usize,
    /// Number of keys reachable through the leaf chain.
    pub keys: u64,
}

struct Frame {
    id: NodeId,
    parent_id: NodeId,
    depth: usize,
    lower: Option<Key>,
    upper: Option<Key>,
}

fn violation(message: String) -> BTreeError {
    BTreeError::Invariant(message)
}

/// Check every structural invariant of the tree rooted at `root_id` holding `size` keys.
pub fn verify<S: StorageManager>(
    cache: &mut NodeCache<S>,
    root_id: NodeId,
    size: u64,
) -> Result<TreeStats, BTreeError> {
    if root_id == NULL_ID {
        if size != 0 {
            return Err(violation(format!("empty tree reports size {size}")));
        }
        return Ok(TreeStats::default());
    }

    let orders = cache.orders();
    let mut stats = TreeStats::default();
    let mut leaves = Vec::new();
    let mut leaf_depth = None;
    let mut stack = vec![Frame {
        id: root_id,
        parent_id: NULL_ID,
        depth: 1,
        lower: None,
        upper: None,
    }];

    while let Some(frame) = stack.pop() {
        let node = cache.node(frame.id)?.clone();
        let id = frame.id;
        let is_root = id == root_id;

        if node.id() != id {
            return Err(violation(format!("node {id:#x} carries ID {:#x}", node.id())));
        }
        if node.parent_id() != frame.parent_id {
            return Err(violation(format!(
                "node {id:#x} points at parent {:#x}, expected {:#x}",
                node.parent_id(),
                frame.parent_id
            )));
        }
        if node.keys().windows(2).any(|w| w[0] >= w[1]) {
            return Err(violation(format!("node {id:#x} keys are not strictly ascending")));
        }

        match node {
            Node::Leaf(leaf) => {
                stats.leaf_nodes += 1;
                let len = leaf.len();
                if len > orders.leaf()
                    || (is_root && len == 0)
                    || (!is_root && len < orders.leaf_min_keys())
                {
                    return Err(violation(format!("leaf {id:#x} holds {len} keys")));
                }
                let out_of_bounds = leaf.keys.iter().any(|&k| {
                    frame.lower.is_some_and(|lo| k < lo) || frame.upper.is_some_and(|hi| k >= hi)
                });
                if out_of_bounds {
                    return Err(violation(format!(
                        "leaf {id:#x} holds a key outside its separators"
                    )));
                }
                match leaf_depth {
                    None => leaf_depth = Some(frame.depth),
                    Some(depth) if depth != frame.depth => {
                        return Err(violation(format!(
                            "leaf {id:#x} at depth {}, others at {depth}",
                            frame.depth
                        )));
                    }
                    Some(_) => {}
                }
                leaves.push(id);
            }
            Node::Internal(node) => {
                stats.internal_nodes += 1;
                let children = node.child_ids.len();
                if children != node.keys.len() + 1 {
                    return Err(violation(format!(
                        "internal node {id:#x} has {} keys and {children} children",
                        node.keys.len()
                    )));
                }
                let too_few = if is_root {
                    children < 2
                } else {
                    children < orders.internal_min_children()
                };
                if too_few || children > orders.internal_max_children() {
                    return Err(violation(format!("node {id:#x} has {children} children")));
                }

                // Push right to left so children pop in key order.
                for (i, &child) in node.child_ids.iter().enumerate().rev() {
                    stack.push(Frame {
                        id: child,
                        parent_id: id,
                        depth: frame.depth + 1,
                        lower: if i == 0 {
                            frame.lower
                        } else {
                            Some(node.keys[i - 1])
                        },
                        upper: node.keys.get(i).copied().or(frame.upper),
                    });
                }
            }
        }
    }

    stats.height = leaf_depth.unwrap_or(0);
    stats.keys = verify_chain(cache, &leaves)?;
    if stats.keys != size {
        return Err(violation(format!("size is {size} but the leaf chain holds {}", stats.keys)));
    }
    Ok(stats)
}

/// Walk the leaf chain and check it visits `leaves` in order, with `prev_id`
/// mirroring `next_id` and keys ascending across leaves. Returns the key count.
fn verify_chain<S: StorageManager>(
    cache: &mut NodeCache<S>,
    leaves: &[NodeId],
) -> Result<u64, BTreeError> {
    let mut keys = 0u64;
    let mut previous = NULL_ID;
    let mut last_key: Option<Key> = None;
    let mut current = leaves.first().copied().unwrap_or(NULL_ID);

    for &expected in leaves {
        if current != expected {
            return Err(violation(format!(
                "leaf chain reaches {current:#x} where {expected:#x} was expected"
            )));
        }
        let leaf = cache.leaf(current)?;
        if leaf.prev_id != previous {
            return Err(violation(format!(
                "leaf {current:#x} has prev {:#x}, expected {previous:#x}",
                leaf.prev_id
            )));
        }
        if let (Some(last), Some(first)) = (last_key, leaf.first_key())
            && first <= last
        {
            return Err(violation(format!(
                "leaf {current:#x} starts at {first}, which is not after {last}"
            )));
        }
        last_key = leaf.keys.last().copied().or(last_key);
        keys += leaf.len() as u64;
        previous = current;
        current = leaf.next_id;
    }

    if current != NULL_ID {
        return Err(violation(format!("leaf chain runs past the last leaf into {current:#x}")));
    }
    Ok(keys)
}

/// Visit every node under `root_id` depth first, parents before children.
pub fn describe<S, F>(
    cache: &mut NodeCache<S>,
    root_id: NodeId,
    mut visit: F,
) -> Result<(), BTreeError>
where
    S: StorageManager,
    F: FnMut(usize, &Node),
{
    if root_id == NULL_ID {
        return Ok(());
    }

    let mut stack = vec![(root_id, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let node = cache.node(id)?;
        visit(depth, node);
        if let Node::Internal(internal) = node {
            for &child in internal.child_ids.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }
    Ok(())
}

/// One-line rendering of a node for dumps.
#[must_use]
pub fn render(node: &Node) -> String {
    match node {
        Node::Internal(n) => format!(
            "internal {:#x} parent={:#x} keys={:?} children={}",
            n.id,
            n.parent_id,
            n.keys,
            n.child_ids.len()
        ),
        Node::Leaf(n) => format!(
            "leaf {:#x} parent={:#x} prev={:#x} next={:#x} keys={:?}",
            n.id, n.parent_id, n.prev_id, n.next_id, n.keys
        ),
    }
}
