//! Node arena and the recursive k-d tree algorithms.
//!
//! Nodes are addressed by index into a flat arena rather than by owning
//! pointers, so the whole tree is a flat value graph: directly serializable
//! and open to future compaction. Deleted nodes stay in place as routing
//! nodes; deletion never restructures the tree.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{MatchError, Result};
use crate::feature::OwnerId;
use crate::simd;

use super::hyperrect::HyperRect;
use super::neighbors::NeighborSink;

/// Index of a node within the arena.
pub(crate) type NodeId = u32;

/// Outcome of inserting a key into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new node was created.
    Created,
    /// An exact-key match on a deleted node revived it with the new owner.
    Revived,
    /// An exact-key match on a live node; the new owner was discarded
    /// (keep-first policy).
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Node {
    pub(crate) key: Vec<f32>,
    pub(crate) owner: OwnerId,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) deleted: bool,
}

/// Flat node storage plus the recursive algorithms that walk it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    /// Total node count, deleted routing nodes included.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn alloc(&mut self, key: Vec<f32>, owner: OwnerId) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            key,
            owner,
            left: None,
            right: None,
            deleted: false,
        });
        id
    }

    /// Soft-delete a node. Returns true if it was live.
    pub(crate) fn mark_deleted(&mut self, id: NodeId) -> bool {
        let node = &mut self.nodes[id as usize];
        let was_live = !node.deleted;
        node.deleted = true;
        was_live
    }

    /// Insert under an existing node.
    ///
    /// Descends on `key[depth % k]`; an exact-key match revives a deleted
    /// node with the new owner, while a live one keeps its first owner and
    /// the new association is logged and discarded. The descent is
    /// iterative, like [`NodeArena::locate`], so a degenerate chain of
    /// sorted inserts cannot exhaust the stack.
    pub(crate) fn insert(
        &mut self,
        root: NodeId,
        key: &[f32],
        owner: OwnerId,
        k: usize,
    ) -> InsertOutcome {
        let mut id = root;
        let mut depth = 0;
        loop {
            let idx = id as usize;
            if self.nodes[idx].key.as_slice() == key {
                if self.nodes[idx].deleted {
                    self.nodes[idx].deleted = false;
                    self.nodes[idx].owner = owner;
                    return InsertOutcome::Revived;
                }
                tracing::debug!(
                    owner,
                    first_owner = self.nodes[idx].owner,
                    "duplicate descriptor for a live node, keeping the first owner"
                );
                return InsertOutcome::Duplicate;
            }
            let dim = depth % k;
            let go_left = key[dim] < self.nodes[idx].key[dim];
            let child = if go_left {
                self.nodes[idx].left
            } else {
                self.nodes[idx].right
            };
            match child {
                Some(c) => {
                    id = c;
                    depth += 1;
                }
                None => {
                    let new_id = self.alloc(key.to_vec(), owner);
                    if go_left {
                        self.nodes[idx].left = Some(new_id);
                    } else {
                        self.nodes[idx].right = Some(new_id);
                    }
                    return InsertOutcome::Created;
                }
            }
        }
    }

    /// Exact-key descent, deleted nodes included.
    pub(crate) fn locate(&self, root: NodeId, key: &[f32], k: usize) -> Option<NodeId> {
        let mut id = root;
        let mut depth = 0;
        loop {
            let node = &self.nodes[id as usize];
            if node.key.as_slice() == key {
                return Some(id);
            }
            let dim = depth % k;
            let next = if key[dim] < node.key[dim] {
                node.left
            } else {
                node.right
            };
            match next {
                Some(c) => {
                    id = c;
                    depth += 1;
                }
                None => return None,
            }
        }
    }

    /// Collect live nodes whose keys lie componentwise within `[low, high]`.
    pub(crate) fn range_into(
        &self,
        id: NodeId,
        low: &[f32],
        high: &[f32],
        depth: usize,
        k: usize,
        out: &mut Vec<NodeId>,
    ) {
        let node = &self.nodes[id as usize];
        let dim = depth % k;
        if let Some(left) = node.left {
            if low[dim] <= node.key[dim] {
                self.range_into(left, low, high, depth + 1, k, out);
            }
        }
        if !node.deleted && in_range(&node.key, low, high) {
            out.push(id);
        }
        if let Some(right) = node.right {
            if high[dim] > node.key[dim] {
                self.range_into(right, low, high, depth + 1, k, out);
            }
        }
    }

    /// Branch-and-bound nearest-neighbor walk.
    ///
    /// Recurses into the target's side of the split unconditionally, offers
    /// the node's own distance (live nodes only), then takes the further
    /// side only while its box can still beat the worst retained candidate
    /// and the deadline has not passed. Deadline exhaustion is a silent
    /// approximation; cancellation aborts the walk with an error.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn nearest<S: NeighborSink<NodeId>>(
        &self,
        id: NodeId,
        target: &[f32],
        depth: usize,
        k: usize,
        rect: &HyperRect,
        store: &mut S,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(MatchError::Cancelled);
            }
        }
        let node = &self.nodes[id as usize];
        let dim = depth % k;
        let (left_rect, right_rect) = rect.split(dim, node.key[dim]);
        let (near, near_rect, far, far_rect) = if target[dim] < node.key[dim] {
            (node.left, left_rect, node.right, right_rect)
        } else {
            (node.right, right_rect, node.left, left_rect)
        };
        if let Some(child) = near {
            self.nearest(child, target, depth + 1, k, &near_rect, store, deadline, cancel)?;
        }
        if !node.deleted {
            store.offer(id, simd::l2_distance_squared(target, &node.key));
        }
        if let Some(child) = far {
            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            if !expired && far_rect.min_dist_squared(target) <= store.worst_distance() {
                self.nearest(child, target, depth + 1, k, &far_rect, store, deadline, cancel)?;
            }
        }
        Ok(())
    }
}

#[inline]
fn in_range(key: &[f32], low: &[f32], high: &[f32]) -> bool {
    key.iter()
        .zip(low.iter().zip(high.iter()))
        .all(|(&v, (&lo, &hi))| lo <= v && v <= hi)
}
