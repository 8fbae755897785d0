//! K-dimensional search tree with lazy deletion.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{MatchError, Result};
use crate::feature::OwnerId;

use super::hyperrect::HyperRect;
use super::neighbors::{NearestSlot, NeighborHeap};
use super::node::{InsertOutcome, NodeArena};

/// Default per-query time budget for nearest-neighbor walks, in
/// microseconds. `0` disables the deadline entirely.
pub const DEFAULT_QUERY_BUDGET_MICROS: u64 = 50_000;

/// k-d tree over fixed-length float keys, each carrying one owner id.
///
/// Removal is a soft delete: the node stays in place as a routing node and
/// a later insert of the same key revives it with the new owner. The tree
/// is never rebalanced; rebuilding is the caller's responsibility.
///
/// Nearest-neighbor walks honor a per-query deadline derived from the
/// configured budget, trading completeness for latency: an exhausted budget
/// returns whatever best candidates the walk has so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdTree {
    k: usize,
    arena: NodeArena,
    root: Option<u32>,
    live: usize,
    query_budget_micros: u64,
}

impl KdTree {
    /// Create an empty tree over `k`-dimensional keys.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(MatchError::InvalidParameter(
                "tree dimensionality must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            k,
            arena: NodeArena::default(),
            root: None,
            live: 0,
            query_budget_micros: DEFAULT_QUERY_BUDGET_MICROS,
        })
    }

    /// Key dimensionality.
    #[inline]
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.k
    }

    /// Number of live (non-deleted) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no live key exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total node count, deleted routing nodes included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Current per-query budget in microseconds (`0` = unbounded).
    #[must_use]
    pub fn query_budget_micros(&self) -> u64 {
        self.query_budget_micros
    }

    /// Set the per-query budget in microseconds (`0` = unbounded).
    pub fn set_query_budget_micros(&mut self, micros: u64) {
        self.query_budget_micros = micros;
    }

    /// Fail fast on a vector whose length differs from the tree's K.
    pub fn check_dimension(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.k {
            return Err(MatchError::DimensionMismatch {
                expected: self.k,
                actual: v.len(),
            });
        }
        Ok(())
    }

    fn deadline(&self) -> Option<Instant> {
        match self.query_budget_micros {
            0 => None,
            micros => Some(Instant::now() + Duration::from_micros(micros)),
        }
    }

    /// Insert `key` with `owner`.
    ///
    /// An exact-key match revives a deleted node with the new owner; a live
    /// exact-key match keeps its first owner and the insert is discarded
    /// (see [`InsertOutcome`]).
    pub fn insert(&mut self, key: &[f32], owner: OwnerId) -> Result<InsertOutcome> {
        self.check_dimension(key)?;
        let outcome = match self.root {
            None => {
                self.root = Some(self.arena.alloc(key.to_vec(), owner));
                InsertOutcome::Created
            }
            Some(root) => self.arena.insert(root, key, owner, self.k),
        };
        if matches!(outcome, InsertOutcome::Created | InsertOutcome::Revived) {
            self.live += 1;
        }
        Ok(outcome)
    }

    /// Soft-delete `key`. Returns true if a live node held it.
    pub fn remove(&mut self, key: &[f32]) -> Result<bool> {
        self.check_dimension(key)?;
        let Some(root) = self.root else {
            return Ok(false);
        };
        match self.arena.locate(root, key, self.k) {
            Some(id) => {
                let was_live = self.arena.mark_deleted(id);
                if was_live {
                    self.live -= 1;
                }
                Ok(was_live)
            }
            None => Ok(false),
        }
    }

    /// Soft-delete `key` only if the live node holding it belongs to
    /// `owner`.
    ///
    /// Under the keep-first duplicate policy an owner may have recorded a
    /// descriptor it lost the collision for; this guard keeps its removal
    /// from deleting the winning owner's node.
    pub fn remove_owned(&mut self, key: &[f32], owner: OwnerId) -> Result<bool> {
        self.check_dimension(key)?;
        let Some(root) = self.root else {
            return Ok(false);
        };
        match self.arena.locate(root, key, self.k) {
            Some(id) if !self.arena.node(id).deleted && self.arena.node(id).owner == owner => {
                self.arena.mark_deleted(id);
                self.live -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Exact search: the owner of `key`, if a live node holds it.
    pub fn get(&self, key: &[f32]) -> Result<Option<OwnerId>> {
        self.check_dimension(key)?;
        let Some(root) = self.root else {
            return Ok(None);
        };
        Ok(self
            .arena
            .locate(root, key, self.k)
            .map(|id| self.arena.node(id))
            .filter(|node| !node.deleted)
            .map(|node| node.owner))
    }

    /// All live `(key, owner)` pairs componentwise within `[low, high]`.
    pub fn range(&self, low: &[f32], high: &[f32]) -> Result<Vec<(Vec<f32>, OwnerId)>> {
        self.check_dimension(low)?;
        self.check_dimension(high)?;
        let Some(root) = self.root else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::new();
        self.arena.range_into(root, low, high, 0, self.k, &mut ids);
        Ok(ids
            .into_iter()
            .map(|id| {
                let node = self.arena.node(id);
                (node.key.clone(), node.owner)
            })
            .collect())
    }

    /// Up to `n` nearest live owners by squared Euclidean distance,
    /// best-to-worst, bounded by the configured per-query budget.
    pub fn nearest(&self, target: &[f32], n: usize) -> Result<Vec<(OwnerId, f32)>> {
        self.check_dimension(target)?;
        let mut store = NeighborHeap::new(n)?;
        let Some(root) = self.root else {
            return Ok(Vec::new());
        };
        let rect = HyperRect::infinite(self.k);
        self.arena
            .nearest(root, target, 0, self.k, &rect, &mut store, self.deadline(), None)?;
        Ok(store
            .drain_ascending()
            .into_iter()
            .map(|(id, dist_sq)| (self.arena.node(id).owner, dist_sq))
            .collect())
    }

    /// The single nearest live owner, honoring an explicit deadline and an
    /// optional cancellation token. Used by the tree-search manager's
    /// per-query-vector tasks.
    pub fn nearest_one(
        &self,
        target: &[f32],
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<(OwnerId, f32)>> {
        self.check_dimension(target)?;
        let Some(root) = self.root else {
            return Ok(None);
        };
        let mut slot = NearestSlot::new();
        let rect = HyperRect::infinite(self.k);
        self.arena
            .nearest(root, target, 0, self.k, &rect, &mut slot, deadline, cancel)?;
        Ok(slot
            .into_best()
            .map(|(id, dist_sq)| (self.arena.node(id).owner, dist_sq)))
    }
}
