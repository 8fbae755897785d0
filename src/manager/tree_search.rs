//! Tree-search matching backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::feature::{FeatureVector, OwnerId};
use crate::snapshot::{self, SnapshotKind};
use crate::tree::KdTree;

use super::{check_min_matches, tally_votes, MatchCandidate, MatchIndex};

#[derive(Debug, Serialize, Deserialize)]
struct TreeState {
    tree: KdTree,
    features: HashMap<OwnerId, Vec<FeatureVector>>,
}

/// Matching backend over a k-d tree with an owner→features reverse index.
///
/// The tree and the reverse index live behind one lock and are only ever
/// mutated together, so a query batch (which holds the read side for its
/// whole duration) sees a stable snapshot of both.
#[derive(Debug)]
pub struct TreeSearchManager {
    state: RwLock<TreeState>,
}

impl TreeSearchManager {
    /// Create a backend over `dimension`-length descriptors.
    pub fn new(dimension: usize) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(TreeState {
                tree: KdTree::new(dimension)?,
                features: HashMap::new(),
            }),
        })
    }

    /// Restore a backend from bytes produced by
    /// [`MatchIndex::serialize_state`].
    pub fn restore_state(bytes: &[u8]) -> Result<Self> {
        let state: TreeState = snapshot::decode(SnapshotKind::TreeSearch, bytes)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Descriptor dimensionality.
    pub fn dimension(&self) -> usize {
        self.state.read().tree.dimension()
    }

    /// Like [`MatchIndex::find_matches`], observing an external
    /// cancellation token: setting it aborts the outstanding tree walks and
    /// the whole call returns [`MatchError::Cancelled`](crate::MatchError::Cancelled).
    pub fn find_matches_with_token(
        &self,
        query: &[FeatureVector],
        min_matches: usize,
        token: &CancelToken,
    ) -> Result<Vec<MatchCandidate>> {
        check_min_matches(min_matches)?;
        let state = self.state.read();
        for feature in query {
            state.tree.check_dimension(feature.descriptor())?;
        }
        if state.tree.is_empty() || query.is_empty() {
            return Ok(Vec::new());
        }
        let budget_micros = state.tree.query_budget_micros();
        // One task per query vector; the deadline is computed at task start,
        // so each item is individually bounded while the batch is not.
        let hits = query
            .par_iter()
            .map(|feature| {
                let deadline = match budget_micros {
                    0 => None,
                    micros => Some(Instant::now() + Duration::from_micros(micros)),
                };
                state
                    .tree
                    .nearest_one(feature.descriptor(), deadline, Some(token))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(tally_votes(hits.into_iter().flatten(), min_matches))
    }

    fn remove_locked(state: &mut TreeState, owner: OwnerId) -> Result<Vec<FeatureVector>> {
        let prior = state.features.remove(&owner).unwrap_or_default();
        for feature in &prior {
            state.tree.remove_owned(feature.descriptor(), owner)?;
        }
        Ok(prior)
    }
}

impl MatchIndex for TreeSearchManager {
    /// Full-replace: any features previously bound to `owner` are removed
    /// before the new set is inserted. A failure mid-insert rolls the owner
    /// back to empty.
    fn put(&self, owner: OwnerId, features: Vec<FeatureVector>) -> Result<()> {
        let mut state = self.state.write();
        for feature in &features {
            state.tree.check_dimension(feature.descriptor())?;
        }
        Self::remove_locked(&mut state, owner)?;
        for (i, feature) in features.iter().enumerate() {
            if let Err(e) = state.tree.insert(feature.descriptor(), owner) {
                for inserted in &features[..i] {
                    let _ = state.tree.remove_owned(inserted.descriptor(), owner);
                }
                return Err(e);
            }
        }
        state.features.insert(owner, features);
        Ok(())
    }

    fn remove(&self, owner: OwnerId) -> Result<Vec<FeatureVector>> {
        let mut state = self.state.write();
        Self::remove_locked(&mut state, owner)
    }

    fn features(&self, owner: OwnerId) -> Result<Vec<FeatureVector>> {
        Ok(self
            .state
            .read()
            .features
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }

    fn find_matches(
        &self,
        query: &[FeatureVector],
        min_matches: usize,
    ) -> Result<Vec<MatchCandidate>> {
        self.find_matches_with_token(query, min_matches, &CancelToken::new())
    }

    fn set_query_budget_micros(&self, micros: u64) {
        self.state.write().tree.set_query_budget_micros(micros);
    }

    fn len(&self) -> usize {
        self.state.read().tree.len()
    }

    fn serialize_state(&self) -> Result<Vec<u8>> {
        let state = self.state.read();
        snapshot::encode(SnapshotKind::TreeSearch, &*state)
    }
}
