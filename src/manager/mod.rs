//! Matching backends.
//!
//! One interface, two implementations chosen at construction time:
//!
//! - [`TreeSearchManager`]: k-d tree plus an owner→features reverse index;
//!   one bounded nearest-neighbor walk per query vector.
//! - [`ParallelScanManager`]: flat batched storage scanned brute-force in
//!   parallel; insert+query only.
//!
//! Both aggregate the same way: each query vector votes for the owner of
//! its nearest stored descriptor, and owners reaching the minimum match
//! count come back ranked.

pub mod scan;
pub mod tree_search;

pub use scan::ParallelScanManager;
pub use tree_search::TreeSearchManager;

use std::collections::HashMap;

use crate::error::{MatchError, Result};
use crate::feature::{FeatureVector, OwnerId};

/// One ranked match for a query batch.
///
/// Built fresh per [`MatchIndex::find_matches`] call and never stored.
/// Distances are Euclidean (square roots of the index's squared working
/// distances).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// The matched image.
    pub owner: OwnerId,
    /// How many query vectors resolved to this owner.
    pub matches: usize,
    /// Sum of the matched vectors' distances.
    pub distance_sum: f32,
}

impl MatchCandidate {
    /// Mean distance over the matched query vectors.
    #[must_use]
    pub fn average_distance(&self) -> f32 {
        self.distance_sum / self.matches as f32
    }

    /// Ranking score: match count discounted by average distance.
    #[must_use]
    pub fn degree(&self) -> f32 {
        self.matches as f32 / (1.0 + self.average_distance())
    }
}

/// A matching backend: feature storage plus batched nearest-owner lookup.
pub trait MatchIndex: Send + Sync {
    /// Replace (or, on backends without a reverse index, extend) the
    /// features bound to `owner`.
    fn put(&self, owner: OwnerId, features: Vec<FeatureVector>) -> Result<()>;

    /// Unbind `owner`, returning its recorded features. Empty if unknown.
    fn remove(&self, owner: OwnerId) -> Result<Vec<FeatureVector>>;

    /// The features currently recorded for `owner`.
    fn features(&self, owner: OwnerId) -> Result<Vec<FeatureVector>>;

    /// Rank owners by how many query vectors resolve to them as nearest,
    /// dropping owners below `min_matches`.
    fn find_matches(
        &self,
        query: &[FeatureVector],
        min_matches: usize,
    ) -> Result<Vec<MatchCandidate>>;

    /// Per-query-vector time budget in microseconds (`0` = unbounded).
    fn set_query_budget_micros(&self, micros: u64);

    /// Number of live stored vectors.
    fn len(&self) -> usize;

    /// Whether no live vector is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opaque state snapshot; restore with the backend's `restore_state`.
    fn serialize_state(&self) -> Result<Vec<u8>>;
}

pub(crate) fn check_min_matches(min_matches: usize) -> Result<()> {
    if min_matches == 0 {
        return Err(MatchError::InvalidParameter(
            "min_matches must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Fold per-query nearest hits into ranked candidates.
///
/// Runs single-threaded after the parallel fan-out has joined; vote
/// counting is commutative, so sub-task completion order never matters.
pub(crate) fn tally_votes(
    hits: impl IntoIterator<Item = (OwnerId, f32)>,
    min_matches: usize,
) -> Vec<MatchCandidate> {
    let mut votes: HashMap<OwnerId, (usize, f32)> = HashMap::new();
    for (owner, dist_sq) in hits {
        let entry = votes.entry(owner).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += dist_sq.sqrt();
    }
    let mut candidates: Vec<MatchCandidate> = votes
        .into_iter()
        .filter(|(_, (count, _))| *count >= min_matches)
        .map(|(owner, (matches, distance_sum))| MatchCandidate {
            owner,
            matches,
            distance_sum,
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then_with(|| a.average_distance().total_cmp(&b.average_distance()))
            .then_with(|| a.owner.cmp(&b.owner))
    });
    candidates
}
