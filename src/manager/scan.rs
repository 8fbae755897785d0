//! Parallel brute-force scan backend.
//!
//! Stored vectors live in fixed-size flat lines (vector data plus a
//! parallel owner-id array). Each query vector is resolved by a
//! data-parallel minimum reduction over every line, one work unit per
//! (query vector × line), with a SIMD-friendly inner loop over the K
//! dimensions. No tree, no reverse index: insert+query only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use crate::feature::{FeatureVector, OwnerId};
use crate::simd;
use crate::snapshot::{self, SnapshotKind};
use crate::tree::DEFAULT_QUERY_BUDGET_MICROS;

use super::{check_min_matches, tally_votes, MatchCandidate, MatchIndex};

/// Vectors per line. Scans parallelize across lines, so this bounds the
/// work-unit granularity.
const LINE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScanLine {
    vectors: Vec<f32>,
    owners: Vec<OwnerId>,
}

impl ScanLine {
    fn with_capacity(dimension: usize) -> Self {
        Self {
            vectors: Vec::with_capacity(LINE_CAPACITY * dimension),
            owners: Vec::with_capacity(LINE_CAPACITY),
        }
    }

    fn len(&self) -> usize {
        self.owners.len()
    }

    fn is_full(&self) -> bool {
        self.owners.len() == LINE_CAPACITY
    }

    fn push(&mut self, descriptor: &[f32], owner: OwnerId) {
        self.vectors.extend_from_slice(descriptor);
        self.owners.push(owner);
    }

    /// Nearest stored vector of this line to `target`, by squared distance.
    fn min_distance(&self, target: &[f32], dimension: usize) -> Option<(OwnerId, f32)> {
        let mut best: Option<(OwnerId, f32)> = None;
        for (i, &owner) in self.owners.iter().enumerate() {
            let stored = &self.vectors[i * dimension..(i + 1) * dimension];
            let dist_sq = simd::l2_distance_squared(target, stored);
            match best {
                Some((_, d)) if dist_sq >= d => {}
                _ => best = Some((owner, dist_sq)),
            }
        }
        best
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ScanState {
    dimension: usize,
    per_feature_timeout_micros: u64,
    lines: Vec<ScanLine>,
    total: usize,
}

/// Matching backend scanning flat vector batches brute-force in parallel.
///
/// `put` appends: without a reverse index there is nothing to replace, and
/// `remove`/`features` are unsupported. A query batch is bounded by
/// `per_feature_timeout × query_count`; once that combined deadline passes,
/// remaining (query × line) units are skipped and the partial aggregate
/// proceeds silently.
#[derive(Debug)]
pub struct ParallelScanManager {
    state: RwLock<ScanState>,
}

impl ParallelScanManager {
    /// Create a backend over `dimension`-length descriptors.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(MatchError::InvalidParameter(
                "scan dimensionality must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            state: RwLock::new(ScanState {
                dimension,
                per_feature_timeout_micros: DEFAULT_QUERY_BUDGET_MICROS,
                lines: Vec::new(),
                total: 0,
            }),
        })
    }

    /// Restore a backend from bytes produced by
    /// [`MatchIndex::serialize_state`].
    pub fn restore_state(bytes: &[u8]) -> Result<Self> {
        let state: ScanState = snapshot::decode(SnapshotKind::ParallelScan, bytes)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Descriptor dimensionality.
    pub fn dimension(&self) -> usize {
        self.state.read().dimension
    }
}

impl MatchIndex for ParallelScanManager {
    /// Append-only: the features join the stored corpus under `owner`.
    fn put(&self, owner: OwnerId, features: Vec<FeatureVector>) -> Result<()> {
        let mut state = self.state.write();
        for feature in &features {
            if feature.len() != state.dimension {
                return Err(MatchError::DimensionMismatch {
                    expected: state.dimension,
                    actual: feature.len(),
                });
            }
        }
        let dimension = state.dimension;
        for feature in &features {
            if state.lines.last().map_or(true, ScanLine::is_full) {
                state.lines.push(ScanLine::with_capacity(dimension));
            }
            if let Some(line) = state.lines.last_mut() {
                line.push(feature.descriptor(), owner);
            }
            state.total += 1;
        }
        Ok(())
    }

    fn remove(&self, _owner: OwnerId) -> Result<Vec<FeatureVector>> {
        Err(MatchError::NotSupported(
            "parallel scan backend is insert+query only",
        ))
    }

    fn features(&self, _owner: OwnerId) -> Result<Vec<FeatureVector>> {
        Err(MatchError::NotSupported(
            "parallel scan backend keeps no reverse index",
        ))
    }

    fn find_matches(
        &self,
        query: &[FeatureVector],
        min_matches: usize,
    ) -> Result<Vec<MatchCandidate>> {
        check_min_matches(min_matches)?;
        let state = self.state.read();
        for feature in query {
            if feature.len() != state.dimension {
                return Err(MatchError::DimensionMismatch {
                    expected: state.dimension,
                    actual: feature.len(),
                });
            }
        }
        if state.total == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let deadline = match state.per_feature_timeout_micros {
            0 => None,
            micros => Some(
                Instant::now()
                    + Duration::from_micros(micros.saturating_mul(query.len() as u64)),
            ),
        };
        let degraded = AtomicBool::new(false);
        let hits: Vec<Option<(OwnerId, f32)>> = query
            .par_iter()
            .map(|feature| {
                state
                    .lines
                    .par_iter()
                    .filter_map(|line| {
                        if deadline.is_some_and(|d| Instant::now() >= d) {
                            degraded.store(true, Ordering::Relaxed);
                            return None;
                        }
                        line.min_distance(feature.descriptor(), state.dimension)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))
            })
            .collect();
        if degraded.load(Ordering::Relaxed) {
            tracing::debug!(
                query_count = query.len(),
                "scan batch deadline reached, tallying a partial aggregate"
            );
        }
        Ok(tally_votes(hits.into_iter().flatten(), min_matches))
    }

    /// For this backend the budget is the per-feature share of the combined
    /// batch timeout.
    fn set_query_budget_micros(&self, micros: u64) {
        self.state.write().per_feature_timeout_micros = micros;
    }

    fn len(&self) -> usize {
        self.state.read().total
    }

    fn serialize_state(&self) -> Result<Vec<u8>> {
        let state = self.state.read();
        snapshot::encode(SnapshotKind::ParallelScan, &*state)
    }
}
