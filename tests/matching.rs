//! Integration tests for the matching backends.
//!
//! Exercises the manager contract end to end: bind/replace/unbind, vote
//! aggregation with a minimum match threshold, backend parity, cancellation,
//! and snapshot round-trips.

use kindred::{
    CancelToken, FeatureVector, MatchError, MatchIndex, ParallelScanManager, TreeSearchManager,
};
use rand::prelude::*;

fn feature(v: &[f32]) -> FeatureVector {
    FeatureVector::from_descriptor(v.to_vec())
}

fn random_features(rng: &mut StdRng, n: usize, dim: usize) -> Vec<FeatureVector> {
    (0..n)
        .map(|_| {
            FeatureVector::new(
                (0..dim).map(|_| rng.gen::<f32>() * 20.0 - 10.0).collect(),
                rng.gen::<f32>(),
                rng.gen::<f32>() * 4.0,
            )
        })
        .collect()
}

// =============================================================================
// Contract violations
// =============================================================================

#[test]
fn wrong_dimension_feature_is_rejected_never_coerced() {
    let index = TreeSearchManager::new(3).unwrap();
    let err = index.put(1, vec![feature(&[1.0, 2.0])]).unwrap_err();
    assert_eq!(
        err,
        MatchError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    );
    // Nothing was inserted.
    assert!(index.is_empty());

    index.put(1, vec![feature(&[1.0, 2.0, 3.0])]).unwrap();
    let err = index
        .find_matches(&[feature(&[1.0, 2.0, 3.0, 4.0])], 1)
        .unwrap_err();
    assert!(matches!(err, MatchError::DimensionMismatch { .. }));
}

#[test]
fn zero_min_matches_is_invalid() {
    let index = TreeSearchManager::new(2).unwrap();
    index.put(1, vec![feature(&[0.0, 0.0])]).unwrap();
    assert!(matches!(
        index.find_matches(&[feature(&[0.0, 0.0])], 0),
        Err(MatchError::InvalidParameter(_))
    ));
    let scan = ParallelScanManager::new(2).unwrap();
    scan.put(1, vec![feature(&[0.0, 0.0])]).unwrap();
    assert!(matches!(
        scan.find_matches(&[feature(&[0.0, 0.0])], 0),
        Err(MatchError::InvalidParameter(_))
    ));
}

// =============================================================================
// Bind / replace / unbind
// =============================================================================

#[test]
fn put_is_full_replace() {
    let index = TreeSearchManager::new(2).unwrap();
    index.set_query_budget_micros(0);
    index
        .put(1, vec![feature(&[0.0, 0.0]), feature(&[1.0, 1.0])])
        .unwrap();
    assert_eq!(index.len(), 2);

    index.put(1, vec![feature(&[5.0, 5.0])]).unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index.features(1).unwrap(), vec![feature(&[5.0, 5.0])]);

    // The replaced descriptors no longer vote.
    let matches = index.find_matches(&[feature(&[0.0, 0.0])], 1).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].owner, 1);
    let matches = index.find_matches(&[feature(&[5.0, 5.0])], 1).unwrap();
    assert_eq!(matches[0].matches, 1);
}

#[test]
fn remove_returns_the_recorded_features() {
    let index = TreeSearchManager::new(2).unwrap();
    let bound = vec![feature(&[0.0, 1.0]), feature(&[2.0, 3.0])];
    index.put(9, bound.clone()).unwrap();

    let removed = index.remove(9).unwrap();
    assert_eq!(removed, bound);
    assert!(index.is_empty());
    assert!(index.features(9).unwrap().is_empty());

    // Unknown owner removes to empty, not an error.
    assert!(index.remove(42).unwrap().is_empty());
}

#[test]
fn reinserting_a_removed_descriptor_rebinds_it() {
    let index = TreeSearchManager::new(2).unwrap();
    index.set_query_budget_micros(0);
    index.put(1, vec![feature(&[1.0, 2.0])]).unwrap();
    index.remove(1).unwrap();
    index.put(2, vec![feature(&[1.0, 2.0])]).unwrap();

    let matches = index.find_matches(&[feature(&[1.0, 2.0])], 1).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].owner, 2);
    assert_eq!(index.len(), 1);
}

#[test]
fn colliding_descriptor_across_owners_keeps_first() {
    let index = TreeSearchManager::new(2).unwrap();
    index.set_query_budget_micros(0);
    index.put(1, vec![feature(&[4.0, 4.0])]).unwrap();
    index.put(2, vec![feature(&[4.0, 4.0])]).unwrap();

    // Only the first owner's association is discoverable.
    let matches = index.find_matches(&[feature(&[4.0, 4.0])], 1).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].owner, 1);

    // The loser removing its recorded copy must not delete the winner's node.
    index.remove(2).unwrap();
    let matches = index.find_matches(&[feature(&[4.0, 4.0])], 1).unwrap();
    assert_eq!(matches[0].owner, 1);
}

// =============================================================================
// Vote aggregation
// =============================================================================

#[test]
fn threshold_excludes_owners_below_min_matches() {
    let index = TreeSearchManager::new(2).unwrap();
    index.set_query_budget_micros(0);
    index
        .put(
            1, // owner A: three descriptors in one corner
            vec![
                feature(&[0.0, 0.0]),
                feature(&[1.0, 0.0]),
                feature(&[0.0, 1.0]),
            ],
        )
        .unwrap();
    index.put(2, vec![feature(&[100.0, 100.0])]).unwrap();

    // Each query vector is nearest to one of A's descriptors.
    let query = [
        feature(&[0.1, 0.1]),
        feature(&[1.1, 0.0]),
        feature(&[0.0, 1.1]),
    ];
    let matches = index.find_matches(&query, 2).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].owner, 1);
    assert_eq!(matches[0].matches, 3);
}

#[test]
fn empty_index_short_circuits_to_empty() {
    let tree = TreeSearchManager::new(4).unwrap();
    let scan = ParallelScanManager::new(4).unwrap();
    let query = [feature(&[0.0, 0.0, 0.0, 0.0])];
    assert!(tree.find_matches(&query, 1).unwrap().is_empty());
    assert!(scan.find_matches(&query, 1).unwrap().is_empty());
}

#[test]
fn empty_query_yields_no_candidates() {
    let index = TreeSearchManager::new(2).unwrap();
    index.put(1, vec![feature(&[0.0, 0.0])]).unwrap();
    assert!(index.find_matches(&[], 1).unwrap().is_empty());
}

#[test]
fn backends_agree_under_unbounded_budget() {
    let mut rng = StdRng::seed_from_u64(7);
    let dim = 16;
    let tree = TreeSearchManager::new(dim).unwrap();
    let scan = ParallelScanManager::new(dim).unwrap();
    tree.set_query_budget_micros(0);
    scan.set_query_budget_micros(0);

    for owner in 0..12u64 {
        let features = random_features(&mut rng, 20, dim);
        tree.put(owner, features.clone()).unwrap();
        scan.put(owner, features).unwrap();
    }

    let query = random_features(&mut rng, 40, dim);
    let from_tree = tree.find_matches(&query, 2).unwrap();
    let from_scan = scan.find_matches(&query, 2).unwrap();

    let rank_tree: Vec<(u64, usize)> = from_tree.iter().map(|c| (c.owner, c.matches)).collect();
    let rank_scan: Vec<(u64, usize)> = from_scan.iter().map(|c| (c.owner, c.matches)).collect();
    assert_eq!(rank_tree, rank_scan);

    for (a, b) in from_tree.iter().zip(from_scan.iter()) {
        assert!((a.distance_sum - b.distance_sum).abs() < 1e-3);
    }
}

#[test]
fn candidate_scores_are_consistent() {
    let index = TreeSearchManager::new(2).unwrap();
    index.set_query_budget_micros(0);
    index
        .put(1, vec![feature(&[0.0, 0.0]), feature(&[3.0, 4.0])])
        .unwrap();

    let query = [feature(&[0.0, 0.1]), feature(&[3.0, 3.9])];
    let matches = index.find_matches(&query, 1).unwrap();
    assert_eq!(matches.len(), 1);
    let candidate = &matches[0];
    assert_eq!(candidate.matches, 2);
    assert!((candidate.average_distance() - candidate.distance_sum / 2.0).abs() < 1e-6);
    assert!(candidate.degree() > 0.0);
}

// =============================================================================
// Budget degradation
// =============================================================================

#[test]
fn exhausted_budget_degrades_instead_of_failing() {
    let mut rng = StdRng::seed_from_u64(21);
    let dim = 32;
    let tree = TreeSearchManager::new(dim).unwrap();
    let scan = ParallelScanManager::new(dim).unwrap();
    // One microsecond is gone before the first distance is computed, so
    // both walks run out mid-batch and must still tally cleanly.
    tree.set_query_budget_micros(1);
    scan.set_query_budget_micros(1);

    for owner in 0..50u64 {
        let features = random_features(&mut rng, 100, dim);
        tree.put(owner, features.clone()).unwrap();
        scan.put(owner, features).unwrap();
    }

    let query = random_features(&mut rng, 64, dim);
    let from_tree = tree.find_matches(&query, 1).unwrap();
    let from_scan = scan.find_matches(&query, 1).unwrap();
    assert!(from_tree.len() <= 50);
    assert!(from_scan.len() <= 50);
}

#[test]
fn maximal_budget_never_wraps_the_deadline() {
    let mut rng = StdRng::seed_from_u64(23);
    let dim = 8;
    let scan = ParallelScanManager::new(dim).unwrap();
    scan.set_query_budget_micros(u64::MAX);
    scan.put(1, random_features(&mut rng, 16, dim)).unwrap();

    // A multi-vector query multiplies the per-feature share into the
    // combined batch deadline; a saturated budget must stay a far-future
    // deadline rather than wrapping into an already-expired one.
    let query = random_features(&mut rng, 8, dim);
    let matches = scan.find_matches(&query, 1).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].owner, 1);
    assert_eq!(matches[0].matches, 8);
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn cancelled_token_propagates_out_of_the_batch() {
    let index = TreeSearchManager::new(2).unwrap();
    index.put(1, vec![feature(&[0.0, 0.0])]).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let err = index
        .find_matches_with_token(&[feature(&[1.0, 1.0])], 1, &token)
        .unwrap_err();
    assert_eq!(err, MatchError::Cancelled);
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn tree_snapshot_round_trips() {
    let mut rng = StdRng::seed_from_u64(11);
    let index = TreeSearchManager::new(8).unwrap();
    index.set_query_budget_micros(0);
    for owner in 0..5u64 {
        index.put(owner, random_features(&mut rng, 6, 8)).unwrap();
    }
    let query = random_features(&mut rng, 10, 8);
    let before = index.find_matches(&query, 1).unwrap();

    let bytes = index.serialize_state().unwrap();
    let restored = TreeSearchManager::restore_state(&bytes).unwrap();
    assert_eq!(restored.len(), index.len());
    assert_eq!(restored.features(3).unwrap(), index.features(3).unwrap());
    assert_eq!(restored.find_matches(&query, 1).unwrap(), before);
}

#[test]
fn scan_snapshot_round_trips() {
    let mut rng = StdRng::seed_from_u64(13);
    let scan = ParallelScanManager::new(8).unwrap();
    scan.set_query_budget_micros(0);
    for owner in 0..5u64 {
        scan.put(owner, random_features(&mut rng, 6, 8)).unwrap();
    }
    let query = random_features(&mut rng, 10, 8);
    let before = scan.find_matches(&query, 1).unwrap();

    let bytes = scan.serialize_state().unwrap();
    let restored = ParallelScanManager::restore_state(&bytes).unwrap();
    assert_eq!(restored.len(), scan.len());
    assert_eq!(restored.find_matches(&query, 1).unwrap(), before);
}

#[test]
fn snapshots_are_backend_tagged() {
    let tree = TreeSearchManager::new(2).unwrap();
    tree.put(1, vec![feature(&[0.0, 0.0])]).unwrap();
    let bytes = tree.serialize_state().unwrap();
    assert!(matches!(
        ParallelScanManager::restore_state(&bytes),
        Err(MatchError::Format(_))
    ));
}
