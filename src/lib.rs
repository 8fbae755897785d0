//! kindred: nearest-neighbor matching core for similarity-based image
//! lookup.
//!
//! Given a corpus of images known only by their local feature descriptors,
//! and a query image's descriptor set, rank the corpus images that most
//! resemble the query. Each query vector votes for the owner of its nearest
//! stored descriptor; owners reaching a minimum match count come back as
//! ranked [`MatchCandidate`]s.
//!
//! Two interchangeable backends implement the same [`MatchIndex`] contract,
//! picked at construction time:
//!
//! - [`TreeSearchManager`]: a k-d tree with lazy deletion plus an
//!   owner→features reverse index. One branch-and-bound nearest-neighbor
//!   walk per query vector, fanned across the rayon pool, each bounded by
//!   a per-query time budget (latency over completeness: an exhausted
//!   budget yields an approximate result, not an error).
//! - [`ParallelScanManager`]: flat batched storage scanned brute-force,
//!   one data-parallel work unit per (query vector × stored line).
//!   Insert+query only.
//!
//! # Example
//!
//! ```
//! use kindred::{FeatureVector, MatchIndex, TreeSearchManager};
//!
//! # fn main() -> kindred::Result<()> {
//! let index = TreeSearchManager::new(2)?;
//! index.put(1, vec![
//!     FeatureVector::from_descriptor(vec![0.0, 0.0]),
//!     FeatureVector::from_descriptor(vec![1.0, 0.0]),
//! ])?;
//!
//! let query = [FeatureVector::from_descriptor(vec![0.1, 0.0])];
//! let matches = index.find_matches(&query, 1)?;
//! assert_eq!(matches[0].owner, 1);
//! # Ok(())
//! # }
//! ```
//!
//! Feature extraction, image pre-processing, and the surrounding
//! persistence layer are out of scope; the backends only guarantee their
//! state is an opaque, snapshot-able byte blob
//! ([`MatchIndex::serialize_state`]).

pub mod cancel;
pub mod error;
pub mod feature;
pub mod manager;
pub mod simd;
pub mod snapshot;
pub mod tree;

pub use cancel::CancelToken;
pub use error::{MatchError, Result};
pub use feature::{FeatureVector, OwnerId};
pub use manager::{MatchCandidate, MatchIndex, ParallelScanManager, TreeSearchManager};
pub use tree::{InsertOutcome, KdTree, DEFAULT_QUERY_BUDGET_MICROS};
