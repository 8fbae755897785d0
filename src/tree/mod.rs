//! k-d tree over feature descriptors.
//!
//! The tree cycles the split dimension with depth and deletes lazily:
//! removed keys become routing nodes and are revived in place when the same
//! key is inserted again. Nearest-neighbor walks are branch-and-bound with
//! a per-query time budget, so results under time pressure are approximate
//! rather than late.

pub mod hyperrect;
pub mod kdtree;
pub mod neighbors;
mod node;

pub use hyperrect::HyperRect;
pub use kdtree::{KdTree, DEFAULT_QUERY_BUDGET_MICROS};
pub use neighbors::{NearestSlot, NeighborHeap, NeighborSink};
pub use node::InsertOutcome;
