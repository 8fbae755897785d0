//! Bounded best-N candidate stores for nearest-neighbor walks.

use std::collections::BinaryHeap;

use crate::error::{MatchError, Result};

/// Sink offered candidates during a nearest-neighbor walk.
///
/// `worst_distance` must stay `+∞` until the sink is full so pruning never
/// discards candidates before N exist.
pub trait NeighborSink<T> {
    /// Offer a candidate at the given squared distance.
    fn offer(&mut self, item: T, dist_sq: f32);

    /// The squared distance of the worst retained candidate, or `+∞` while
    /// capacity remains.
    fn worst_distance(&self) -> f32;
}

/// Single-best specialization for the per-query-vector vote.
///
/// Skips the heap machinery entirely; the managers resolve one nearest
/// owner per query vector, which is the overwhelmingly common case.
#[derive(Debug, Clone, Default)]
pub struct NearestSlot<T> {
    best: Option<(T, f32)>,
}

impl<T> NearestSlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self { best: None }
    }

    /// The best candidate seen so far, if any.
    pub fn best(&self) -> Option<&(T, f32)> {
        self.best.as_ref()
    }

    /// Consume the slot, yielding the best candidate.
    pub fn into_best(self) -> Option<(T, f32)> {
        self.best
    }
}

impl<T> NeighborSink<T> for NearestSlot<T> {
    fn offer(&mut self, item: T, dist_sq: f32) {
        match &self.best {
            Some((_, d)) if dist_sq >= *d => {}
            _ => self.best = Some((item, dist_sq)),
        }
    }

    fn worst_distance(&self) -> f32 {
        match &self.best {
            Some((_, d)) => *d,
            None => f32::INFINITY,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    dist_sq: f32,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.dist_sq.total_cmp(&other.dist_sq).is_eq()
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist_sq.total_cmp(&other.dist_sq)
    }
}

/// Fixed-capacity best-N store over a max-heap.
///
/// Accepts unconditionally until full; once full, a candidate is accepted
/// only if strictly better than the current worst, which it evicts.
#[derive(Debug, Clone)]
pub struct NeighborHeap<T> {
    capacity: usize,
    heap: BinaryHeap<Entry<T>>,
}

impl<T> NeighborHeap<T> {
    /// Create a store retaining the best `capacity` candidates.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MatchError::InvalidParameter(
                "neighbor store capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
        })
    }

    /// Number of retained candidates.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no candidate has been retained yet.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether the store has reached capacity.
    pub fn is_full(&self) -> bool {
        self.heap.len() == self.capacity
    }

    /// Drain retained candidates best-to-worst.
    pub fn drain_ascending(self) -> Vec<(T, f32)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| (e.item, e.dist_sq))
            .collect()
    }
}

impl<T> NeighborSink<T> for NeighborHeap<T> {
    fn offer(&mut self, item: T, dist_sq: f32) {
        if self.heap.len() < self.capacity {
            self.heap.push(Entry { dist_sq, item });
            return;
        }
        if let Some(worst) = self.heap.peek() {
            if dist_sq < worst.dist_sq {
                self.heap.pop();
                self.heap.push(Entry { dist_sq, item });
            }
        }
    }

    fn worst_distance(&self) -> f32 {
        if self.heap.len() < self.capacity {
            return f32::INFINITY;
        }
        self.heap.peek().map_or(f32::INFINITY, |e| e.dist_sq)
    }
}
