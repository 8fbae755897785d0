//! Axis-aligned bounding boxes for branch-and-bound pruning.

use crate::simd;

/// Axis-aligned hyper-rectangle in K dimensions.
///
/// The pruning primitive of the nearest-neighbor walk: a subtree whose box
/// cannot contain a point closer than the current worst retained candidate
/// is skipped entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperRect {
    lo: Vec<f32>,
    hi: Vec<f32>,
}

impl HyperRect {
    /// The infinite box covering all of K-dimensional space.
    #[must_use]
    pub fn infinite(k: usize) -> Self {
        Self {
            lo: vec![f32::NEG_INFINITY; k],
            hi: vec![f32::INFINITY; k],
        }
    }

    /// Lower bounds, one per dimension.
    #[must_use]
    pub fn lo(&self) -> &[f32] {
        &self.lo
    }

    /// Upper bounds, one per dimension.
    #[must_use]
    pub fn hi(&self) -> &[f32] {
        &self.hi
    }

    /// Split along `dim` at `value` into the left (`<= value`) and right
    /// (`>= value`) halves. The two boxes differ only in that dimension's
    /// bound.
    #[must_use]
    pub fn split(&self, dim: usize, value: f32) -> (Self, Self) {
        let mut left = self.clone();
        let mut right = self.clone();
        left.hi[dim] = value;
        right.lo[dim] = value;
        (left, right)
    }

    /// The point inside the box closest to `target`: `target` clamped to
    /// the box bounds componentwise.
    #[must_use]
    pub fn closest_point(&self, target: &[f32]) -> Vec<f32> {
        target
            .iter()
            .zip(self.lo.iter().zip(self.hi.iter()))
            .map(|(&t, (&lo, &hi))| t.clamp(lo, hi))
            .collect()
    }

    /// Squared distance from `target` to the closest point of the box.
    ///
    /// Zero when `target` lies inside the box.
    #[must_use]
    pub fn min_dist_squared(&self, target: &[f32]) -> f32 {
        simd::l2_distance_squared(target, &self.closest_point(target))
    }
}
