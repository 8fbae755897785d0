//! Dense vector kernels.
//!
//! Portable implementations kept in a shape the autovectorizer handles well:
//! tight `zip`/`sum` loops over contiguous `f32` slices. Both the tree walk
//! and the flat scan funnel every distance computation through here.

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// L2 (Euclidean) distance between two vectors.
#[inline]
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// L2 distance squared (faster when only comparing distances).
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_basic() {
        let a = [1.0_f32, 2.0, 3.0];
        let b = [4.0_f32, 5.0, 6.0];
        assert!((dot(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_norm() {
        let v = [3.0_f32, 4.0];
        assert!((norm(&v) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_distance() {
        let a = [0.0_f32, 0.0];
        let b = [3.0_f32, 4.0];
        assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-6);
        assert!((l2_distance_squared(&a, &b) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = [0.5_f32, -1.25, 3.0, 7.5];
        assert!(l2_distance_squared(&a, &a).abs() < 1e-10);
    }
}
