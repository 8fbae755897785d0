//! Feature descriptors and owner identity.

use serde::{Deserialize, Serialize};

/// Identifier of the image a feature belongs to.
///
/// Opaque to the index: many features map to one owner, and matching only
/// ever aggregates votes per owner.
pub type OwnerId = u64;

/// One local image keypoint descriptor.
///
/// The descriptor is a fixed-length float vector and is the only part the
/// index looks at; orientation and scale are keypoint metadata carried for
/// the callers that extracted the feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    descriptor: Vec<f32>,
    orientation: f32,
    scale: f32,
}

impl FeatureVector {
    /// Create a feature from a raw descriptor and its keypoint metadata.
    pub fn new(descriptor: Vec<f32>, orientation: f32, scale: f32) -> Self {
        Self {
            descriptor,
            orientation,
            scale,
        }
    }

    /// Create a feature from a descriptor alone, with zeroed metadata.
    pub fn from_descriptor(descriptor: Vec<f32>) -> Self {
        Self::new(descriptor, 0.0, 0.0)
    }

    /// The descriptor vector.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &[f32] {
        &self.descriptor
    }

    /// Descriptor length.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptor.len()
    }

    /// Whether the descriptor is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    /// Keypoint orientation in radians.
    #[inline]
    #[must_use]
    pub fn orientation(&self) -> f32 {
        self.orientation
    }

    /// Keypoint scale.
    #[inline]
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }
}
