//! Error types for kindred.

use thiserror::Error;

/// Errors that can occur during indexing/matching operations.
///
/// Degraded results (a per-query deadline or a scan batch timeout) are not
/// errors: the call returns whatever best candidates it has so far.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Vector length does not match the index dimensionality.
    #[error("dimension mismatch: index has {expected} dimensions, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid parameter value (zero dimension, zero capacity, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A batch was cooperatively cancelled mid-flight.
    #[error("matching batch cancelled")]
    Cancelled,

    /// Operation not available on this backend.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Snapshot envelope is malformed (bad magic, version, or kind).
    #[error("snapshot format error: {0}")]
    Format(String),

    /// Snapshot payload failed to encode or decode.
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
}

/// Result type for indexing/matching operations.
pub type Result<T> = std::result::Result<T, MatchError>;
