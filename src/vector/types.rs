//! Type-safe wrappers and core types for embedding vectors.
//!
//! Newtypes here keep raw `usize`/`f32` values from leaking across module
//! boundaries: a dimension is validated once, a similarity is known to be
//! finite and within the cosine range.

use std::time::Duration;
use thiserror::Error;

/// Standard vector dimension for user embeddings.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Type-safe wrapper for cosine similarity values.
///
/// Values lie in [-1.0, 1.0]:
/// - 1.0 indicates identical direction
/// - 0.0 indicates orthogonal vectors (or a zero-norm vector)
/// - -1.0 indicates opposite direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity(f32);

impl Similarity {
    /// Creates a new `Similarity` with validation.
    ///
    /// Returns an error if the value is NaN or outside [-1.0, 1.0].
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidSimilarity {
                value,
                reason: "Similarity cannot be NaN",
            });
        }
        if !(-1.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidSimilarity {
                value,
                reason: "Similarity must be in range [-1.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Clamps a raw cosine value into range. Rounding can push a cosine of
    /// two parallel vectors to 1.0000001; NaN maps to zero.
    #[must_use]
    pub fn saturating(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(-1.0, 1.0))
        }
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Similarity {}

impl PartialOrd for Similarity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Similarity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Construction rejects NaN, so total_cmp agrees with partial_cmp here.
        self.0.total_cmp(&other.0)
    }
}

/// Type-safe wrapper for vector dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates the standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl Default for VectorDimension {
    fn default() -> Self {
        Self::dimension_384()
    }
}

/// Errors that can occur during embedding index operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all embeddings come from the same model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid similarity value: {value}\nReason: {reason}")]
    InvalidSimilarity { value: f32, reason: &'static str },

    #[error("Invalid vector component: {reason}\nSuggestion: Reject NaN or infinite values upstream")]
    NonFiniteComponent { reason: &'static str },

    #[error("Invalid embedding metadata: {0}\nSuggestion: Skill level must be 1-10 and velocity non-negative")]
    InvalidMetadata(String),

    #[error(
        "Embedding index unavailable: {0}\nSuggestion: Check connectivity to the vector store"
    )]
    Unavailable(String),

    #[error(
        "Embedding index call timed out after {0:?}\nSuggestion: Raise index.timeout_ms or check vector store load"
    )]
    Timeout(Duration),
}

impl VectorError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, VectorError::Unavailable(_) | VectorError::Timeout(_))
    }
}
