//! Embedding vectors and the index that stores them.
//!
//! Embeddings are opaque fixed-length vectors (384 components) produced
//! elsewhere. This module only stores, validates and compares them:
//! cosine similarity is the single compatibility metric used by matching.

mod index;
mod math;
mod types;

// Re-export core types for public API
pub use index::{
    EmbeddingIndex, EmbeddingMetadata, EmbeddingRecord, IndexFilter, IndexMatch,
    MemoryEmbeddingIndex,
};
pub use math::{cosine_similarity, normalize_vector, normalize_vector_copy};
pub use types::{Similarity, VECTOR_DIMENSION_384, VectorDimension, VectorError};
