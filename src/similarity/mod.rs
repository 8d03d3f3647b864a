//! Pairwise and top-K similarity over stored user embeddings.

mod engine;
mod retry;

pub use engine::{SimilarUser, SimilarityEngine, SimilarityFilter};
pub use retry::RetryPolicy;
