//! Vector arithmetic shared by the index and the similarity engine.
//!
//! Cosine similarity is the only distance used for matching; it is computed
//! in f32 over raw (not pre-normalized) vectors so zero-norm inputs can be
//! detected and mapped to 0.0 instead of NaN.

/// Epsilon for floating-point norm comparisons.
const EPSILON: f32 = 1e-10;

/// Computes cosine similarity between two vectors.
///
/// # Returns
/// * Cosine similarity in range [-1, 1], where 1 is most similar.
///   Returns 0.0 if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a <= EPSILON || norm_b <= EPSILON {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Normalizes a vector in-place to unit length.
///
/// Vectors with (near) zero norm are left untouched.
pub fn normalize_vector(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Creates a normalized copy of a vector.
pub fn normalize_vector_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_vector(&mut normalized);
    normalized
}
