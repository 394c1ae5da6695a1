//! Embedding service trait and vector utilities.
//!
//! Defines the [`EmbeddingService`] trait implemented by the HTTP client in
//! the `coachbot` crate (and by stubs in tests), the shape check applied
//! to every vector returned by a provider, and the helpers used to store
//! and compare vectors.

use async_trait::async_trait;

use crate::error::EmbedError;

/// Dimensionality of `text-embedding-3-small`, and of every stored vector.
pub const EMBEDDING_DIMS: usize = 1536;

/// A remote embedding model.
///
/// Implementations make exactly one provider call per invocation and
/// return the raw numbers without any length repair. Non-numeric entries
/// should be reported as `NaN` so that [`conform`] rejects them.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a single, non-empty input.
    async fn embed_raw(&self, input: &str) -> Result<Vec<f64>, EmbedError>;
}

/// A provider vector forced to the configured dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct Conformed {
    pub vector: Vec<f32>,
    /// Length the provider actually returned.
    pub original_len: usize,
}

impl Conformed {
    /// Whether the vector had to be padded or truncated.
    pub fn repaired(&self) -> bool {
        self.original_len != self.vector.len()
    }
}

/// Validate a provider vector and force it to `dims` entries.
///
/// Empty vectors and vectors with any non-finite value (including values
/// that overflow `f32`) are [`EmbedError::Malformed`]. Longer vectors are
/// truncated and shorter vectors are right-padded with zeros. The repair is
/// lossy: a padded vector lives in a different space than a native one.
pub fn conform(raw: Vec<f64>, dims: usize) -> Result<Conformed, EmbedError> {
    if raw.is_empty() {
        return Err(EmbedError::Malformed("provider returned an empty vector".into()));
    }

    let original_len = raw.len();
    let mut vector = Vec::with_capacity(dims);
    for (i, v) in raw.into_iter().enumerate() {
        let v = v as f32;
        if !v.is_finite() {
            return Err(EmbedError::Malformed(format!(
                "non-finite value at position {}",
                i
            )));
        }
        if i < dims {
            vector.push(v);
        }
    }
    vector.resize(dims, 0.0);

    Ok(Conformed {
        vector,
        original_len,
    })
}

/// Whether a vector can be stored: exact length and finite values.
pub fn is_valid_vector(vector: &[f32], dims: usize) -> bool {
    vector.len() == dims && vector.iter().all(|v| v.is_finite())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use coachbot_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conform_pads_short_vector() {
        let c = conform(vec![0.5; 1000], EMBEDDING_DIMS).unwrap();
        assert_eq!(c.vector.len(), EMBEDDING_DIMS);
        assert_eq!(c.original_len, 1000);
        assert!(c.repaired());
        assert_eq!(c.vector[999], 0.5);
        assert!(c.vector[1000..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_conform_truncates_long_vector() {
        let raw: Vec<f64> = (0..2000).map(|i| i as f64).collect();
        let c = conform(raw, EMBEDDING_DIMS).unwrap();
        assert_eq!(c.vector.len(), EMBEDDING_DIMS);
        assert_eq!(c.vector[1535], 1535.0);
        assert!(c.repaired());
    }

    #[test]
    fn test_conform_exact_length_untouched() {
        let c = conform(vec![0.1; EMBEDDING_DIMS], EMBEDDING_DIMS).unwrap();
        assert!(!c.repaired());
    }

    #[test]
    fn test_conform_rejects_empty() {
        assert!(matches!(conform(vec![], 4), Err(EmbedError::Malformed(_))));
    }

    #[test]
    fn test_conform_rejects_non_finite() {
        assert!(matches!(
            conform(vec![0.1, f64::NAN, 0.3], 3),
            Err(EmbedError::Malformed(_))
        ));
        // overflows f32
        assert!(matches!(
            conform(vec![1e300], 3),
            Err(EmbedError::Malformed(_))
        ));
        // non-finite values past the cut still count
        assert!(matches!(
            conform(vec![0.1, 0.2, f64::INFINITY], 2),
            Err(EmbedError::Malformed(_))
        ));
    }

    #[test]
    fn test_is_valid_vector() {
        assert!(is_valid_vector(&[0.0, 1.0], 2));
        assert!(!is_valid_vector(&[0.0], 2));
        assert!(!is_valid_vector(&[0.0, f32::NAN], 2));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
