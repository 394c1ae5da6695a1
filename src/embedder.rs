//! Text to vector, with input cleanup and shape repair.

use std::sync::Arc;

use tracing::warn;

use coachbot_core::embedding::{conform, EmbeddingService};
use coachbot_core::error::EmbedError;

/// Wraps an [`EmbeddingService`] and guarantees the configured length.
pub struct Embedder {
    service: Arc<dyn EmbeddingService>,
    dims: usize,
}

impl Embedder {
    pub fn new(service: Arc<dyn EmbeddingService>, dims: usize) -> Self {
        Self { service, dims }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed `text` into exactly [`dims`](Self::dims) finite values.
    ///
    /// Blank input fails with [`EmbedError::EmptyInput`] before any call
    /// is made. Newlines are flattened to spaces. A vector of the wrong
    /// length is padded or truncated and a warning is logged: the result
    /// is usable but no longer comparable in a meaningful way.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let input = text.replace('\n', " ");
        let raw = self.service.embed_raw(&input).await?;
        let conformed = conform(raw, self.dims)?;

        if conformed.repaired() {
            warn!(
                model = self.service.model_name(),
                returned = conformed.original_len,
                expected = self.dims,
                "embedding length mismatch; vector was padded or truncated"
            );
        }

        Ok(conformed.vector)
    }
}
