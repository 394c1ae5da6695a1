//! Context retrieval for grounded answers.
//!
//! Retrieval degrades instead of failing when the store misbehaves: a
//! failed similarity search falls back to a handful of unranked chunks,
//! and a failed fallback yields no context at all. Only embedding the
//! query can fail the call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use coachbot_core::store::Store;

use crate::embedder::Embedder;
use crate::error::Result;

/// Source of knowledge-base context for a question.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Up to `limit` chunk texts for `experience_id`, most relevant first.
    async fn retrieve(&self, query: &str, experience_id: &str, limit: usize) -> Result<Vec<String>>;
}

/// Similarity search over the experience's stored embeddings.
pub struct VectorRetriever {
    embedder: Arc<Embedder>,
    store: Arc<dyn Store>,
    threshold: f32,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<Embedder>, store: Arc<dyn Store>, threshold: f32) -> Self {
        Self {
            embedder,
            store,
            threshold,
        }
    }
}

#[async_trait]
impl ContextRetriever for VectorRetriever {
    async fn retrieve(&self, query: &str, experience_id: &str, limit: usize) -> Result<Vec<String>> {
        let query_vec = self.embedder.embed(query).await?;

        match self
            .store
            .match_embeddings(experience_id, &query_vec, self.threshold, limit)
            .await
        {
            Ok(matches) => {
                debug!(experience_id, matches = matches.len(), "similarity search");
                Ok(matches.into_iter().map(|m| m.content).collect())
            }
            Err(e) => {
                warn!(experience_id, error = %e, "similarity search failed; using unranked chunks");
                match self.store.sample_embeddings(experience_id, limit).await {
                    Ok(chunks) => Ok(chunks),
                    Err(e) => {
                        warn!(experience_id, error = %e, "fallback retrieval failed; answering without context");
                        Ok(Vec::new())
                    }
                }
            }
        }
    }
}
