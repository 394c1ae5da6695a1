//! Ingestion pipeline: content → chunks → vectors → store.
//!
//! All chunks of one document are embedded and stored concurrently. The
//! pipeline is not transactional: when a chunk fails, siblings that were
//! already stored stay stored and the error names the failing chunk.
//! Re-ingesting a document is the caller's job (see [`crate::training`]):
//! purge its old embeddings first, then ingest again.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use coachbot_core::chunk::{split_chunks, MAX_CHUNK_ITERATIONS};
use coachbot_core::embedding::is_valid_vector;
use coachbot_core::error::EmbedError;
use coachbot_core::models::{EmbeddingMetadata, EmbeddingRecord};
use coachbot_core::store::Store;

use crate::config::ChunkingConfig;
use crate::embedder::Embedder;
use crate::error::{BotError, Result};

pub struct Ingestor {
    embedder: Arc<Embedder>,
    store: Arc<dyn Store>,
    chunk_size: usize,
    overlap: usize,
}

impl Ingestor {
    pub fn new(embedder: Arc<Embedder>, store: Arc<dyn Store>, chunking: &ChunkingConfig) -> Self {
        Self {
            embedder,
            store,
            chunk_size: chunking.chunk_size,
            overlap: chunking.overlap,
        }
    }

    /// Chunk, embed and store `content`. Returns the number of chunks stored.
    ///
    /// Whitespace-only chunks carry nothing to embed and are skipped; they
    /// keep their position in `chunk_index` numbering.
    pub async fn ingest(
        &self,
        experience_id: &str,
        content: &str,
        doc_id: Option<&str>,
    ) -> Result<usize> {
        if content.trim().is_empty() {
            return Err(BotError::EmptyContent);
        }

        let split = split_chunks(content, self.chunk_size, self.overlap);
        if split.hit_ceiling {
            warn!(
                experience_id,
                doc_id,
                limit = MAX_CHUNK_ITERATIONS,
                "chunk limit reached; the rest of the document is not indexed"
            );
        }
        if split.chunks.is_empty() {
            return Err(BotError::NoChunks);
        }

        let total = split.chunks.len();
        info!(experience_id, doc_id, chunks = total, "ingesting content");

        let results = join_all(
            split
                .chunks
                .iter()
                .enumerate()
                .map(|(index, chunk)| self.process_chunk(experience_id, doc_id, index, chunk)),
        )
        .await;

        let mut stored = 0usize;
        let mut first_failure = None;
        let mut failed = 0usize;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(true) => stored += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    if first_failure.is_none() {
                        first_failure = Some((index, e));
                    }
                }
            }
        }

        if let Some((index, source)) = first_failure {
            warn!(
                experience_id,
                doc_id,
                failed,
                stored,
                total,
                "ingestion failed; stored chunks were kept"
            );
            return Err(BotError::ChunkFailed {
                index,
                total,
                source: Box::new(source),
            });
        }

        info!(experience_id, doc_id, stored, "ingestion complete");
        Ok(stored)
    }

    /// `Ok(false)` when the chunk was blank and skipped.
    async fn process_chunk(
        &self,
        experience_id: &str,
        doc_id: Option<&str>,
        index: usize,
        chunk: &str,
    ) -> Result<bool> {
        if chunk.trim().is_empty() {
            debug!(experience_id, index, "skipping blank chunk");
            return Ok(false);
        }

        let vector = self.embedder.embed(chunk).await?;
        if !is_valid_vector(&vector, self.embedder.dims()) {
            return Err(BotError::Embedding(EmbedError::Malformed(format!(
                "expected {} finite values, got {}",
                self.embedder.dims(),
                vector.len()
            ))));
        }

        let record = EmbeddingRecord {
            id: Uuid::new_v4().to_string(),
            experience_id: experience_id.to_string(),
            content: chunk.to_string(),
            embedding: vector,
            metadata: EmbeddingMetadata {
                doc_id: doc_id.map(str::to_string),
                chunk_index: index,
            },
        };
        self.store
            .insert_embedding(&record)
            .await
            .map_err(BotError::persistence)?;
        Ok(true)
    }
}
