//! Storage abstraction for CoachBot.
//!
//! The [`Store`] trait covers every persistence operation the pipeline
//! needs, so the SQLite backend in the `coachbot` crate and the
//! [`InMemoryStore`](memory::InMemoryStore) used by tests are
//! interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{BotConfig, ChatMessageRecord, EmbeddingRecord, ScoredChunk, TrainingDocument};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_bot_config`](Store::get_bot_config) | Load the bot config for an experience |
/// | [`upsert_bot_config`](Store::upsert_bot_config) | Insert or update by experience id |
/// | [`insert_document`](Store::insert_document) | Add a training document |
/// | [`update_document`](Store::update_document) | Replace a document's content in place |
/// | [`get_document`](Store::get_document) | Load one document |
/// | [`list_documents`](Store::list_documents) | Documents for an experience, newest first |
/// | [`delete_document`](Store::delete_document) | Remove a document and its embeddings |
/// | [`insert_embedding`](Store::insert_embedding) | Store one embedded chunk |
/// | [`delete_document_embeddings`](Store::delete_document_embeddings) | Purge a document's chunks |
/// | [`match_embeddings`](Store::match_embeddings) | Thresholded similarity search |
/// | [`sample_embeddings`](Store::sample_embeddings) | Unranked chunks, used when search fails |
/// | [`insert_chat_message`](Store::insert_chat_message) | Append to the message log |
/// | [`last_processed_message_id`](Store::last_processed_message_id) | Newest logged message id |
/// | [`is_message_processed`](Store::is_message_processed) | Dedup lookup by source id |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_bot_config(&self, experience_id: &str) -> Result<Option<BotConfig>>;

    /// Insert or update keyed on `experience_id`; returns the stored row.
    ///
    /// `created_at` is kept from the existing row on update.
    async fn upsert_bot_config(&self, config: &BotConfig) -> Result<BotConfig>;

    async fn insert_document(&self, doc: &TrainingDocument) -> Result<()>;

    /// Update content, file name, kind and `updated_at` of an existing
    /// document. Returns `false` if no document matched.
    async fn update_document(&self, doc: &TrainingDocument) -> Result<bool>;

    async fn get_document(&self, experience_id: &str, doc_id: &str)
        -> Result<Option<TrainingDocument>>;

    async fn list_documents(&self, experience_id: &str) -> Result<Vec<TrainingDocument>>;

    /// Delete a document and every embedding whose metadata names it.
    /// Returns `false` if no document matched.
    async fn delete_document(&self, experience_id: &str, doc_id: &str) -> Result<bool>;

    async fn insert_embedding(&self, record: &EmbeddingRecord) -> Result<()>;

    /// Returns the number of embeddings removed.
    async fn delete_document_embeddings(&self, experience_id: &str, doc_id: &str) -> Result<u64>;

    /// Chunks of `experience_id` whose cosine similarity to `query` is at
    /// least `threshold`, best first, at most `limit`.
    async fn match_embeddings(
        &self,
        experience_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Up to `limit` stored chunks for the experience, in no particular order.
    async fn sample_embeddings(&self, experience_id: &str, limit: usize) -> Result<Vec<String>>;

    async fn insert_chat_message(&self, record: &ChatMessageRecord) -> Result<()>;

    /// Source message id of the most recently logged message.
    async fn last_processed_message_id(&self, experience_id: &str) -> Result<Option<String>>;

    async fn is_message_processed(&self, experience_id: &str, message_id: &str) -> Result<bool>;
}
