//! In-memory [`Store`] implementation for tests and local experiments.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Similarity search
//! is brute-force cosine similarity over the experience's vectors.
//! Search and sampling can be switched to fail so callers can exercise
//! their fallback paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{BotConfig, ChatMessageRecord, EmbeddingRecord, ScoredChunk, TrainingDocument};

use super::Store;

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    configs: RwLock<HashMap<String, BotConfig>>,
    docs: RwLock<Vec<TrainingDocument>>,
    embeddings: RwLock<Vec<EmbeddingRecord>>,
    messages: RwLock<Vec<ChatMessageRecord>>,
    fail_search: AtomicBool,
    fail_sample: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make [`Store::match_embeddings`] return an error.
    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Make [`Store::sample_embeddings`] return an error.
    pub fn fail_sample(&self, fail: bool) {
        self.fail_sample.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of stored embeddings.
    pub fn embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        Ok(read(&self.embeddings)?.clone())
    }

    /// Snapshot of the message log, oldest first.
    pub fn chat_messages(&self) -> Result<Vec<ChatMessageRecord>> {
        Ok(read(&self.messages)?.clone())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_bot_config(&self, experience_id: &str) -> Result<Option<BotConfig>> {
        Ok(read(&self.configs)?.get(experience_id).cloned())
    }

    async fn upsert_bot_config(&self, config: &BotConfig) -> Result<BotConfig> {
        let mut configs = write(&self.configs)?;
        let mut stored = config.clone();
        if let Some(existing) = configs.get(&config.experience_id) {
            stored.created_at = existing.created_at;
        }
        configs.insert(config.experience_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn insert_document(&self, doc: &TrainingDocument) -> Result<()> {
        let mut docs = write(&self.docs)?;
        if docs.iter().any(|d| d.id == doc.id) {
            bail!("document {} already exists", doc.id);
        }
        docs.push(doc.clone());
        Ok(())
    }

    async fn update_document(&self, doc: &TrainingDocument) -> Result<bool> {
        let mut docs = write(&self.docs)?;
        match docs
            .iter_mut()
            .find(|d| d.id == doc.id && d.experience_id == doc.experience_id)
        {
            Some(existing) => {
                existing.content = doc.content.clone();
                existing.file_name = doc.file_name.clone();
                existing.file_type = doc.file_type;
                existing.updated_at = doc.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_document(
        &self,
        experience_id: &str,
        doc_id: &str,
    ) -> Result<Option<TrainingDocument>> {
        Ok(read(&self.docs)?
            .iter()
            .find(|d| d.id == doc_id && d.experience_id == experience_id)
            .cloned())
    }

    async fn list_documents(&self, experience_id: &str) -> Result<Vec<TrainingDocument>> {
        let docs = read(&self.docs)?;
        // newest first; later inserts win ties
        let mut out: Vec<TrainingDocument> = docs
            .iter()
            .rev()
            .filter(|d| d.experience_id == experience_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_document(&self, experience_id: &str, doc_id: &str) -> Result<bool> {
        let removed = {
            let mut docs = write(&self.docs)?;
            let before = docs.len();
            docs.retain(|d| !(d.id == doc_id && d.experience_id == experience_id));
            docs.len() != before
        };
        if removed {
            self.delete_document_embeddings(experience_id, doc_id).await?;
        }
        Ok(removed)
    }

    async fn insert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        write(&self.embeddings)?.push(record.clone());
        Ok(())
    }

    async fn delete_document_embeddings(&self, experience_id: &str, doc_id: &str) -> Result<u64> {
        let mut embeddings = write(&self.embeddings)?;
        let before = embeddings.len();
        embeddings.retain(|e| {
            !(e.experience_id == experience_id && e.metadata.doc_id.as_deref() == Some(doc_id))
        });
        Ok((before - embeddings.len()) as u64)
    }

    async fn match_embeddings(
        &self,
        experience_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if self.fail_search.load(Ordering::SeqCst) {
            bail!("vector search unavailable");
        }
        let embeddings = read(&self.embeddings)?;
        let mut matches: Vec<ScoredChunk> = embeddings
            .iter()
            .filter(|e| e.experience_id == experience_id)
            .map(|e| ScoredChunk {
                content: e.content.clone(),
                similarity: cosine_similarity(query, &e.embedding),
            })
            .filter(|m| m.similarity >= threshold)
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn sample_embeddings(&self, experience_id: &str, limit: usize) -> Result<Vec<String>> {
        if self.fail_sample.load(Ordering::SeqCst) {
            bail!("embeddings table unavailable");
        }
        Ok(read(&self.embeddings)?
            .iter()
            .filter(|e| e.experience_id == experience_id)
            .take(limit)
            .map(|e| e.content.clone())
            .collect())
    }

    async fn insert_chat_message(&self, record: &ChatMessageRecord) -> Result<()> {
        write(&self.messages)?.push(record.clone());
        Ok(())
    }

    async fn last_processed_message_id(&self, experience_id: &str) -> Result<Option<String>> {
        let messages = read(&self.messages)?;
        // max_by_key keeps the last of equal keys, i.e. the latest insert
        Ok(messages
            .iter()
            .filter(|m| m.experience_id == experience_id)
            .max_by_key(|m| m.created_at)
            .map(|m| m.message_id.clone()))
    }

    async fn is_message_processed(&self, experience_id: &str, message_id: &str) -> Result<bool> {
        Ok(read(&self.messages)?
            .iter()
            .any(|m| m.experience_id == experience_id && m.message_id == message_id))
    }
}
