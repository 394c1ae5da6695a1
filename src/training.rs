//! Training document workflow: save, re-train, list and delete.
//!
//! Saving a document stores it first and then runs ingestion. When
//! ingestion fails the document row stays, so the admin can see it and
//! submit it again under the same id.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use coachbot_core::models::{now_ts, FileKind, TrainingDocument};
use coachbot_core::store::Store;

use crate::error::{BotError, Result};
use crate::extract::{detect_kind, extract_text};
use crate::ingest::Ingestor;

/// Content submitted for training.
#[derive(Debug, Clone)]
pub enum TrainingUpload {
    Text(String),
    File {
        name: Option<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedDocument {
    pub doc_id: String,
    pub chunks: usize,
    pub replaced: bool,
}

pub struct Training {
    store: Arc<dyn Store>,
    ingestor: Arc<Ingestor>,
}

impl Training {
    pub fn new(store: Arc<dyn Store>, ingestor: Arc<Ingestor>) -> Self {
        Self { store, ingestor }
    }

    /// Store (or replace, when `doc_id` is given) a document and ingest it.
    pub async fn save(
        &self,
        experience_id: &str,
        upload: TrainingUpload,
        doc_id: Option<&str>,
    ) -> Result<SavedDocument> {
        let (content, file_name, file_type) = match upload {
            TrainingUpload::Text(text) => (text, None, FileKind::Text),
            TrainingUpload::File {
                name,
                content_type,
                bytes,
            } => {
                let kind = detect_kind(content_type.as_deref(), name.as_deref());
                let text = extract_text(&bytes, kind)
                    .map_err(|e| BotError::Validation(e.to_string()))?;
                (text, name, kind)
            }
        };

        if content.trim().is_empty() {
            return Err(BotError::Validation("Content cannot be empty".into()));
        }

        let now = now_ts();
        let doc_id = doc_id.map(str::trim).filter(|id| !id.is_empty());
        let (doc_id, replaced) = match doc_id {
            Some(id) => {
                let doc = TrainingDocument {
                    id: id.to_string(),
                    experience_id: experience_id.to_string(),
                    content: content.clone(),
                    file_name,
                    file_type,
                    created_at: now,
                    updated_at: now,
                };
                let updated = self
                    .store
                    .update_document(&doc)
                    .await
                    .map_err(BotError::persistence)?;
                if !updated {
                    return Err(BotError::NotFound(format!("training document {}", id)));
                }
                let purged = self
                    .store
                    .delete_document_embeddings(experience_id, id)
                    .await
                    .map_err(BotError::persistence)?;
                info!(experience_id, doc_id = id, purged, "replacing training document");
                (id.to_string(), true)
            }
            None => {
                let doc = TrainingDocument {
                    id: Uuid::new_v4().to_string(),
                    experience_id: experience_id.to_string(),
                    content: content.clone(),
                    file_name,
                    file_type,
                    created_at: now,
                    updated_at: now,
                };
                self.store
                    .insert_document(&doc)
                    .await
                    .map_err(BotError::persistence)?;
                (doc.id, false)
            }
        };

        let chunks = self
            .ingestor
            .ingest(experience_id, &content, Some(&doc_id))
            .await?;

        Ok(SavedDocument {
            doc_id,
            chunks,
            replaced,
        })
    }

    /// Documents of an experience, newest first.
    pub async fn list(&self, experience_id: &str) -> Result<Vec<TrainingDocument>> {
        self.store
            .list_documents(experience_id)
            .await
            .map_err(BotError::persistence)
    }

    /// Delete a document together with its embeddings.
    pub async fn delete(&self, experience_id: &str, doc_id: &str) -> Result<()> {
        let deleted = self
            .store
            .delete_document(experience_id, doc_id)
            .await
            .map_err(BotError::persistence)?;
        if !deleted {
            return Err(BotError::NotFound(format!("training document {}", doc_id)));
        }
        info!(experience_id, doc_id, "deleted training document");
        Ok(())
    }
}
