//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs. Similarity search loads
//! the experience's vectors and ranks them in process with cosine
//! similarity; communities hold a few thousand chunks at most, so a
//! brute-force scan is fast enough.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use coachbot_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use coachbot_core::models::{
    now_ts, BotConfig, ChatMessageRecord, EmbeddingRecord, FileKind, Personality, ScoredChunk,
    TrainingDocument,
};
use coachbot_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_config(row: &SqliteRow) -> Result<BotConfig> {
    let personality: String = row.get("personality");
    Ok(BotConfig {
        experience_id: row.get("experience_id"),
        bot_name: row.get("bot_name"),
        bot_avatar_url: row.get("bot_avatar_url"),
        personality: personality
            .parse::<Personality>()
            .with_context(|| "Corrupt bot_config row")?,
        channel_id: row.get("channel_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_document(row: &SqliteRow) -> TrainingDocument {
    let file_type: String = row.get("file_type");
    TrainingDocument {
        id: row.get("id"),
        experience_id: row.get("experience_id"),
        content: row.get("content"),
        file_name: row.get("file_name"),
        file_type: FileKind::parse_lenient(&file_type),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_bot_config(&self, experience_id: &str) -> Result<Option<BotConfig>> {
        let row = sqlx::query(
            r#"
            SELECT experience_id, bot_name, bot_avatar_url, personality, channel_id,
                   created_at, updated_at
            FROM bot_config
            WHERE experience_id = ?
            "#,
        )
        .bind(experience_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_config).transpose()
    }

    async fn upsert_bot_config(&self, config: &BotConfig) -> Result<BotConfig> {
        let row = sqlx::query(
            r#"
            INSERT INTO bot_config (experience_id, bot_name, bot_avatar_url, personality,
                                    channel_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(experience_id) DO UPDATE SET
                bot_name = excluded.bot_name,
                bot_avatar_url = excluded.bot_avatar_url,
                personality = excluded.personality,
                channel_id = excluded.channel_id,
                updated_at = excluded.updated_at
            RETURNING experience_id, bot_name, bot_avatar_url, personality, channel_id,
                      created_at, updated_at
            "#,
        )
        .bind(&config.experience_id)
        .bind(&config.bot_name)
        .bind(&config.bot_avatar_url)
        .bind(config.personality.as_str())
        .bind(&config.channel_id)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row_to_config(&row)
    }

    async fn insert_document(&self, doc: &TrainingDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_docs (id, experience_id, content, file_name, file_type,
                                       created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.experience_id)
        .bind(&doc.content)
        .bind(&doc.file_name)
        .bind(doc.file_type.as_str())
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_document(&self, doc: &TrainingDocument) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE training_docs
            SET content = ?, file_name = ?, file_type = ?, updated_at = ?
            WHERE id = ? AND experience_id = ?
            "#,
        )
        .bind(&doc.content)
        .bind(&doc.file_name)
        .bind(doc.file_type.as_str())
        .bind(doc.updated_at)
        .bind(&doc.id)
        .bind(&doc.experience_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_document(
        &self,
        experience_id: &str,
        doc_id: &str,
    ) -> Result<Option<TrainingDocument>> {
        let row = sqlx::query(
            r#"
            SELECT id, experience_id, content, file_name, file_type, created_at, updated_at
            FROM training_docs
            WHERE id = ? AND experience_id = ?
            "#,
        )
        .bind(doc_id)
        .bind(experience_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn list_documents(&self, experience_id: &str) -> Result<Vec<TrainingDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, experience_id, content, file_name, file_type, created_at, updated_at
            FROM training_docs
            WHERE experience_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(experience_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn delete_document(&self, experience_id: &str, doc_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM embeddings WHERE experience_id = ? AND doc_id = ?")
            .bind(experience_id)
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM training_docs WHERE id = ? AND experience_id = ?")
            .bind(doc_id)
            .bind(experience_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn insert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embeddings (id, experience_id, content, embedding, doc_id,
                                    chunk_index, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.experience_id)
        .bind(&record.content)
        .bind(vec_to_blob(&record.embedding))
        .bind(&record.metadata.doc_id)
        .bind(record.metadata.chunk_index as i64)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_document_embeddings(&self, experience_id: &str, doc_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embeddings WHERE experience_id = ? AND doc_id = ?")
            .bind(experience_id)
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn match_embeddings(
        &self,
        experience_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query("SELECT content, embedding FROM embeddings WHERE experience_id = ?")
            .bind(experience_id)
            .fetch_all(&self.pool)
            .await?;

        let mut matches: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query, &blob_to_vec(&blob));
                (similarity >= threshold).then(|| ScoredChunk {
                    content: row.get("content"),
                    similarity,
                })
            })
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
        let rows = sqlx::query("SELECT content FROM embeddings WHERE experience_id = ? LIMIT ?")
            .bind(experience_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("content")).collect())
    }

    async fn insert_chat_message(&self, record: &ChatMessageRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (experience_id, channel_id, message_id, user_id,
                                       content, response, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.experience_id)
        .bind(&record.channel_id)
        .bind(&record.message_id)
        .bind(&record.user_id)
        .bind(&record.content)
        .bind(&record.response)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_processed_message_id(&self, experience_id: &str) -> Result<Option<String>> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT message_id FROM chat_messages
            WHERE experience_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(experience_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn is_message_processed(&self, experience_id: &str, message_id: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM chat_messages WHERE experience_id = ? AND message_id = ?)",
        )
        .bind(experience_id)
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coachbot_core::models::EmbeddingMetadata;

    async fn open() -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = crate::config::Config::minimal(tmp.path().join("data/test.sqlite"));
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn doc(id: &str, created_at: i64) -> TrainingDocument {
        TrainingDocument {
            id: id.to_string(),
            experience_id: "exp".to_string(),
            content: "We are open 9-5 Mon-Fri.".to_string(),
            file_name: Some("hours.txt".to_string()),
            file_type: FileKind::Text,
            created_at,
            updated_at: created_at,
        }
    }

    fn embedding(id: &str, doc_id: Option<&str>, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            experience_id: "exp".to_string(),
            content: format!("content {id}"),
            embedding: vector,
            metadata: EmbeddingMetadata {
                doc_id: doc_id.map(String::from),
                chunk_index: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_config_upsert_roundtrip() {
        let (_tmp, store) = open().await;
        assert!(store.get_bot_config("exp").await.unwrap().is_none());

        let mut cfg = BotConfig::defaults_for("exp");
        cfg.created_at = 100;
        cfg.updated_at = 100;
        store.upsert_bot_config(&cfg).await.unwrap();

        cfg.bot_name = "Ada".to_string();
        cfg.personality = Personality::Professional;
        cfg.created_at = 200;
        cfg.updated_at = 200;
        let stored = store.upsert_bot_config(&cfg).await.unwrap();
        assert_eq!(stored.bot_name, "Ada");
        assert_eq!(stored.personality, Personality::Professional);
        assert_eq!(stored.created_at, 100);
        assert_eq!(stored.updated_at, 200);
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let (_tmp, store) = open().await;
        store.insert_document(&doc("d1", 1)).await.unwrap();
        store.insert_document(&doc("d2", 2)).await.unwrap();

        let listed = store.list_documents("exp").await.unwrap();
        assert_eq!(listed[0].id, "d2");
        assert_eq!(listed[1].id, "d1");

        let mut updated = doc("d1", 1);
        updated.content = "Closed on Sundays.".to_string();
        updated.file_type = FileKind::Pdf;
        updated.updated_at = 5;
        assert!(store.update_document(&updated).await.unwrap());
        let got = store.get_document("exp", "d1").await.unwrap().unwrap();
        assert_eq!(got.content, "Closed on Sundays.");
        assert_eq!(got.file_type, FileKind::Pdf);

        assert!(!store.update_document(&doc("missing", 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_embeddings() {
        let (_tmp, store) = open().await;
        store.insert_document(&doc("d1", 1)).await.unwrap();
        store.insert_embedding(&embedding("e1", Some("d1"), vec![1.0, 0.0])).await.unwrap();
        store.insert_embedding(&embedding("e2", None, vec![1.0, 0.0])).await.unwrap();

        assert!(store.delete_document("exp", "d1").await.unwrap());
        assert!(!store.delete_document("exp", "d1").await.unwrap());

        let left = store.sample_embeddings("exp", 10).await.unwrap();
        assert_eq!(left, vec!["content e2"]);
    }

    #[tokio::test]
    async fn test_match_embeddings_ranked_and_thresholded() {
        let (_tmp, store) = open().await;
        store.insert_embedding(&embedding("far", None, vec![0.0, 1.0])).await.unwrap();
        store.insert_embedding(&embedding("near", None, vec![0.8, 0.2])).await.unwrap();
        store.insert_embedding(&embedding("exact", None, vec![1.0, 0.0])).await.unwrap();

        let hits = store.match_embeddings("exp", &[1.0, 0.0], 0.7, 5).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(names, vec!["content exact", "content near"]);
        assert!(store
            .match_embeddings("other", &[1.0, 0.0], 0.7, 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_message_log() {
        let (_tmp, store) = open().await;
        assert!(store.last_processed_message_id("exp").await.unwrap().is_none());
        for id in ["m1", "m2"] {
            store
                .insert_chat_message(&ChatMessageRecord {
                    experience_id: "exp".to_string(),
                    channel_id: "chan".to_string(),
                    message_id: id.to_string(),
                    user_id: "u1".to_string(),
                    content: "hours?".to_string(),
                    response: "9-5".to_string(),
                    created_at: 10,
                })
                .await
                .unwrap();
        }
        assert_eq!(
            store.last_processed_message_id("exp").await.unwrap().as_deref(),
            Some("m2")
        );
        assert!(store.is_message_processed("exp", "m1").await.unwrap());
        assert!(!store.is_message_processed("exp", "m3").await.unwrap());
    }
}
