//! Core data models for CoachBot.
//!
//! These types are shared across the pipeline: bot configuration,
//! training documents, stored embeddings and the chat message log.
//! Timestamps are Unix seconds (UTC), matching the SQLite schema.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Display name used when an experience has no stored configuration.
pub const DEFAULT_BOT_NAME: &str = "CoachBot";

/// Response tone of the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    #[default]
    Friendly,
    Professional,
    Motivational,
}

impl Personality {
    pub const ALL: [Personality; 3] = [
        Personality::Friendly,
        Personality::Professional,
        Personality::Motivational,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Personality::Friendly => "friendly",
            Personality::Professional => "professional",
            Personality::Motivational => "motivational",
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a personality string is not one of the known tones.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid personality '{0}': must be friendly, professional, or motivational")]
pub struct UnknownPersonality(pub String);

impl FromStr for Personality {
    type Err = UnknownPersonality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friendly" => Ok(Personality::Friendly),
            "professional" => Ok(Personality::Professional),
            "motivational" => Ok(Personality::Motivational),
            other => Err(UnknownPersonality(other.to_string())),
        }
    }
}

/// Per-experience bot configuration, keyed by `experience_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub experience_id: String,
    pub bot_name: String,
    pub bot_avatar_url: Option<String>,
    pub personality: Personality,
    /// Legacy fixed channel; the poll path reads messages from it.
    pub channel_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl BotConfig {
    /// The configuration an admin sees before saving anything.
    pub fn defaults_for(experience_id: &str) -> Self {
        Self {
            experience_id: experience_id.to_string(),
            bot_name: DEFAULT_BOT_NAME.to_string(),
            bot_avatar_url: None,
            personality: Personality::default(),
            channel_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// How a training document was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    Text,
    Pdf,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Text => "text",
            FileKind::Pdf => "pdf",
        }
    }

    /// Anything other than `"pdf"` is treated as text.
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("pdf") {
            FileKind::Pdf
        } else {
            FileKind::Text
        }
    }
}

/// Admin-supplied knowledge for one experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDocument {
    pub id: String,
    pub experience_id: String,
    pub content: String,
    pub file_name: Option<String>,
    pub file_type: FileKind,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Provenance of an embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub doc_id: Option<String>,
    pub chunk_index: usize,
}

/// One embedded chunk of a training document.
///
/// `embedding` always has the configured dimensionality and only finite
/// values; the ingestion pipeline rejects anything else before storage.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub experience_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: EmbeddingMetadata,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub content: String,
    pub similarity: f32,
}

/// Append-only log of answered messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub experience_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub user_id: String,
    /// The question with the bot mention removed.
    pub content: String,
    pub response: String,
    pub created_at: i64,
}

/// A chat message as delivered by the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMessage {
    pub id: String,
    pub content: String,
    pub user_id: String,
}

/// Current time as Unix seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
