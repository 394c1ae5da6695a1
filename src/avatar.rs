//! Bot avatar uploads.
//!
//! Images go to the configured [`AvatarStorage`]. When no storage is
//! configured, or the write fails, the image is returned inline as a
//! `data:` URL so the admin can still save it on the bot config.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{BotError, Result};

/// Largest accepted avatar, in bytes.
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Object storage for avatars.
#[async_trait]
pub trait AvatarStorage: Send + Sync {
    /// Store `bytes` under `object_name` and return its public URL.
    async fn put(&self, object_name: &str, content_type: &str, bytes: &[u8]) -> anyhow::Result<String>;
}

/// Writes avatars into a directory served at `public_url`.
pub struct LocalAvatarStorage {
    dir: PathBuf,
    public_url: String,
}

impl LocalAvatarStorage {
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AvatarStorage for LocalAvatarStorage {
    async fn put(&self, object_name: &str, _content_type: &str, bytes: &[u8]) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(object_name), bytes).await?;
        Ok(format!("{}/{}", self.public_url, object_name))
    }
}

/// Where the avatar ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarMethod {
    Storage,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvatarUpload {
    pub url: String,
    pub method: AvatarMethod,
}

/// Validate and store an avatar image.
pub async fn upload_avatar(
    storage: Option<&dyn AvatarStorage>,
    experience_id: &str,
    file_name: Option<&str>,
    content_type: &str,
    bytes: &[u8],
) -> Result<AvatarUpload> {
    if !content_type.starts_with("image/") {
        return Err(BotError::Validation("File must be an image".into()));
    }
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(BotError::Validation("File size must be less than 5MB".into()));
    }
    if bytes.is_empty() {
        return Err(BotError::Validation("File is empty".into()));
    }

    if let Some(storage) = storage {
        let object_name = object_name(
            experience_id,
            file_name,
            content_type,
            chrono::Utc::now().timestamp_millis(),
        );
        match storage.put(&object_name, content_type, bytes).await {
            Ok(url) => {
                info!(experience_id, object = %object_name, "stored avatar");
                return Ok(AvatarUpload {
                    url,
                    method: AvatarMethod::Storage,
                });
            }
            Err(e) => warn!(experience_id, error = %e, "avatar storage failed; returning data URL"),
        }
    }

    Ok(AvatarUpload {
        url: format!("data:{};base64,{}", content_type, BASE64.encode(bytes)),
        method: AvatarMethod::Base64,
    })
}

/// `avatar_{experience}_{millis}.{ext}`, restricted to filesystem-safe
/// characters.
fn object_name(experience_id: &str, file_name: Option<&str>, content_type: &str, millis: i64) -> String {
    let safe_exp: String = experience_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let ext = file_name
        .and_then(|n| n.rsplit_once('.').map(|(_, ext)| ext))
        .or_else(|| content_type.strip_prefix("image/"))
        .map(|e| e.split(['+', ';']).next().unwrap_or(e).to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "png".to_string());
    format!("avatar_{}_{}.{}", safe_exp, millis, ext)
}
