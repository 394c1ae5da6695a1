//! Configuration loading.
//!
//! Settings live in a TOML file (default `config/coachbot.toml`); every
//! section except `[db]` may be omitted and falls back to defaults.
//! Credentials are never read from the file: [`Secrets::from_env`] picks
//! them up from the environment (after `.env` is loaded in `main`).
//!
//! ```toml
//! [db]
//! path = "./data/coachbot.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! match_threshold = 0.7
//! match_count = 5
//!
//! [poll]
//! interval_secs = 60
//! experience_ids = ["exp_123"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use coachbot_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use coachbot_core::embedding::EMBEDDING_DIMS;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const WHOP_API_KEY: &str = "WHOP_API_KEY";
pub const WHOP_WEBHOOK_SECRET: &str = "WHOP_WEBHOOK_SECRET";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
        }
    }
}

fn default_match_threshold() -> f32 {
    0.7
}
fn default_match_count() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_openai_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            api_base: default_openai_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    EMBEDDING_DIMS
}
fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_openai_base")]
    pub api_base: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_base: default_openai_base(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4-turbo-preview".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Messages fetched per poll.
    #[serde(default = "default_poll_batch")]
    pub poll_batch: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_platform_base(),
            timeout_secs: default_timeout_secs(),
            poll_batch: default_poll_batch(),
        }
    }
}

fn default_platform_base() -> String {
    "https://api.whop.com/api/v5".to_string()
}
fn default_poll_batch() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL of this deployment, e.g. `https://bot.example.com`.
    /// Needed to register the chat webhook with the platform.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Where uploaded avatars go. Without `avatar_dir`, avatars are returned
/// inline as data URLs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub avatar_dir: Option<PathBuf>,
    /// Base URL under which `avatar_dir` is served, e.g. `https://cdn.example.com/avatars`.
    pub public_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PollConfig {
    /// Zero disables the background poller.
    #[serde(default)]
    pub interval_secs: u64,
    #[serde(default)]
    pub experience_ids: Vec<String>,
}

impl PollConfig {
    pub fn is_enabled(&self) -> bool {
        self.interval_secs > 0 && !self.experience_ids.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults everywhere, with the database at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            platform: PlatformConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            poll: PollConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Credentials, read from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub whop_api_key: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env_non_empty(OPENAI_API_KEY),
            whop_api_key: env_non_empty(WHOP_API_KEY),
            webhook_secret: env_non_empty(WHOP_WEBHOOK_SECRET),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        f.debug_struct("Secrets")
            .field("openai_api_key", &mark(&self.openai_api_key))
            .field("whop_api_key", &mark(&self.whop_api_key))
            .field("webhook_secret", &mark(&self.webhook_secret))
            .finish()
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if !(0.0..=1.0).contains(&config.retrieval.match_threshold) {
        anyhow::bail!("retrieval.match_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.match_count < 1 {
        anyhow::bail!("retrieval.match_count must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.max_tokens == 0 {
        anyhow::bail!("generation.max_tokens must be > 0");
    }

    if config.platform.poll_batch == 0 {
        anyhow::bail!("platform.poll_batch must be > 0");
    }

    if config.storage.avatar_dir.is_some() && config.storage.public_url.is_none() {
        anyhow::bail!("storage.public_url is required when storage.avatar_dir is set");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let f = write_config("[db]\npath = \"./data/test.sqlite\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.overlap, 200);
        assert_eq!(cfg.retrieval.match_count, 5);
        assert!((cfg.retrieval.match_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.embedding.model, "text-embedding-3-small");
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.generation.max_tokens, 500);
        assert!(!cfg.poll.is_enabled());
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let f = write_config(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let f = write_config("[db]\npath = \"x.sqlite\"\n[retrieval]\nmatch_threshold = 1.5\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_avatar_dir_needs_public_url() {
        let f = write_config("[db]\npath = \"x.sqlite\"\n[storage]\navatar_dir = \"./avatars\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_poll_enabled() {
        let f = write_config(
            "[db]\npath = \"x.sqlite\"\n[poll]\ninterval_secs = 30\nexperience_ids = [\"exp_1\"]\n",
        );
        assert!(load_config(f.path()).unwrap().poll.is_enabled());
    }

    #[test]
    fn test_secrets_debug_hides_values() {
        let secrets = Secrets {
            openai_api_key: Some("sk-very-secret".into()),
            ..Default::default()
        };
        let shown = format!("{:?}", secrets);
        assert!(!shown.contains("sk-very-secret"));
        assert!(shown.contains("set"));
    }
}
