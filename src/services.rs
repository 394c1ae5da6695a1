//! Wiring: build the pipeline once from configuration and share it.
//!
//! External collaborators are trait objects so tests can swap in stubs
//! through [`Services::assemble`]; production code uses
//! [`Services::connect`].

use std::sync::Arc;

use anyhow::Result;

use coachbot_core::embedding::EmbeddingService;
use coachbot_core::store::Store;

use crate::avatar::{AvatarStorage, LocalAvatarStorage};
use crate::config::{Config, Secrets};
use crate::db;
use crate::embedder::Embedder;
use crate::generate::{ChatModel, Generator};
use crate::ingest::Ingestor;
use crate::migrate;
use crate::openai::{OpenAiChat, OpenAiEmbeddings};
use crate::platform::{AccessVerifier, ChatPlatform, WhopClient};
use crate::reconcile::Reconciler;
use crate::retrieve::{ContextRetriever, VectorRetriever};
use crate::sqlite_store::SqliteStore;
use crate::training::Training;

/// The external systems the pipeline talks to.
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub embeddings: Arc<dyn EmbeddingService>,
    pub chat: Arc<dyn ChatModel>,
    pub platform: Arc<dyn ChatPlatform>,
    pub access: Arc<dyn AccessVerifier>,
    pub avatars: Option<Arc<dyn AvatarStorage>>,
}

/// Everything a request handler or CLI command needs.
pub struct Services {
    pub config: Arc<Config>,
    pub secrets: Secrets,
    pub store: Arc<dyn Store>,
    pub embedder: Arc<Embedder>,
    pub generator: Arc<Generator>,
    pub ingestor: Arc<Ingestor>,
    pub training: Arc<Training>,
    pub reconciler: Arc<Reconciler>,
    pub platform: Arc<dyn ChatPlatform>,
    pub access: Arc<dyn AccessVerifier>,
    pub avatars: Option<Arc<dyn AvatarStorage>>,
}

impl Services {
    /// Open the database (running migrations) and build the HTTP clients.
    pub async fn connect(config: Config, secrets: Secrets) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::migrate(&pool).await?;

        let whop = Arc::new(WhopClient::new(
            &config.platform,
            secrets.whop_api_key.clone(),
        )?);
        let avatars = match (&config.storage.avatar_dir, &config.storage.public_url) {
            (Some(dir), Some(url)) => {
                Some(Arc::new(LocalAvatarStorage::new(dir.clone(), url.clone())) as Arc<dyn AvatarStorage>)
            }
            _ => None,
        };

        let collaborators = Collaborators {
            store: Arc::new(SqliteStore::new(pool)),
            embeddings: Arc::new(OpenAiEmbeddings::new(
                &config.embedding,
                secrets.openai_api_key.clone(),
            )?),
            chat: Arc::new(OpenAiChat::new(
                &config.generation,
                secrets.openai_api_key.clone(),
            )?),
            platform: whop.clone(),
            access: whop,
            avatars,
        };

        Ok(Self::assemble(config, secrets, collaborators))
    }

    /// Build the pipeline around the given collaborators.
    pub fn assemble(config: Config, secrets: Secrets, c: Collaborators) -> Self {
        let embedder = Arc::new(Embedder::new(c.embeddings, config.embedding.dims));
        let retriever: Arc<dyn ContextRetriever> = Arc::new(VectorRetriever::new(
            embedder.clone(),
            c.store.clone(),
            config.retrieval.match_threshold,
        ));
        let generator = Arc::new(Generator::new(
            retriever,
            c.chat,
            &config.generation,
            config.retrieval.match_count,
        ));
        let ingestor = Arc::new(Ingestor::new(
            embedder.clone(),
            c.store.clone(),
            &config.chunking,
        ));
        let training = Arc::new(Training::new(c.store.clone(), ingestor.clone()));
        let reconciler = Arc::new(Reconciler::new(
            c.store.clone(),
            generator.clone(),
            c.platform.clone(),
            config.platform.poll_batch,
        ));

        Self {
            config: Arc::new(config),
            secrets,
            store: c.store,
            embedder,
            generator,
            ingestor,
            training,
            reconciler,
            platform: c.platform,
            access: c.access,
            avatars: c.avatars,
        }
    }
}
