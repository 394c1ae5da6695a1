//! Stub collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use coachbot::config::{Config, Secrets};
use coachbot::generate::{ChatModel, CompletionRequest};
use coachbot::platform::{AccessGrant, AccessVerifier, Channel, ChatPlatform};
use coachbot::services::{Collaborators, Services};
use coachbot_core::embedding::EmbeddingService;
use coachbot_core::error::{EmbedError, ProviderError};
use coachbot_core::models::{BotConfig, PlatformMessage};
use coachbot_core::store::memory::InMemoryStore;
use coachbot_core::store::Store;

pub const WEBHOOK_SECRET: &str = "whsec_dGVzdC13ZWJob29rLXNlY3JldA==";
pub const ADMIN_TOKEN: &str = "token-admin";
pub const MEMBER_TOKEN: &str = "token-member";

/// Returns a constant vector of `len` values; inputs containing
/// `fail_marker` fail with a provider error.
pub struct StubEmbeddings {
    pub len: AtomicUsize,
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<String>>,
    pub fail_marker: Mutex<Option<String>>,
}

impl StubEmbeddings {
    pub fn new(len: usize) -> Self {
        Self {
            len: AtomicUsize::new(len),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            fail_marker: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_on(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }
}

#[async_trait]
impl EmbeddingService for StubEmbeddings {
    fn model_name(&self) -> &str {
        "stub-embedding"
    }

    async fn embed_raw(&self, input: &str) -> Result<Vec<f64>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_string());
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref() {
            if input.contains(marker) {
                return Err(ProviderError::ServiceUnavailable {
                    service: "embeddings".into(),
                    status: 503,
                }
                .into());
            }
        }
        Ok(vec![0.5; self.len.load(Ordering::SeqCst)])
    }
}

/// Records every completion request and answers with a fixed reply.
pub struct StubChat {
    pub reply: Mutex<Option<String>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl StubChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Mutex::new(Some(reply.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for StubChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.reply.lock().unwrap().clone())
    }
}

/// An in-memory channel.
#[derive(Default)]
pub struct StubPlatform {
    pub messages: Mutex<Vec<PlatformMessage>>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_send: AtomicBool,
    pub webhooks: Mutex<Vec<(String, String)>>,
    pub fail_register: AtomicBool,
}

impl StubPlatform {
    pub fn push(&self, id: &str, content: &str) {
        self.messages.lock().unwrap().push(PlatformMessage {
            id: id.to_string(),
            content: content.to_string(),
            user_id: "user_1".to_string(),
        });
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for StubPlatform {
    async fn list_messages(&self, _channel_id: &str, limit: usize) -> Result<Vec<PlatformMessage>, ProviderError> {
        let messages = self.messages.lock().unwrap();
        Ok(messages.iter().take(limit).cloned().collect())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), ProviderError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ProviderError::ServiceUnavailable {
                service: "whop".into(),
                status: 502,
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn list_channels(&self, experience_id: &str) -> Result<Vec<Channel>, ProviderError> {
        Ok(vec![Channel {
            id: format!("{}_general", experience_id),
            name: Some("General".into()),
        }])
    }

    async fn register_webhook(&self, experience_id: &str, url: &str) -> Result<(), ProviderError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(ProviderError::other("whop", "status 404: not found"));
        }
        self.webhooks
            .lock()
            .unwrap()
            .push((experience_id.to_string(), url.to_string()));
        Ok(())
    }
}

/// `ADMIN_TOKEN` is an admin of every experience, `MEMBER_TOKEN` a
/// plain member.
pub struct StubAccess {
    users: HashMap<&'static str, &'static str>,
}

impl Default for StubAccess {
    fn default() -> Self {
        let mut users = HashMap::new();
        users.insert(ADMIN_TOKEN, "user_admin");
        users.insert(MEMBER_TOKEN, "user_member");
        Self { users }
    }
}

#[async_trait]
impl AccessVerifier for StubAccess {
    async fn verify_user_token(&self, token: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.users.get(token).map(|u| u.to_string()))
    }

    async fn check_access(&self, user_id: &str, _experience_id: &str) -> Result<AccessGrant, ProviderError> {
        Ok(AccessGrant {
            has_access: true,
            access_level: if user_id == "user_admin" {
                "admin".into()
            } else {
                "customer".into()
            },
        })
    }
}

/// Services wired to stubs and an in-memory store.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub embeddings: Arc<StubEmbeddings>,
    pub chat: Arc<StubChat>,
    pub platform: Arc<StubPlatform>,
    pub services: Arc<Services>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::minimal("unused.sqlite"))
    }

    pub fn with_config(config: Config) -> Self {
        let dims = config.embedding.dims;
        let store = Arc::new(InMemoryStore::new());
        let embeddings = Arc::new(StubEmbeddings::new(dims));
        let chat = Arc::new(StubChat::replying("Happy to help!"));
        let platform = Arc::new(StubPlatform::default());
        let secrets = Secrets {
            openai_api_key: Some("sk-test".into()),
            whop_api_key: Some("whop-test".into()),
            webhook_secret: Some(WEBHOOK_SECRET.into()),
        };
        let services = Services::assemble(
            config,
            secrets,
            Collaborators {
                store: store.clone(),
                embeddings: embeddings.clone(),
                chat: chat.clone(),
                platform: platform.clone(),
                access: Arc::new(StubAccess::default()),
                avatars: None,
            },
        );
        Self {
            store,
            embeddings,
            chat,
            platform,
            services: Arc::new(services),
        }
    }

    /// Store a bot configuration with a channel.
    pub async fn configure(&self, experience_id: &str, channel_id: &str) -> BotConfig {
        let config = BotConfig {
            channel_id: Some(channel_id.to_string()),
            ..BotConfig::defaults_for(experience_id)
        };
        self.store.upsert_bot_config(&config).await.unwrap()
    }
}
