//! Host platform (Whop) REST client.
//!
//! Each operation has exactly one request/response contract. A response
//! that does not match fails with [`ProviderError::Other`] instead of
//! probing alternative endpoints or shapes.
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | [`list_messages`](ChatPlatform::list_messages) | `GET {api}/messages?channel_id=&limit=` | `{ "data": [message] }` |
//! | [`send_message`](ChatPlatform::send_message) | `POST {api}/messages` `{channel_id, content}` | any 2xx |
//! | [`list_channels`](ChatPlatform::list_channels) | `GET {api}/experiences/{experience}/channels` | `{ "data": [channel] }` |
//! | [`register_webhook`](ChatPlatform::register_webhook) | `POST {api}/webhooks` `{url, events, experience_id}` | any 2xx |
//! | [`verify_user_token`](AccessVerifier::verify_user_token) | `GET {api}/me` with the user token | `{ "id" }` |
//! | [`check_access`](AccessVerifier::check_access) | `GET {api}/users/{user}/access/{experience}` | `{ "has_access", "access_level" }` |
//!
//! Ids taken from requests are pushed as single percent-encoded path
//! segments; `.` and `..` are rejected.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use coachbot_core::error::ProviderError;
use coachbot_core::models::PlatformMessage;

use crate::config::{PlatformConfig, WHOP_API_KEY};
use crate::error::BotError;

const SERVICE: &str = "Whop";

/// Event the bot subscribes to when registering its webhook.
pub const MESSAGE_CREATED_EVENT: &str = "chat.message.created";

/// Header carrying the end user's platform token on admin requests.
pub const USER_TOKEN_HEADER: &str = "x-whop-user-token";

/// Reading and posting chat messages.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Up to `limit` recent messages of a channel, in the order the
    /// platform returns them.
    async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>, ProviderError>;

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), ProviderError>;

    /// Chat channels of an experience, for picking the bot's channel.
    async fn list_channels(&self, experience_id: &str) -> Result<Vec<Channel>, ProviderError>;

    /// Subscribe `url` to new chat messages of an experience.
    async fn register_webhook(&self, experience_id: &str, url: &str) -> Result<(), ProviderError>;
}

/// A chat channel the bot can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A user's access to an experience.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessGrant {
    pub has_access: bool,
    pub access_level: String,
}

impl AccessGrant {
    pub fn is_admin(&self) -> bool {
        self.has_access && self.access_level == "admin"
    }
}

/// Delegated authentication and authorization.
#[async_trait]
pub trait AccessVerifier: Send + Sync {
    /// The user id behind a token, or `None` if the platform rejects it.
    async fn verify_user_token(&self, token: &str) -> Result<Option<String>, ProviderError>;

    async fn check_access(
        &self,
        user_id: &str,
        experience_id: &str,
    ) -> Result<AccessGrant, ProviderError>;
}

/// Resolve the caller and require admin access to `experience_id`.
///
/// Missing or rejected tokens are [`BotError::Authentication`]; a failed
/// or non-admin access check is [`BotError::Authorization`].
pub async fn authorize_admin(
    verifier: &dyn AccessVerifier,
    token: Option<&str>,
    experience_id: &str,
) -> Result<String, BotError> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BotError::Authentication(format!("missing {} header", USER_TOKEN_HEADER)))?;

    let user_id = match verifier.verify_user_token(token).await {
        Ok(Some(id)) => id,
        Ok(None) => return Err(BotError::Authentication("invalid user token".into())),
        Err(e) => {
            tracing::warn!(error = %e, "user token verification failed");
            return Err(BotError::Authentication("could not verify user token".into()));
        }
    };

    match verifier.check_access(&user_id, experience_id).await {
        Ok(grant) if grant.is_admin() => Ok(user_id),
        Ok(_) => Err(BotError::Authorization("admin access required".into())),
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, experience_id, "access check failed");
            Err(BotError::Authorization("could not verify access".into()))
        }
    }
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: serde_json::Value,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    data: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
}

impl WireMessage {
    fn into_message(self) -> Result<PlatformMessage, ProviderError> {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(ProviderError::other(
                    SERVICE,
                    format!("message id has unexpected type: {}", other),
                ))
            }
        };
        Ok(PlatformMessage {
            id,
            content: self.content.unwrap_or_default(),
            user_id: self
                .user
                .map(|u| u.id)
                .or(self.user_id)
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

// ============ Client ============

/// REST client authenticated with the app's `WHOP_API_KEY`.
pub struct WhopClient {
    client: Client,
    api_key: Option<String>,
    base: Url,
}

impl WhopClient {
    pub fn new(config: &PlatformConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base = Url::parse(config.api_base.trim_end_matches('/'))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("platform api_base is not a base URL: {}", config.api_base);
        }
        Ok(Self {
            client,
            api_key,
            base,
        })
    }

    /// `{api}/seg/seg...`, each segment percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(ProviderError::other(
                SERVICE,
                format!("invalid path segment {:?}", bad),
            ));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::other(SERVICE, "api base cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::NotConfigured {
            service: SERVICE,
            var: WHOP_API_KEY,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::other(SERVICE, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(SERVICE, status.as_u16(), text));
        }
        Ok(response)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, ProviderError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::other(SERVICE, format!("unexpected {} response: {}", what, e)))
}

#[async_trait]
impl ChatPlatform for WhopClient {
    async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>, ProviderError> {
        let limit = limit.to_string();
        let request = self
            .client
            .get(self.endpoint(&["messages"])?)
            .bearer_auth(self.api_key()?)
            .query(&[("channel_id", channel_id), ("limit", limit.as_str())]);
        let list: MessageList = decode(self.send(request).await?, "message list").await?;
        list.data.into_iter().map(WireMessage::into_message).collect()
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), ProviderError> {
        let request = self
            .client
            .post(self.endpoint(&["messages"])?)
            .bearer_auth(self.api_key()?)
            .json(&serde_json::json!({
                "channel_id": channel_id,
                "content": content,
            }));
        self.send(request).await?;
        Ok(())
    }

    async fn list_channels(&self, experience_id: &str) -> Result<Vec<Channel>, ProviderError> {
        let request = self
            .client
            .get(self.endpoint(&["experiences", experience_id, "channels"])?)
            .bearer_auth(self.api_key()?);
        let list: ChannelList = decode(self.send(request).await?, "channel list").await?;
        Ok(list.data)
    }

    async fn register_webhook(&self, experience_id: &str, url: &str) -> Result<(), ProviderError> {
        let request = self
            .client
            .post(self.endpoint(&["webhooks"])?)
            .bearer_auth(self.api_key()?)
            .json(&serde_json::json!({
                "url": url,
                "events": [MESSAGE_CREATED_EVENT],
                "experience_id": experience_id,
            }));
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl AccessVerifier for WhopClient {
    async fn verify_user_token(&self, token: &str) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .get(self.endpoint(&["me"])?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::other(SERVICE, e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                let me: Me = decode(response, "user").await?;
                Ok(Some(me.id))
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(ProviderError::from_status(SERVICE, status.as_u16(), text))
            }
        }
    }

    async fn check_access(
        &self,
        user_id: &str,
        experience_id: &str,
    ) -> Result<AccessGrant, ProviderError> {
        let request = self
            .client
            .get(self.endpoint(&["users", user_id, "access", experience_id])?)
            .bearer_auth(self.api_key()?);
        decode(self.send(request).await?, "access").await
    }
}
