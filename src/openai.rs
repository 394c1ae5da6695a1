//! OpenAI HTTP client for embeddings and chat completions.
//!
//! One request per call, no retries: callers decide what a failure means
//! (an ingestion fails, a poll moves on to the next message). Non-success
//! statuses are classified with [`ProviderError::from_status`].
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | embed | `POST {api_base}/embeddings` |
//! | complete | `POST {api_base}/chat/completions` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use coachbot_core::embedding::EmbeddingService;
use coachbot_core::error::{EmbedError, ProviderError};

use crate::config::{EmbeddingConfig, GenerationConfig, OPENAI_API_KEY};
use crate::generate::{ChatModel, CompletionRequest};

const SERVICE: &str = "OpenAI";

/// A chat message in the completions wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Embedding client for `text-embedding-3-small` (or the configured model).
pub struct OpenAiEmbeddings {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_raw(&self, input: &str) -> Result<Vec<f64>, EmbedError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured {
            service: SERVICE,
            var: OPENAI_API_KEY,
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::other(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(SERVICE, status.as_u16(), text).into());
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(format!("invalid JSON: {}", e)))?;
        parse_embedding_response(&json)
    }
}

/// Extract `data[0].embedding`. Non-numeric entries become `NaN` so the
/// shape check rejects them.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f64>, EmbedError> {
    let values = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::Malformed("missing data[0].embedding array".into()))?;

    Ok(values
        .iter()
        .map(|v| v.as_f64().unwrap_or(f64::NAN))
        .collect())
}

/// Chat completion client.
pub struct OpenAiChat {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl OpenAiChat {
    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured {
                service: SERVICE,
                var: OPENAI_API_KEY,
            })?;

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage::system(&request.system),
                ChatMessage::user(&request.user),
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::other(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(SERVICE, status.as_u16(), text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::other(SERVICE, format!("invalid response: {}", e)))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_embedding_response() {
        let json = json!({ "data": [{ "embedding": [0.1, -0.2, 3] }] });
        assert_eq!(parse_embedding_response(&json).unwrap(), vec![0.1, -0.2, 3.0]);
    }

    #[test]
    fn test_parse_embedding_non_numeric_is_nan() {
        let json = json!({ "data": [{ "embedding": [0.1, "x"] }] });
        let v = parse_embedding_response(&json).unwrap();
        assert!(v[1].is_nan());
    }

    #[test]
    fn test_parse_embedding_missing_array() {
        let json = json!({ "data": [{ "embedding": "nope" }] });
        assert!(matches!(
            parse_embedding_response(&json),
            Err(EmbedError::Malformed(_))
        ));
        assert!(matches!(
            parse_embedding_response(&json!({})),
            Err(EmbedError::Malformed(_))
        ));
    }
}
