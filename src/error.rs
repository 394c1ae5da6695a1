//! Error taxonomy for the CoachBot pipeline and its HTTP mapping.
//!
//! Pipeline modules return [`BotError`] and never build responses
//! themselves. The server turns an error into the JSON error body:
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "OpenAI rate limit exceeded, try again later" } }
//! ```
//!
//! An optional `hint` is added for configuration problems. Hints name the
//! environment variable to set and never include its value.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use coachbot_core::error::{EmbedError, ProviderError};

/// Everything that can go wrong while answering, training or configuring.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("forbidden: {0}")]
    Authorization(String),

    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Configuration {
        message: String,
        hint: Option<String>,
    },

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("generation failed: {0}")]
    Generation(#[source] ProviderError),

    #[error("platform request failed: {0}")]
    Platform(#[source] ProviderError),

    #[error("content cannot be empty")]
    EmptyContent,

    #[error("content produced no chunks")]
    NoChunks,

    /// `index` is zero-based; the message counts from one.
    #[error("failed to process chunk {}/{total}: {source}", .index + 1)]
    ChunkFailed {
        index: usize,
        total: usize,
        #[source]
        source: Box<BotError>,
    },

    #[error("storage error: {0:#}")]
    Persistence(anyhow::Error),

    #[error("{0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// A required environment variable is missing.
    pub fn missing_env(var: &str) -> Self {
        BotError::Configuration {
            message: format!("{} is not configured", var),
            hint: Some(format!("Set the {} environment variable", var)),
        }
    }

    /// Wrap a storage failure. Not a `From` impl so that `?` on an
    /// `anyhow::Result` is always a deliberate choice.
    pub fn persistence(err: anyhow::Error) -> Self {
        BotError::Persistence(err)
    }

    pub fn status(&self) -> StatusCode {
        self.classify().0
    }

    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            BotError::Authentication(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            BotError::Authorization(_) => (StatusCode::FORBIDDEN, "forbidden"),
            BotError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            BotError::EmptyContent => (StatusCode::BAD_REQUEST, "empty_content"),
            BotError::NoChunks => (StatusCode::BAD_REQUEST, "no_chunks"),
            BotError::Configuration { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
            BotError::Embedding(e) => match e {
                EmbedError::EmptyInput => (StatusCode::BAD_REQUEST, "empty_input"),
                EmbedError::Configuration { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "configuration")
                }
                EmbedError::Provider(p) => classify_provider(p),
                EmbedError::Malformed(_) => (StatusCode::BAD_GATEWAY, "malformed_embedding"),
            },
            BotError::Generation(p) | BotError::Platform(p) => classify_provider(p),
            BotError::ChunkFailed { source, .. } => source.classify(),
            BotError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            BotError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            BotError::Configuration { hint, .. } => hint.clone(),
            BotError::Embedding(EmbedError::Configuration { var }) => {
                Some(format!("Set the {} environment variable", var))
            }
            BotError::Embedding(EmbedError::Provider(p))
            | BotError::Generation(p)
            | BotError::Platform(p) => provider_hint(p),
            BotError::ChunkFailed { source, .. } => source.hint(),
            _ => None,
        }
    }
}

fn classify_provider(err: &ProviderError) -> (StatusCode, &'static str) {
    match err {
        ProviderError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        ProviderError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        ProviderError::NotConfigured { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
        ProviderError::InvalidCredential { .. } => (StatusCode::BAD_GATEWAY, "invalid_credential"),
        ProviderError::Other { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
    }
}

fn provider_hint(err: &ProviderError) -> Option<String> {
    match err {
        ProviderError::NotConfigured { var, .. } => {
            Some(format!("Set the {} environment variable", var))
        }
        ProviderError::InvalidCredential { service } => {
            Some(format!("Check the {} API key configured for this deployment", service))
        }
        _ => None,
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl IntoResponse for BotError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            tracing::error!(code, "request failed: {}", self);
        } else {
            tracing::debug!(code, "request rejected: {}", self);
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.to_string(),
                hint: self.hint(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(BotError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(BotError::Authentication("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(BotError::Authorization("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(BotError::NotFound("bot config".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            BotError::Generation(ProviderError::RateLimited { service: "OpenAI" }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            BotError::Platform(ProviderError::ServiceUnavailable {
                service: "Whop",
                status: 502
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            BotError::persistence(anyhow::anyhow!("disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_chunk_failure_message_and_status() {
        let err = BotError::ChunkFailed {
            index: 2,
            total: 3,
            source: Box::new(BotError::Embedding(EmbedError::Provider(
                ProviderError::RateLimited { service: "OpenAI" },
            ))),
        };
        assert!(err.to_string().starts_with("failed to process chunk 3/3"));
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_hint_names_variable() {
        let err = BotError::missing_env("WHOP_WEBHOOK_SECRET");
        assert_eq!(
            err.hint().as_deref(),
            Some("Set the WHOP_WEBHOOK_SECRET environment variable")
        );
        let err = BotError::Embedding(EmbedError::Configuration {
            var: "OPENAI_API_KEY",
        });
        assert!(err.hint().unwrap().contains("OPENAI_API_KEY"));
    }
}
