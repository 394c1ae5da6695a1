//! Error types for external providers and the embedding step.
//!
//! Provider failures are classified from the HTTP status once, in the
//! client, so that the rest of the pipeline can match on meaning instead
//! of status codes.

use thiserror::Error;

/// Failure reported by (or while reaching) an external service.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{service} rejected the configured credential")]
    InvalidCredential { service: &'static str },

    #[error("{service} rate limit exceeded, try again later")]
    RateLimited { service: &'static str },

    #[error("{service} is temporarily unavailable (status {status})")]
    ServiceUnavailable { service: &'static str, status: u16 },

    #[error("{service} is not configured: {var} is not set")]
    NotConfigured {
        service: &'static str,
        var: &'static str,
    },

    #[error("{service} request failed: {message}")]
    Other {
        service: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// Classify a non-success HTTP status.
    ///
    /// | Status | Variant |
    /// |--------|---------|
    /// | 401 | [`InvalidCredential`](ProviderError::InvalidCredential) |
    /// | 429 | [`RateLimited`](ProviderError::RateLimited) |
    /// | 5xx | [`ServiceUnavailable`](ProviderError::ServiceUnavailable) |
    /// | other | [`Other`](ProviderError::Other) with the response body |
    pub fn from_status(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        match status {
            401 => ProviderError::InvalidCredential { service },
            429 => ProviderError::RateLimited { service },
            500..=599 => ProviderError::ServiceUnavailable { service, status },
            _ => ProviderError::Other {
                service,
                message: format!("status {}: {}", status, body.into()),
            },
        }
    }

    pub fn other(service: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Other {
            service,
            message: message.into(),
        }
    }
}

/// Failure to turn a piece of text into a usable vector.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding service is not configured: {var} is not set")]
    Configuration { var: &'static str },

    #[error(transparent)]
    Provider(ProviderError),

    #[error("malformed embedding: {0}")]
    Malformed(String),
}

impl From<ProviderError> for EmbedError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured { var, .. } => EmbedError::Configuration { var },
            other => EmbedError::Provider(other),
        }
    }
}

/// Reasons an inbound webhook payload cannot be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("no experience id in payload")]
    MissingExperience,

    #[error("no message id in payload")]
    MissingMessageId,

    #[error("no message content in payload")]
    MissingContent,
}
