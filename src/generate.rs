//! Grounded response generation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use coachbot_core::error::ProviderError;
use coachbot_core::models::Personality;
use coachbot_core::prompt::{system_prompt, FALLBACK_REPLY};

use crate::config::GenerationConfig;
use crate::error::{BotError, Result};
use crate::retrieve::ContextRetriever;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A generative model. `Ok(None)` means the model answered with no content.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<Option<String>, ProviderError>;
}

pub struct Generator {
    retriever: Arc<dyn ContextRetriever>,
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_tokens: u32,
    context_limit: usize,
}

impl Generator {
    pub fn new(
        retriever: Arc<dyn ContextRetriever>,
        model: Arc<dyn ChatModel>,
        config: &GenerationConfig,
        context_limit: usize,
    ) -> Self {
        Self {
            retriever,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_limit,
        }
    }

    /// Answer `question` for `experience_id` in the given voice.
    ///
    /// The question is sent verbatim as the user turn; the retrieved
    /// context goes into the system prompt. An empty completion becomes
    /// [`FALLBACK_REPLY`].
    pub async fn generate(
        &self,
        question: &str,
        experience_id: &str,
        personality: Personality,
        bot_name: &str,
    ) -> Result<String> {
        let context = self
            .retriever
            .retrieve(question, experience_id, self.context_limit)
            .await?;
        debug!(experience_id, context_chunks = context.len(), "generating response");

        let request = CompletionRequest {
            system: system_prompt(personality, bot_name, &context),
            user: question.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match self
            .model
            .complete(&request)
            .await
            .map_err(BotError::Generation)?
        {
            Some(text) => Ok(text),
            None => {
                warn!(experience_id, "model returned no content; using fallback reply");
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }
}
