//! Message intake: turn pushed or polled chat messages into answers.
//!
//! Both intake paths converge on [`Reconciler::answer`], which extracts
//! the question, generates a reply, tries to deliver it and then logs the
//! exchange whether or not delivery worked. A message id that is already
//! in the log is never answered twice, and a message being answered right
//! now is claimed so a concurrent redelivery skips it.
//!
//! Polling is synchronous per request and processes mentions one at a
//! time in the order the platform listed them. A failing message is
//! logged and skipped; it never aborts the batch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use coachbot_core::inbound::InboundMessage;
use coachbot_core::mention::{extract_question, is_mention};
use coachbot_core::models::{now_ts, BotConfig, ChatMessageRecord, PlatformMessage};
use coachbot_core::store::Store;

use crate::error::{BotError, Result};
use crate::generate::Generator;
use crate::platform::ChatPlatform;

/// Why a message was not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotMentioned,
    EmptyQuestion,
    AlreadyProcessed,
    Unconfigured,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Answered { delivered: bool },
    Skipped(SkipReason),
}

/// Summary returned by a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    pub processed: usize,
    pub message: String,
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    generator: Arc<Generator>,
    platform: Arc<dyn ChatPlatform>,
    poll_batch: usize,
    in_flight: Mutex<HashSet<(String, String)>>,
}

/// Releases an in-flight claim when dropped.
struct Claim<'a> {
    set: &'a Mutex<HashSet<(String, String)>>,
    key: (String, String),
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.key);
    }
}

fn lock(set: &Mutex<HashSet<(String, String)>>) -> MutexGuard<'_, HashSet<(String, String)>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<Generator>,
        platform: Arc<dyn ChatPlatform>,
        poll_batch: usize,
    ) -> Self {
        Self {
            store,
            generator,
            platform,
            poll_batch,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, experience_id: &str, message_id: &str) -> Option<Claim<'_>> {
        let key = (experience_id.to_string(), message_id.to_string());
        if !lock(&self.in_flight).insert(key.clone()) {
            return None;
        }
        Some(Claim {
            set: &self.in_flight,
            key,
        })
    }

    /// Pull recent messages from the experience's channel and answer new
    /// mentions.
    pub async fn poll(&self, experience_id: &str) -> Result<PollOutcome> {
        let config = self
            .store
            .get_bot_config(experience_id)
            .await
            .map_err(BotError::persistence)?
            .ok_or_else(|| BotError::NotFound(format!("bot configuration for {}", experience_id)))?;
        let channel_id = config
            .channel_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                BotError::Validation("No channel_id configured for this experience".into())
            })?;

        let messages = self
            .platform
            .list_messages(&channel_id, self.poll_batch)
            .await
            .map_err(BotError::Platform)?;
        if messages.is_empty() {
            return Ok(PollOutcome {
                processed: 0,
                message: "No new messages".to_string(),
            });
        }

        let last = self
            .store
            .last_processed_message_id(experience_id)
            .await
            .map_err(BotError::persistence)?;
        let candidates: Vec<&PlatformMessage> = messages
            .iter()
            .filter(|m| last.as_deref() != Some(m.id.as_str()))
            .filter(|m| is_mention(&m.content, &config.bot_name))
            .collect();
        debug!(
            experience_id,
            listed = messages.len(),
            mentions = candidates.len(),
            "poll candidates"
        );

        let mut processed = 0usize;
        for message in candidates {
            match self.answer_once(&config, message, &channel_id).await {
                Ok(MessageOutcome::Answered { .. }) => processed += 1,
                Ok(MessageOutcome::Skipped(reason)) => {
                    debug!(experience_id, message_id = %message.id, ?reason, "message skipped");
                }
                Err(e) => {
                    warn!(experience_id, message_id = %message.id, error = %e, "failed to answer message");
                }
            }
        }

        info!(experience_id, processed, "poll complete");
        let message = if processed > 0 {
            format!("Processed {} mentions", processed)
        } else {
            "No new mentions".to_string()
        };
        Ok(PollOutcome { processed, message })
    }

    /// Handle a pushed message whose identity is already resolved.
    pub async fn process_inbound(&self, inbound: &InboundMessage) -> Result<MessageOutcome> {
        let config = match self
            .store
            .get_bot_config(&inbound.experience_id)
            .await
            .map_err(BotError::persistence)?
        {
            Some(config) => config,
            None => {
                info!(
                    experience_id = %inbound.experience_id,
                    "no bot configuration; dropping message"
                );
                return Ok(MessageOutcome::Skipped(SkipReason::Unconfigured));
            }
        };

        if !is_mention(&inbound.message.content, &config.bot_name) {
            return Ok(MessageOutcome::Skipped(SkipReason::NotMentioned));
        }

        self.answer_once(&config, &inbound.message, &inbound.channel_id)
            .await
    }

    /// [`answer`](Self::answer) unless the message id is already logged or
    /// being answered.
    async fn answer_once(
        &self,
        config: &BotConfig,
        message: &PlatformMessage,
        channel_id: &str,
    ) -> Result<MessageOutcome> {
        let Some(_claim) = self.claim(&config.experience_id, &message.id) else {
            return Ok(MessageOutcome::Skipped(SkipReason::AlreadyProcessed));
        };
        let seen = self
            .store
            .is_message_processed(&config.experience_id, &message.id)
            .await
            .map_err(BotError::persistence)?;
        if seen {
            return Ok(MessageOutcome::Skipped(SkipReason::AlreadyProcessed));
        }
        self.answer(config, message, channel_id).await
    }

    /// Generate, deliver and log a reply to a message that mentions the bot.
    pub async fn answer(
        &self,
        config: &BotConfig,
        message: &PlatformMessage,
        channel_id: &str,
    ) -> Result<MessageOutcome> {
        let question = extract_question(&message.content, &config.bot_name);
        if question.is_empty() {
            return Ok(MessageOutcome::Skipped(SkipReason::EmptyQuestion));
        }

        let response = self
            .generator
            .generate(
                &question,
                &config.experience_id,
                config.personality,
                &config.bot_name,
            )
            .await?;

        let delivered = match self.platform.send_message(channel_id, &response).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    experience_id = %config.experience_id,
                    message_id = %message.id,
                    error = %e,
                    "failed to deliver reply; logging it anyway"
                );
                false
            }
        };

        self.store
            .insert_chat_message(&ChatMessageRecord {
                experience_id: config.experience_id.clone(),
                channel_id: channel_id.to_string(),
                message_id: message.id.clone(),
                user_id: message.user_id.clone(),
                content: question,
                response,
                created_at: now_ts(),
            })
            .await
            .map_err(BotError::persistence)?;

        info!(
            experience_id = %config.experience_id,
            message_id = %message.id,
            delivered,
            "answered mention"
        );
        Ok(MessageOutcome::Answered { delivered })
    }
}
