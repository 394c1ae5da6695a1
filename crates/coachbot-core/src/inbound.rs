//! Webhook envelope parsing and message identity resolution.
//!
//! The platform wraps events in a handful of envelope shapes depending on
//! the API version that produced them. [`Envelope::from_body`] normalizes
//! them to a `(type, data)` pair and [`resolve_message`] pulls out the
//! fields the reconciler needs.
//!
//! # Identity resolution
//!
//! | Field | Lookup order |
//! |-------|--------------|
//! | experience id | `experience_id`, `experience.id`, `channel.experience_id`, `channel.experience.id`, `channel_id`, `channel.id` |
//! | channel id | `channel_id`, `channel.id`, then the experience id |
//! | content | `content`, `message`, `text` |
//! | user id | `user.id`, `user_id`, then `"unknown"` |

use serde_json::Value;

use crate::error::IntakeError;
use crate::models::PlatformMessage;

/// A webhook event normalized to its type and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event_type: String,
    pub data: Value,
}

impl Envelope {
    /// Normalize a decoded webhook body.
    ///
    /// A body with none of `type`, `event` or `data` is taken to be a bare
    /// message object.
    pub fn from_body(body: Value) -> Self {
        let has_envelope = ["type", "event", "data"]
            .iter()
            .any(|k| body.get(k).is_some());
        if !has_envelope {
            return Envelope {
                event_type: "message".to_string(),
                data: body,
            };
        }

        let event_type = str_at(&body, &["type"])
            .or_else(|| str_at(&body, &["event", "type"]))
            .or_else(|| str_at(&body, &["event"]))
            .unwrap_or("unknown")
            .to_string();

        let data = body
            .get("data")
            .or_else(|| body.get("payload"))
            .or_else(|| body.get("event").and_then(|e| e.get("data")))
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or(body);

        Envelope { event_type, data }
    }

    /// Whether this event carries a chat message.
    pub fn is_message_event(&self) -> bool {
        self.event_type.contains("message")
            || ["content", "message", "text"]
                .iter()
                .any(|k| self.data.get(k).is_some())
    }
}

/// A pushed message with its resolved routing.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message: PlatformMessage,
    pub experience_id: String,
    pub channel_id: String,
}

/// Resolve identity and content from a message payload.
pub fn resolve_message(data: &Value) -> Result<InboundMessage, IntakeError> {
    let experience_id = resolve_experience_id(data).ok_or(IntakeError::MissingExperience)?;
    let channel_id = id_at(data, &["channel_id"])
        .or_else(|| id_at(data, &["channel", "id"]))
        .unwrap_or_else(|| experience_id.clone());

    let id = id_at(data, &["id"]).ok_or(IntakeError::MissingMessageId)?;
    let content = str_at(data, &["content"])
        .or_else(|| str_at(data, &["message"]))
        .or_else(|| str_at(data, &["text"]))
        .ok_or(IntakeError::MissingContent)?
        .to_string();
    let user_id = id_at(data, &["user", "id"])
        .or_else(|| id_at(data, &["user_id"]))
        .unwrap_or_else(|| "unknown".to_string());

    Ok(InboundMessage {
        message: PlatformMessage {
            id,
            content,
            user_id,
        },
        experience_id,
        channel_id,
    })
}

/// Experience id by the documented priority.
pub fn resolve_experience_id(data: &Value) -> Option<String> {
    const PATHS: [&[&str]; 6] = [
        &["experience_id"],
        &["experience", "id"],
        &["channel", "experience_id"],
        &["channel", "experience", "id"],
        &["channel_id"],
        &["channel", "id"],
    ];
    PATHS.iter().find_map(|path| id_at(data, path))
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(value, path).and_then(Value::as_str)
}

/// Identifiers arrive as strings or numbers; blanks count as missing.
fn id_at(value: &Value, path: &[&str]) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
