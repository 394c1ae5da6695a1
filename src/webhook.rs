//! Webhook intake: signature check, envelope normalization and identity
//! resolution, ahead of background processing.
//!
//! A delivery whose signature does not verify is still parsed as plain
//! JSON. Some platform tooling (test deliveries, older app versions) sends
//! unsigned payloads, and the reply only ever goes back to the channel the
//! payload names.

use serde_json::Value;
use tracing::{debug, warn};

use coachbot_core::error::IntakeError;
use coachbot_core::inbound::{resolve_message, Envelope, InboundMessage};

use crate::config::WHOP_WEBHOOK_SECRET;
use crate::error::{BotError, Result};
use crate::signature::{verify, SignedHeaders};

/// What a delivery turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Message(InboundMessage),
    /// Not a chat message event.
    Ignored { event_type: String },
    /// A message event we cannot route.
    Unroutable {
        event_type: String,
        reason: IntakeError,
    },
}

/// Parse one delivery. `now` is Unix seconds, for the timestamp check.
pub fn parse_delivery(
    secret: Option<&str>,
    headers: SignedHeaders<'_>,
    body: &[u8],
    now: i64,
) -> Result<WebhookEvent> {
    let secret = secret.ok_or_else(|| BotError::missing_env(WHOP_WEBHOOK_SECRET))?;

    match verify(secret, headers, body, now) {
        Ok(()) => debug!("webhook signature verified"),
        Err(e) => warn!(error = %e, "webhook signature not verified; parsing as plain JSON"),
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| BotError::Validation(format!("invalid webhook payload: {}", e)))?;
    let envelope = Envelope::from_body(value);

    if !envelope.is_message_event() {
        return Ok(WebhookEvent::Ignored {
            event_type: envelope.event_type,
        });
    }

    Ok(match resolve_message(&envelope.data) {
        Ok(message) => WebhookEvent::Message(message),
        Err(reason) => WebhookEvent::Unroutable {
            event_type: envelope.event_type,
            reason,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign;

    const SECRET: &str = "hook-secret";
    const NOW: i64 = 1_700_000_000;

    fn unsigned() -> SignedHeaders<'static> {
        SignedHeaders {
            id: None,
            timestamp: None,
            signature: None,
        }
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        let err = parse_delivery(None, unsigned(), b"{}", NOW).unwrap_err();
        assert!(matches!(err, BotError::Configuration { .. }));
    }

    #[test]
    fn test_signed_message_event() {
        let body = br#"{"type":"message.created","data":{"id":"m1","content":"@CoachBot hi","experience_id":"exp_1","channel_id":"chan_1","user":{"id":"u1"}}}"#;
        let sig = sign(SECRET, "wh_1", NOW, body).unwrap();
        let headers = SignedHeaders {
            id: Some("wh_1"),
            timestamp: Some("1700000000"),
            signature: Some(&sig),
        };
        match parse_delivery(Some(SECRET), headers, body, NOW).unwrap() {
            WebhookEvent::Message(m) => {
                assert_eq!(m.experience_id, "exp_1");
                assert_eq!(m.channel_id, "chan_1");
                assert_eq!(m.message.user_id, "u1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unsigned_falls_back_to_plain_json() {
        let body = br#"{"id":"m2","content":"coachbot?","experience_id":"exp_1"}"#;
        assert!(matches!(
            parse_delivery(Some(SECRET), unsigned(), body, NOW).unwrap(),
            WebhookEvent::Message(_)
        ));
    }

    #[test]
    fn test_out_of_range_timestamp_falls_back_to_plain_json() {
        let body = br#"{"id":"m3","content":"coachbot?","experience_id":"exp_1"}"#;
        let headers = SignedHeaders {
            id: Some("wh_3"),
            timestamp: Some("-9223372036854775808"),
            signature: Some("v1,AAAA"),
        };
        assert!(matches!(
            parse_delivery(Some(SECRET), headers, body, NOW).unwrap(),
            WebhookEvent::Message(_)
        ));
    }

    #[test]
    fn test_non_message_event_ignored() {
        let body = br#"{"type":"membership.went_valid","data":{"user_id":"u1"}}"#;
        assert_eq!(
            parse_delivery(Some(SECRET), unsigned(), body, NOW).unwrap(),
            WebhookEvent::Ignored {
                event_type: "membership.went_valid".into()
            }
        );
    }

    #[test]
    fn test_unroutable_message() {
        let body = br#"{"type":"message.created","data":{"id":"m1","content":"hi"}}"#;
        assert!(matches!(
            parse_delivery(Some(SECRET), unsigned(), body, NOW).unwrap(),
            WebhookEvent::Unroutable {
                reason: IntakeError::MissingExperience,
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_body_is_validation_error() {
        let err = parse_delivery(Some(SECRET), unsigned(), b"not json", NOW).unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
    }
}
