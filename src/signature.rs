//! Webhook signature verification (Standard Webhooks scheme).
//!
//! The platform signs `"{webhook-id}.{webhook-timestamp}.{body}"` with
//! HMAC-SHA256 and sends `webhook-signature: v1,<base64>` (several
//! space-separated entries during secret rotation). The key is the raw
//! secret, or the base64 payload of a `whsec_`-prefixed secret.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ID: &str = "webhook-id";
pub const HEADER_TIMESTAMP: &str = "webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "webhook-signature";

/// Maximum clock skew accepted between the timestamp header and now.
pub const TOLERANCE_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("invalid webhook timestamp")]
    InvalidTimestamp,
    #[error("webhook timestamp outside tolerance")]
    Expired,
    #[error("invalid webhook secret")]
    InvalidSecret,
    #[error("no matching signature")]
    Mismatch,
}

/// The three signing headers, as received.
#[derive(Debug, Clone, Copy)]
pub struct SignedHeaders<'a> {
    pub id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Verify `body` against the signing headers at time `now` (Unix seconds).
pub fn verify(
    secret: &str,
    headers: SignedHeaders<'_>,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let id = headers.id.ok_or(SignatureError::MissingHeader(HEADER_ID))?;
    let timestamp = headers
        .timestamp
        .ok_or(SignatureError::MissingHeader(HEADER_TIMESTAMP))?;
    let signatures = headers
        .signature
        .ok_or(SignatureError::MissingHeader(HEADER_SIGNATURE))?;

    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now.abs_diff(ts) > TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let key = secret_key(secret)?;
    let mac = signing_mac(&key, id, timestamp.trim(), body)?;

    let matched = signatures
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|sig| BASE64.decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produce a `v1,<base64>` signature. Used by tests and local tooling to
/// simulate platform deliveries.
pub fn sign(secret: &str, id: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let key = secret_key(secret)?;
    let mac = signing_mac(&key, id, &timestamp.to_string(), body)?;
    Ok(format!("v1,{}", BASE64.encode(mac.finalize().into_bytes())))
}

fn secret_key(secret: &str) -> Result<Vec<u8>, SignatureError> {
    match secret.strip_prefix("whsec_") {
        Some(encoded) => BASE64
            .decode(encoded)
            .map_err(|_| SignatureError::InvalidSecret),
        None => Ok(secret.as_bytes().to_vec()),
    }
}

fn signing_mac(
    key: &[u8],
    id: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret";
    const NOW: i64 = 1_700_000_000;

    fn headers<'a>(ts: &'a str, sig: &'a str) -> SignedHeaders<'a> {
        SignedHeaders {
            id: Some("msg_123"),
            timestamp: Some(ts),
            signature: Some(sig),
        }
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"type":"message.created"}"#;
        let sig = sign(SECRET, "msg_123", NOW, body).unwrap();
        assert_eq!(verify(SECRET, headers("1700000000", &sig), body, NOW), Ok(()));
    }

    #[test]
    fn test_rotated_signatures() {
        let body = b"{}";
        let good = sign(SECRET, "msg_123", NOW, body).unwrap();
        let multi = format!("v1,AAAA {}", good);
        assert_eq!(verify(SECRET, headers("1700000000", &multi), body, NOW), Ok(()));
    }

    #[test]
    fn test_tampered_body() {
        let sig = sign(SECRET, "msg_123", NOW, b"{}").unwrap();
        assert_eq!(
            verify(SECRET, headers("1700000000", &sig), b"{\"x\":1}", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret() {
        let sig = sign("other", "msg_123", NOW, b"{}").unwrap();
        assert_eq!(
            verify(SECRET, headers("1700000000", &sig), b"{}", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_expired_timestamp() {
        let sig = sign(SECRET, "msg_123", NOW, b"{}").unwrap();
        assert_eq!(
            verify(SECRET, headers("1700000000", &sig), b"{}", NOW + TOLERANCE_SECS + 1),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_expired() {
        for ts in ["-9223372036854775808", "9223372036854775807"] {
            assert_eq!(
                verify(SECRET, headers(ts, "v1,AAAA"), b"{}", NOW),
                Err(SignatureError::Expired)
            );
        }
        assert_eq!(
            verify(SECRET, headers("1700000000", "v1,AAAA"), b"{}", i64::MIN),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_missing_headers() {
        let h = SignedHeaders {
            id: None,
            timestamp: Some("1"),
            signature: Some("v1,x"),
        };
        assert_eq!(
            verify(SECRET, h, b"{}", NOW),
            Err(SignatureError::MissingHeader(HEADER_ID))
        );
    }

    #[test]
    fn test_whsec_prefixed_secret() {
        let secret = format!("whsec_{}", BASE64.encode(b"raw-key-bytes"));
        let sig = sign(&secret, "msg_123", NOW, b"{}").unwrap();
        assert_eq!(verify(&secret, headers("1700000000", &sig), b"{}", NOW), Ok(()));
        // same key bytes given raw
        assert_eq!(verify("raw-key-bytes", headers("1700000000", &sig), b"{}", NOW), Ok(()));
    }
}
