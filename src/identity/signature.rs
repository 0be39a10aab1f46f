//! Webhook signature verification.
//!
//! Events are signed by the identity provider with HMAC-SHA256 over
//! `{id}.{timestamp}.{body}`. The shared secret arrives as a `whsec_`
//! prefixed base64 string; the signature header carries one or more
//! space-separated `v1,<base64>` entries, any one of which may match.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed skew between the signed timestamp and now, in seconds.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Why a webhook signature was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The configured secret is not a valid `whsec_` base64 string.
    #[error("Webhook secret is malformed")]
    MalformedSecret,
    /// The timestamp header is not an integer.
    #[error("Webhook timestamp is malformed")]
    MalformedTimestamp,
    /// The timestamp is outside the accepted window.
    #[error("Webhook timestamp is outside the tolerance window")]
    StaleTimestamp,
    /// No signature entry matched the computed one.
    #[error("Webhook signature does not match")]
    Mismatch,
}

/// Verify a webhook signature against the raw request body.
///
/// `now_unix` is passed in so callers and tests control the clock.
pub fn verify_signature(
    secret: &str,
    message_id: &str,
    timestamp: &str,
    signature_header: &str,
    body: &str,
    now_unix: i64,
) -> Result<(), SignatureError> {
    let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
    let key = BASE64
        .decode(encoded)
        .map_err(|_| SignatureError::MalformedSecret)?;

    let signed_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::MalformedTimestamp)?;
    if (now_unix - signed_at).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let content = format!("{message_id}.{timestamp}.{body}");
    for entry in signature_header.split_whitespace() {
        let Some(candidate) = entry.strip_prefix("v1,") else {
            continue;
        };
        let Ok(decoded) = BASE64.decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|_| SignatureError::MalformedSecret)?;
        mac.update(content.as_bytes());
        if mac.verify_slice(&decoded).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const BODY: &str = "{\"type\":\"user.created\",\"data\":{\"id\":\"u1\"}}";
    const NOW: i64 = 1_740_000_000;

    fn sign(secret: &str, id: &str, timestamp: i64, body: &str) -> String {
        let key = BASE64
            .decode(secret.strip_prefix("whsec_").unwrap_or(secret))
            .expect("secret");
        let mut mac = HmacSha256::new_from_slice(&key).expect("mac");
        mac.update(format!("{id}.{timestamp}.{body}").as_bytes());
        format!("v1,{}", BASE64.encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_a_valid_signature() {
        let header = sign(SECRET, "msg_1", NOW, BODY);
        let result =
            verify_signature(SECRET, "msg_1", &NOW.to_string(), &header, BODY, NOW);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn accepts_when_any_listed_entry_matches() {
        let good = sign(SECRET, "msg_1", NOW, BODY);
        let header = format!("v1,Zm9yZ2VkIHNpZ25hdHVyZQ== {good}");
        let result =
            verify_signature(SECRET, "msg_1", &NOW.to_string(), &header, BODY, NOW);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let header = sign(SECRET, "msg_1", NOW, BODY);
        let tampered = "{\"type\":\"user.deleted\",\"data\":{\"id\":\"u1\"}}";
        let result =
            verify_signature(SECRET, "msg_1", &NOW.to_string(), &header, tampered, NOW);
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let signed_at = NOW - TIMESTAMP_TOLERANCE_SECS - 1;
        let header = sign(SECRET, "msg_1", signed_at, BODY);
        let result =
            verify_signature(SECRET, "msg_1", &signed_at.to_string(), &header, BODY, NOW);
        assert_eq!(result, Err(SignatureError::StaleTimestamp));
    }

    #[test]
    fn rejects_garbage_headers() {
        assert_eq!(
            verify_signature(SECRET, "msg_1", "not-a-number", "v1,abc", BODY, NOW),
            Err(SignatureError::MalformedTimestamp)
        );
        assert_eq!(
            verify_signature(SECRET, "msg_1", &NOW.to_string(), "v0,whatever", BODY, NOW),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature("whsec_!!!", "msg_1", &NOW.to_string(), "v1,abc", BODY, NOW),
            Err(SignatureError::MalformedSecret)
        );
    }
}
