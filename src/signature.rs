//! Webhook signature verification.
//!
//! Both providers sign with HMAC-SHA256 over the raw request body; handlers
//! must verify before parsing.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a card-processor signature.
pub const STRIPE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature does not match")]
    Mismatch,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("webhook secret not configured")]
    NotConfigured,
}

/// SHA-256 of a payload as hex; the dedupe key for deliveries without an id.
pub fn fingerprint(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

fn mac(secret: &str) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::NotConfigured)
}

fn verify_hex(m: HmacSha256, expected_hex: &str) -> Result<(), SignatureError> {
    let expected = hex::decode(expected_hex.trim()).map_err(|_| SignatureError::Malformed)?;
    // constant-time comparison
    m.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Verifies a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against `"{t}.{body}"`.
pub fn verify_stripe(secret: &str, header: Option<&str>, body: &[u8], now_unix: i64) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = Some(t.parse::<i64>().map_err(|_| SignatureError::Malformed)?),
            Some(("v1", sig)) => candidates.push(sig),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() { return Err(SignatureError::Malformed); }

    let mut result = Err(SignatureError::Mismatch);
    for candidate in candidates {
        let mut m = mac(secret)?;
        m.update(timestamp.to_string().as_bytes());
        m.update(b".");
        m.update(body);
        if verify_hex(m, candidate).is_ok() {
            result = Ok(());
            break;
        }
    }
    result?;
    if (now_unix - timestamp).abs() > STRIPE_TOLERANCE_SECS { return Err(SignatureError::Expired); }
    Ok(())
}

/// Verifies a hex HMAC of the body, as sent in `X-PF-Signature`.
pub fn verify_printful(secret: &str, header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let mut m = mac(secret)?;
    m.update(body);
    verify_hex(m, header)
}

/// Builds a valid card-processor header. Used by tests and local tooling.
pub fn sign_stripe(secret: &str, body: &[u8], timestamp: i64) -> Result<String, SignatureError> {
    let mut m = mac(secret)?;
    m.update(format!("{timestamp}.").as_bytes());
    m.update(body);
    Ok(format!("t={timestamp},v1={}", hex::encode(m.finalize().into_bytes())))
}

pub fn sign_printful(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut m = mac(secret)?;
    m.update(body);
    Ok(hex::encode(m.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_stripe_round_trip() {
        let body = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let header = sign_stripe(SECRET, body, 1_700_000_000).unwrap();
        assert_eq!(verify_stripe(SECRET, Some(header.as_str()), body, 1_700_000_100), Ok(()));
    }

    #[test]
    fn test_stripe_rejects_tampering_and_age() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign_stripe(SECRET, body, 1_700_000_000).unwrap();
        assert_eq!(verify_stripe(SECRET, Some(header.as_str()), br#"{"id":"evt_2"}"#, 1_700_000_000), Err(SignatureError::Mismatch));
        assert_eq!(verify_stripe("other", Some(header.as_str()), body, 1_700_000_000), Err(SignatureError::Mismatch));
        assert_eq!(verify_stripe(SECRET, Some(header.as_str()), body, 1_700_000_000 + 301), Err(SignatureError::Expired));
        assert_eq!(verify_stripe(SECRET, None, body, 0), Err(SignatureError::Missing));
        assert_eq!(verify_stripe(SECRET, Some("v1=abcd"), body, 0), Err(SignatureError::Malformed));
    }

    #[test]
    fn test_printful_signature() {
        let body = br#"{"type":"package_shipped"}"#;
        let sig = sign_printful(SECRET, body).unwrap();
        assert_eq!(verify_printful(SECRET, Some(sig.as_str()), body), Ok(()));
        assert_eq!(verify_printful(SECRET, Some(sig.as_str()), b"{}"), Err(SignatureError::Mismatch));
        assert_eq!(verify_printful(SECRET, Some("zz"), body), Err(SignatureError::Malformed));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(fingerprint(b"").len(), 64);
    }
}
