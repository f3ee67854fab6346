//! Inbound request authenticity: the legacy verification token carried in
//! every payload, and the optional `X-Slack-Signature` HMAC.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests older (or newer) than this are treated as replays.
pub const DEFAULT_TOLERANCE_SECS: i64 = 60 * 5;

pub fn token_matches(expected: &SecretString, presented: &str) -> bool {
    let expected = expected.expose_secret().as_bytes();
    !expected.is_empty() && bool::from(expected.ct_eq(presented.as_bytes()))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix time")]
    InvalidTimestamp(String),
    #[error("request timestamp is outside the {tolerance_secs}s window")]
    Stale { tolerance_secs: i64 },
    #[error("signature does not match")]
    Mismatch,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret, tolerance_secs: DEFAULT_TOLERANCE_SECS }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now_unix: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        let sent_at = timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        if now_unix.abs_diff(sent_at) > self.tolerance_secs.unsigned_abs() {
            return Err(SignatureError::Stale { tolerance_secs: self.tolerance_secs });
        }

        let expected = self.sign(timestamp, body);
        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// `v0=` followed by the hex HMAC-SHA256 of `v0:{timestamp}:{body}`.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(b"v0:");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }
}
