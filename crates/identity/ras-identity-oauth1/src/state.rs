//! Protection of the request token while it round-trips through the browser.

use crate::config::OAuth1Options;
use crate::error::{OAuth1Error, OAuth1Result};
use crate::types::RequestToken;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

const MIN_SECRET_LEN: usize = 16;

/// Reversible, tamper-evident encoding of a [`RequestToken`].
pub trait StateDataFormat: Send + Sync {
    fn protect(&self, token: &RequestToken) -> OAuth1Result<String>;

    /// Must fail rather than return a partially decoded token.
    fn unprotect(&self, protected: &str) -> OAuth1Result<RequestToken>;
}

#[derive(Serialize, Deserialize)]
struct StateEnvelope {
    issued_at: i64,
    request_token: RequestToken,
}

/// AES-256-GCM sealed state bound to one flow name and format version.
pub struct SealedStateFormat {
    cipher: Aes256Gcm,
    purpose: String,
    ttl: Duration,
}

impl SealedStateFormat {
    pub fn new(secret: &[u8], purpose: impl Into<String>, ttl_seconds: u64) -> OAuth1Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(OAuth1Error::ConfigError(format!(
                "State protection secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .filter(|seconds| *seconds > 0)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                OAuth1Error::ConfigError(format!("Invalid state TTL of {} seconds", ttl_seconds))
            })?;

        let key = Sha256::digest(secret);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| OAuth1Error::ConfigError(format!("Failed to create cipher: {e}")))?;

        Ok(Self {
            cipher,
            purpose: purpose.into(),
            ttl,
        })
    }

    /// Format bound to the options' authentication type and state lifetime.
    pub fn for_options(secret: &[u8], options: &OAuth1Options) -> OAuth1Result<Self> {
        Self::new(
            secret,
            format!("ras-identity-oauth1:{}:v1", options.authentication_type),
            options.state_ttl_seconds,
        )
    }

    pub(crate) fn protect_at(
        &self,
        token: &RequestToken,
        now: DateTime<Utc>,
    ) -> OAuth1Result<String> {
        let envelope = StateEnvelope {
            issued_at: now.timestamp(),
            request_token: token.clone(),
        };
        let plaintext = serde_json::to_vec(&envelope)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: self.purpose.as_bytes(),
                },
            )
            .map_err(|e| OAuth1Error::InvalidState(format!("Encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    pub(crate) fn unprotect_at(
        &self,
        protected: &str,
        now: DateTime<Utc>,
    ) -> OAuth1Result<RequestToken> {
        let sealed = URL_SAFE_NO_PAD
            .decode(protected.trim())
            .map_err(|_| OAuth1Error::InvalidState("not base64url".to_string()))?;

        if sealed.len() <= NONCE_SIZE {
            return Err(OAuth1Error::InvalidState("value too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: self.purpose.as_bytes(),
                },
            )
            .map_err(|_| OAuth1Error::InvalidState("authentication failed".to_string()))?;

        let envelope: StateEnvelope = serde_json::from_slice(&plaintext)
            .map_err(|_| OAuth1Error::InvalidState("malformed payload".to_string()))?;

        let issued_at = DateTime::<Utc>::from_timestamp(envelope.issued_at, 0)
            .ok_or_else(|| OAuth1Error::InvalidState("invalid issue time".to_string()))?;
        let expired = issued_at
            .checked_add_signed(self.ttl)
            .is_some_and(|expires_at| now > expires_at);
        if expired {
            return Err(OAuth1Error::InvalidState("expired".to_string()));
        }

        Ok(envelope.request_token)
    }
}

impl StateDataFormat for SealedStateFormat {
    fn protect(&self, token: &RequestToken) -> OAuth1Result<String> {
        self.protect_at(token, Utc::now())
    }

    fn unprotect(&self, protected: &str) -> OAuth1Result<RequestToken> {
        self.unprotect_at(protected, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ras_identity_core::AuthenticationProperties;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn request_token() -> RequestToken {
        RequestToken {
            token: "abc".to_string(),
            token_secret: "xyz".to_string(),
            callback_confirmed: true,
            properties: AuthenticationProperties::new()
                .with_redirect_uri("https://app.example.com/orders?page=2")
                .with_item("xsrf", "k9"),
        }
    }

    fn format() -> SealedStateFormat {
        SealedStateFormat::new(SECRET, "ras-identity-oauth1:TradeMe:v1", 600).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let format = format();
        let protected = format.protect(&request_token()).unwrap();

        assert!(!protected.contains("xyz"));
        assert_eq!(format.unprotect(&protected).unwrap(), request_token());
    }

    #[test]
    fn test_same_token_seals_differently() {
        let format = format();
        let a = format.protect(&request_token()).unwrap();
        let b = format.protect(&request_token()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_modified_value_rejected() {
        let format = format();
        let protected = format.protect(&request_token()).unwrap();

        let mut chars: Vec<char> = protected.chars().collect();
        let mid = chars.len() / 2;
        chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert!(matches!(
            format.unprotect(&tampered),
            Err(OAuth1Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        let format = format();
        for value in ["", "%%%", "AAAA", "not-a-state-value"] {
            assert!(matches!(
                format.unprotect(value),
                Err(OAuth1Error::InvalidState(_))
            ));
        }
    }

    #[test]
    fn test_other_purpose_rejected() {
        let protected = format().protect(&request_token()).unwrap();
        let other = SealedStateFormat::new(SECRET, "ras-identity-oauth1:TradeMe:v2", 600).unwrap();
        assert!(other.unprotect(&protected).is_err());
    }

    #[test]
    fn test_other_secret_rejected() {
        let protected = format().protect(&request_token()).unwrap();
        let other = SealedStateFormat::new(
            b"another-secret-of-enough-length",
            "ras-identity-oauth1:TradeMe:v1",
            600,
        )
        .unwrap();
        assert!(other.unprotect(&protected).is_err());
    }

    #[test]
    fn test_expired_state_rejected() {
        let format = format();
        let issued = Utc::now() - Duration::minutes(30);
        let protected = format.protect_at(&request_token(), issued).unwrap();

        assert!(matches!(
            format.unprotect(&protected),
            Err(OAuth1Error::InvalidState(msg)) if msg == "expired"
        ));
        assert!(format
            .unprotect_at(&protected, issued + Duration::minutes(5))
            .is_ok());
    }

    #[test]
    fn test_unusable_ttl_is_config_error() {
        for ttl in [0, u64::MAX / 2, u64::MAX] {
            assert!(matches!(
                SealedStateFormat::new(SECRET, "ras-identity-oauth1:TradeMe:v1", ttl),
                Err(OAuth1Error::ConfigError(_))
            ));
        }

        let options = OAuth1Options::new("key", "secret").with_state_ttl(u64::MAX / 2);
        assert!(matches!(
            SealedStateFormat::for_options(SECRET, &options),
            Err(OAuth1Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(
            SealedStateFormat::new(b"short", "p", 600),
            Err(OAuth1Error::ConfigError(_))
        ));
    }
}
