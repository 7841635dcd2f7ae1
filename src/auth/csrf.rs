//! Anti-forgery tokens.
//!
//! A CSRF token is a self-contained encrypted capsule: the client context it
//! was minted for (IP, country hint, user-agent prefix) plus a short absolute
//! expiry, sealed with ChaCha20-Poly1305 under a key derived from the shared
//! secret. Nothing is persisted; validity is proven by successful decryption
//! plus field-by-field equality against the validating request's context.
//!
//! Tokens are minted per form render and consumed within tens of seconds.
//! Validation fails closed on every path: malformed input, decryption
//! failure, expiry, and context mismatch are all independent rejections.

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use pbkdf2::pbkdf2_hmac;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::types::ClientContext;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_DERIVATION_SALT: &[u8] = b"wikigate/csrf/v1";
const KEY_DERIVATION_ITERATIONS: u32 = 100_000;
const USER_AGENT_PREFIX_LEN: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum CsrfRejection {
    #[error("token is malformed")]
    Malformed,
    #[error("token failed decryption")]
    DecryptionFailed,
    #[error("token expired")]
    Expired,
    #[error("token was issued to a different client")]
    ContextMismatch,
}

#[derive(Debug, Deserialize, Serialize)]
struct CsrfPayload {
    ip: String,
    #[serde(default)]
    country: Option<String>,
    user_agent_prefix: String,
    expires_at: i64,
}

pub struct CsrfService {
    key: [u8; KEY_LEN],
    ttl_seconds: i64,
}

impl CsrfService {
    /// Derive the token key from the deployment secret.
    #[must_use]
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(
            secret.as_bytes(),
            KEY_DERIVATION_SALT,
            KEY_DERIVATION_ITERATIONS,
            &mut key,
        );
        Self { key, ttl_seconds }
    }

    /// Mint a token bound to `ctx`, expiring `ttl_seconds` after `now`.
    ///
    /// Emits `base64url(nonce || ciphertext)` as one opaque string.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be sealed.
    pub fn issue(&self, ctx: &ClientContext, now: i64) -> Result<String> {
        let payload = CsrfPayload {
            ip: ctx.ip.clone(),
            country: ctx.country.clone(),
            user_agent_prefix: user_agent_prefix(ctx),
            expires_at: now + self.ttl_seconds,
        };
        let plaintext = serde_json::to_vec(&payload)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|err| anyhow!("failed to seal csrf token: {err}"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Validate a token against the request's actual client context.
    ///
    /// All four checks (well-formedness, decryption, expiry, context match)
    /// are independently necessary; the first to fail rejects the token.
    pub fn validate(
        &self,
        token: &str,
        ctx: &ClientContext,
        now: i64,
    ) -> Result<(), CsrfRejection> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| CsrfRejection::Malformed)?;
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CsrfRejection::Malformed);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CsrfRejection::DecryptionFailed)?;
        let payload: CsrfPayload =
            serde_json::from_slice(&plaintext).map_err(|_| CsrfRejection::Malformed)?;

        if payload.expires_at <= now {
            return Err(CsrfRejection::Expired);
        }
        if payload.ip != ctx.ip
            || payload.country != ctx.country
            || payload.user_agent_prefix != user_agent_prefix(ctx)
        {
            return Err(CsrfRejection::ContextMismatch);
        }
        Ok(())
    }
}

fn user_agent_prefix(ctx: &ClientContext) -> String {
    ctx.user_agent
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(USER_AGENT_PREFIX_LEN)
        .collect()
}
