//! Session lifecycle against the session namespace of the store.
//!
//! State machine: `absent → active → {expired, revoked}`. A session is a
//! high-entropy bearer token whose value is the record's identity; the record
//! itself carries only the owning user, creation time, and expiry.
//!
//! The store-level TTL and the record's own `expires_at` are both enforced:
//! even if the store is late reaping the key, a read past the stated expiry
//! returns nothing and proactively deletes the record.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::kv::{KvError, KvStore, keys};

const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Session {
    pub user_id: Uuid,
    pub created_at: i64,
    pub expires_at: i64,
}

pub struct SessionManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl_seconds: i64,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, ttl_seconds: i64) -> Self {
        Self {
            store,
            clock,
            ttl_seconds,
        }
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Mint a session for `user_id`, returning the raw token and its absolute
    /// expiry. The store-level TTL equals the session lifetime, so the key is
    /// reaped no earlier than the record says it expires.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn create_session(&self, user_id: Uuid) -> Result<(String, i64), KvError> {
        let now = self.clock.now_unix();
        let session = Session {
            user_id,
            created_at: now,
            expires_at: now + self.ttl_seconds,
        };
        let token = generate_session_token();
        let raw =
            serde_json::to_string(&session).map_err(|err| KvError::Decode(err.to_string()))?;
        self.store
            .put(&keys::session(&token), raw, Some(self.ttl_seconds))
            .await?;
        Ok((token, session.expires_at))
    }

    /// Resolve a token to its session, or `None` for anything absent,
    /// expired, or unreadable. Expired-but-unreaped records are deleted here.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>, KvError> {
        let key = keys::session(token);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(err) => {
                warn!("Dropping undecodable session record: {err}");
                self.store.delete(&key).await?;
                return Ok(None);
            }
        };
        if session.expires_at <= self.clock.now_unix() {
            self.store.delete(&key).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Revoke a session. Deleting an unknown token is a no-op success.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn delete_session(&self, token: &str) -> Result<(), KvError> {
        self.store.delete(&keys::session(token)).await
    }
}

/// 256-bit random token, URL-safe base64. The raw value is only ever handed
/// to the client; it is the lookup key, so it never needs to be stored apart
/// from the record it names.
fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
