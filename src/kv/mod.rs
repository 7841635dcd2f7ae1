//! Key-value store abstraction.
//!
//! The wiki keeps every piece of cross-request state in a distributed,
//! eventually-consistent key-value store with native per-key TTL. Each
//! operation is an independent network round-trip and can fail on its own;
//! there is no cross-key transaction support.

use async_trait::async_trait;
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::HttpKvStore;
pub use memory::MemoryKvStore;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv request timed out")]
    Timeout,
    #[error("kv transport error: {0}")]
    Transport(String),
    #[error("kv responded with status {status}")]
    Status { status: u16 },
    #[error("kv value could not be decoded: {0}")]
    Decode(String),
}

/// Get/put/delete against one logical namespace of the store.
///
/// `put` with a TTL relies on the store reaping the key on its own schedule;
/// callers that care about exact expiry must also check timestamps on read,
/// since TTL processing can lag.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn put(&self, key: &str, value: String, ttl_seconds: Option<i64>)
        -> Result<(), KvError>;

    /// Deleting an absent key is a no-op success.
    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// Key patterns shared by every component.
///
/// Emails and usernames must be normalized (lower-cased, trimmed) before they
/// reach a key builder.
pub mod keys {
    use uuid::Uuid;

    #[must_use]
    pub fn user(id: Uuid) -> String {
        format!("user:{id}")
    }

    #[must_use]
    pub fn email_index(email: &str) -> String {
        format!("email:{email}")
    }

    #[must_use]
    pub fn username_index(username: &str) -> String {
        format!("username:{username}")
    }

    #[must_use]
    pub fn confirm_token(token: &str) -> String {
        format!("confirm:{token}")
    }

    #[must_use]
    pub fn reset_token(token: &str) -> String {
        format!("reset:{token}")
    }

    #[must_use]
    pub fn rate_ip(action: &str, ip: &str) -> String {
        format!("rate:{action}:ip:{ip}")
    }

    #[must_use]
    pub fn rate_login_email(email: &str) -> String {
        format!("rate:login:email:{email}")
    }

    #[must_use]
    pub fn rate_register_daily() -> String {
        "rate:register:daily".to_string()
    }

    #[must_use]
    pub fn failed_attempts(email: &str) -> String {
        format!("failed:{email}")
    }

    #[must_use]
    pub fn lockout(email: &str) -> String {
        format!("lockout:{email}")
    }

    #[must_use]
    pub fn session(token: &str) -> String {
        format!("session:{token}")
    }
}

#[cfg(test)]
mod tests {
    use super::keys;
    use uuid::Uuid;

    #[test]
    fn key_patterns_are_namespace_qualified() {
        let id = Uuid::nil();
        assert_eq!(
            keys::user(id),
            "user:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(keys::email_index("a@b.c"), "email:a@b.c");
        assert_eq!(keys::username_index("alice"), "username:alice");
        assert_eq!(keys::confirm_token("t"), "confirm:t");
        assert_eq!(keys::reset_token("t"), "reset:t");
        assert_eq!(keys::rate_ip("login", "1.2.3.4"), "rate:login:ip:1.2.3.4");
        assert_eq!(keys::rate_login_email("a@b.c"), "rate:login:email:a@b.c");
        assert_eq!(keys::rate_register_daily(), "rate:register:daily");
        assert_eq!(keys::failed_attempts("a@b.c"), "failed:a@b.c");
        assert_eq!(keys::lockout("a@b.c"), "lockout:a@b.c");
        assert_eq!(keys::session("tok"), "session:tok");
    }
}
