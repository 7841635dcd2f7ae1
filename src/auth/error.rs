//! Error taxonomy for the auth core.
//!
//! Every cryptographic and store-access failure is translated into one of
//! these variants at the component boundary; callers never see raw low-level
//! errors. "No such user" and "wrong password" deliberately collapse into the
//! same [`UnauthorizedReason::BadCredentials`] outcome.

use serde::Serialize;
use thiserror::Error;

use crate::kv::KvError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnauthorizedReason {
    /// Unknown account or wrong password; the two are indistinguishable.
    BadCredentials,
    /// Credentials were correct but the email is not confirmed yet.
    EmailNotConfirmed,
    /// Session token missing, unknown, expired, or revoked.
    SessionInvalid,
    /// Anti-forgery token missing, expired, or bound to a different client.
    CsrfRejected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConflictField {
    Username,
    /// Duplicate email. Callers must not disclose this to the client; the
    /// registration path responds as if it succeeded.
    Email,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict on {0:?}")]
    Conflict(ConflictField),

    #[error("unauthorized: {0:?}")]
    Unauthorized(UnauthorizedReason),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: i64 },

    #[error("account locked, retry after {retry_after_seconds}s")]
    Locked { retry_after_seconds: i64 },

    #[error("store unavailable")]
    Store(#[from] KvError),
}

impl AuthError {
    /// Whether a caller may retry the same request with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
