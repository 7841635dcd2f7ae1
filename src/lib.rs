//! # Wikigate (wiki authentication & request defense)
//!
//! `wikigate` is the authentication core behind a content wiki: credential
//! storage with versioned password hashing, sessions backed by a TTL-capable
//! key-value store, encrypted anti-forgery tokens, fixed-window rate
//! limiting with account lockout, and a role-based permission evaluator.
//!
//! ## Storage model
//!
//! All cross-request state lives in an external distributed key-value store
//! reached over the network ([`kv::KvStore`]). There are no cross-key
//! transactions: multi-key writes (user record plus its email/username index
//! entries) are sequential and the duplicate-registration race is an accepted,
//! documented risk. Two logical namespaces are used, one for user-adjacent
//! data and one for sessions.
//!
//! ## Request defense
//!
//! Authentication requests are screened in a fixed order: CSRF token, account
//! lockout, rate limits, and only then password verification, so no hashing
//! work is spent on requests that will be rejected anyway. CSRF and rate-limit
//! checks always fail closed; a store timeout is a denial, never an allow.
//!
//! ## Roles
//!
//! Roles form a total order (`admin > editor > contributor > viewer`) with an
//! explicit numeric access level, evaluated by a pure function that receives
//! the resolved session user explicitly rather than reading ambient state.

pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod kv;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
