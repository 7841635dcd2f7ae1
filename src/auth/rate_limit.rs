//! Sliding-window rate limiting and account lockout.
//!
//! Counters live in the key-value store as `{count, window_started_at}` and
//! are read-modify-write without optimistic concurrency: near-simultaneous
//! requests can both read the pre-increment count and both be admitted. That
//! under-counting is deliberate, abuse mitigation prefers availability over
//! strict accuracy, and adding synchronization would let an attacker starve
//! legitimate users sharing an IP.
//!
//! A counter whose window has elapsed is logically reset to zero before any
//! limit decision, whether or not the store has reaped the stale value.
//!
//! Separately from the per-window limits, failed logins feed a per-account
//! counter; at a fixed threshold the account gets a lockout record that
//! unconditionally blocks authentication until it expires.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::kv::{KvError, KvStore, keys};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateAction {
    Login,
    Register,
    PasswordReset,
}

impl RateAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::PasswordReset => "reset",
        }
    }
}

/// Dimensions of one attempt. IP is always present; email only for actions
/// that target an account.
#[derive(Clone, Copy, Debug)]
pub struct RateScope<'a> {
    pub ip: &'a str,
    pub email: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LimitDimension {
    Ip,
    Email,
    Global,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LimitDecision {
    pub allowed: bool,
    pub retry_after_seconds: Option<i64>,
    pub dimension: Option<LimitDimension>,
}

impl LimitDecision {
    const ALLOWED: Self = Self {
        allowed: true,
        retry_after_seconds: None,
        dimension: None,
    };
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LockoutRecord {
    pub locked_until: i64,
    pub reason: String,
    pub attempt_count: u32,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
struct Counter {
    count: u32,
    window_started_at: i64,
}

/// Per-dimension limits. Windows are independent: the IP window is tighter
/// and shorter than the per-email window, and registration additionally has a
/// global daily ceiling regardless of IP.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub login_ip_max: u32,
    pub login_ip_window_seconds: i64,
    pub login_email_max: u32,
    pub login_email_window_seconds: i64,
    pub register_ip_max: u32,
    pub register_ip_window_seconds: i64,
    pub register_daily_max: u32,
    pub reset_ip_max: u32,
    pub reset_ip_window_seconds: i64,
    /// Failed logins per account before lockout. Independent of (and looser
    /// than) the per-window limits.
    pub failed_attempt_threshold: u32,
    pub failed_attempt_ttl_seconds: i64,
    pub lockout_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_ip_max: 5,
            login_ip_window_seconds: 5 * 60,
            login_email_max: 10,
            login_email_window_seconds: 60 * 60,
            register_ip_max: 3,
            register_ip_window_seconds: 60 * 60,
            register_daily_max: 100,
            reset_ip_max: 3,
            reset_ip_window_seconds: 60 * 60,
            failed_attempt_threshold: 5,
            failed_attempt_ttl_seconds: 60 * 60,
            lockout_seconds: 30 * 60,
        }
    }
}

const DAY_SECONDS: i64 = 24 * 60 * 60;

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

struct Dimension {
    key: String,
    max: u32,
    window_seconds: i64,
    dimension: LimitDimension,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn dimensions(&self, action: RateAction, scope: &RateScope<'_>) -> Vec<Dimension> {
        let config = &self.config;
        let mut dims = Vec::with_capacity(2);
        let (ip_max, ip_window) = match action {
            RateAction::Login => (config.login_ip_max, config.login_ip_window_seconds),
            RateAction::Register => (config.register_ip_max, config.register_ip_window_seconds),
            RateAction::PasswordReset => (config.reset_ip_max, config.reset_ip_window_seconds),
        };
        dims.push(Dimension {
            key: keys::rate_ip(action.as_str(), scope.ip),
            max: ip_max,
            window_seconds: ip_window,
            dimension: LimitDimension::Ip,
        });
        if action == RateAction::Login {
            if let Some(email) = scope.email {
                dims.push(Dimension {
                    key: keys::rate_login_email(email),
                    max: config.login_email_max,
                    window_seconds: config.login_email_window_seconds,
                    dimension: LimitDimension::Email,
                });
            }
        }
        if action == RateAction::Register {
            dims.push(Dimension {
                key: keys::rate_register_daily(),
                max: config.register_daily_max,
                window_seconds: DAY_SECONDS,
                dimension: LimitDimension::Global,
            });
        }
        dims
    }

    /// Decide whether another attempt is allowed right now. Does not count
    /// the attempt; call [`RateLimiter::record`] once it is admitted.
    ///
    /// # Errors
    /// Propagates store failures; callers must treat them as a denial.
    pub async fn check_limit(
        &self,
        action: RateAction,
        scope: &RateScope<'_>,
    ) -> Result<LimitDecision, KvError> {
        let now = self.clock.now_unix();
        for dim in self.dimensions(action, scope) {
            let counter = self.read_counter(&dim.key).await?;
            let count = effective_count(counter, now, dim.window_seconds);
            if count >= dim.max {
                let window_end = counter
                    .map(|counter| counter.window_started_at + dim.window_seconds)
                    .unwrap_or(now);
                return Ok(LimitDecision {
                    allowed: false,
                    retry_after_seconds: Some((window_end - now).max(1)),
                    dimension: Some(dim.dimension),
                });
            }
        }
        Ok(LimitDecision::ALLOWED)
    }

    /// Count an admitted attempt on every applicable dimension, and maintain
    /// the per-account failed-login counter: failures accumulate toward
    /// lockout, a success clears the slate.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn record(
        &self,
        action: RateAction,
        scope: &RateScope<'_>,
        success: bool,
    ) -> Result<(), KvError> {
        let now = self.clock.now_unix();
        for dim in self.dimensions(action, scope) {
            self.increment(&dim.key, now, dim.window_seconds).await?;
        }

        if action == RateAction::Login {
            if let Some(email) = scope.email {
                if success {
                    self.store.delete(&keys::failed_attempts(email)).await?;
                } else {
                    self.record_failure(email, now).await?;
                }
            }
        }
        Ok(())
    }

    /// A non-expired lockout record unconditionally blocks authentication for
    /// the account, regardless of counter state. Expired records are deleted
    /// and treated as absent.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn check_lockout(&self, email: &str) -> Result<Option<LockoutRecord>, KvError> {
        let key = keys::lockout(email);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let record: LockoutRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!("Dropping undecodable lockout record for {email}: {err}");
                self.store.delete(&key).await?;
                return Ok(None);
            }
        };
        if record.locked_until <= self.clock.now_unix() {
            self.store.delete(&key).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Remove failed-attempt and lockout state for an account (used after a
    /// completed password reset).
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn clear_account(&self, email: &str) -> Result<(), KvError> {
        self.store.delete(&keys::failed_attempts(email)).await?;
        self.store.delete(&keys::lockout(email)).await?;
        Ok(())
    }

    async fn read_counter(&self, key: &str) -> Result<Option<Counter>, KvError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(counter) => Ok(Some(counter)),
            Err(err) => {
                // A corrupt counter starts a fresh window rather than failing
                // the request.
                warn!("Resetting undecodable rate counter {key}: {err}");
                Ok(None)
            }
        }
    }

    async fn increment(&self, key: &str, now: i64, window_seconds: i64) -> Result<(), KvError> {
        let counter = self.read_counter(key).await?;
        let next = match counter {
            Some(counter) if now - counter.window_started_at < window_seconds => Counter {
                count: counter.count.saturating_add(1),
                window_started_at: counter.window_started_at,
            },
            _ => Counter {
                count: 1,
                window_started_at: now,
            },
        };
        let ttl = (next.window_started_at + window_seconds - now).max(1);
        let raw = serde_json::to_string(&next)
            .map_err(|err| KvError::Decode(err.to_string()))?;
        self.store.put(key, raw, Some(ttl)).await
    }

    async fn record_failure(&self, email: &str, now: i64) -> Result<(), KvError> {
        let key = keys::failed_attempts(email);
        let counter = self.read_counter(&key).await?;
        let failures = counter.map_or(0, |counter| counter.count).saturating_add(1);

        if failures >= self.config.failed_attempt_threshold {
            let record = LockoutRecord {
                locked_until: now + self.config.lockout_seconds,
                reason: "too many failed login attempts".to_string(),
                attempt_count: failures,
            };
            let raw = serde_json::to_string(&record)
                .map_err(|err| KvError::Decode(err.to_string()))?;
            self.store
                .put(
                    &keys::lockout(email),
                    raw,
                    Some(self.config.lockout_seconds),
                )
                .await?;
            self.store.delete(&key).await?;
            error!("Account locked for {email} after {failures} failed attempts");
            return Ok(());
        }

        let next = Counter {
            count: failures,
            window_started_at: counter.map_or(now, |counter| counter.window_started_at),
        };
        let raw =
            serde_json::to_string(&next).map_err(|err| KvError::Decode(err.to_string()))?;
        self.store
            .put(&key, raw, Some(self.config.failed_attempt_ttl_seconds))
            .await
    }
}

fn effective_count(counter: Option<Counter>, now: i64, window_seconds: i64) -> u32 {
    match counter {
        // A counter whose window has elapsed is logically zero even if the
        // stale value is still stored.
        Some(counter) if now - counter.window_started_at < window_seconds => counter.count,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKvStore;
    use anyhow::Result;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(MemoryKvStore::new(clock.clone()));
        (
            RateLimiter::new(store, clock.clone(), RateLimitConfig::default()),
            clock,
        )
    }

    fn login_scope<'a>() -> RateScope<'a> {
        RateScope {
            ip: "203.0.113.7",
            email: Some("alice@example.com"),
        }
    }

    #[tokio::test]
    async fn sixth_login_attempt_from_one_ip_is_denied() -> Result<()> {
        let (limiter, _clock) = limiter();
        let scope = login_scope();
        for _ in 0..5 {
            let decision = limiter.check_limit(RateAction::Login, &scope).await?;
            assert!(decision.allowed);
            limiter.record(RateAction::Login, &scope, false).await?;
        }
        let decision = limiter.check_limit(RateAction::Login, &scope).await?;
        assert!(!decision.allowed);
        assert_eq!(decision.dimension, Some(LimitDimension::Ip));
        assert!(decision.retry_after_seconds.is_some_and(|s| s > 0));
        Ok(())
    }

    #[tokio::test]
    async fn window_elapse_resets_the_counter() -> Result<()> {
        let (limiter, clock) = limiter();
        let scope = RateScope {
            ip: "203.0.113.7",
            email: None,
        };
        for _ in 0..5 {
            limiter.record(RateAction::Login, &scope, false).await?;
        }
        assert!(!limiter.check_limit(RateAction::Login, &scope).await?.allowed);

        clock.advance(5 * 60);
        let decision = limiter.check_limit(RateAction::Login, &scope).await?;
        assert!(decision.allowed);

        // Counter restarts at 1 after the elapsed window.
        limiter.record(RateAction::Login, &scope, false).await?;
        let decision = limiter.check_limit(RateAction::Login, &scope).await?;
        assert!(decision.allowed);
        Ok(())
    }

    #[tokio::test]
    async fn email_dimension_limits_independently_of_ip() -> Result<()> {
        let (limiter, _clock) = limiter();
        // Spread attempts over many IPs so only the email counter accumulates.
        for n in 0..10 {
            let ip = format!("198.51.100.{n}");
            let scope = RateScope {
                ip: &ip,
                email: Some("alice@example.com"),
            };
            assert!(limiter.check_limit(RateAction::Login, &scope).await?.allowed);
            limiter.record(RateAction::Login, &scope, false).await?;
        }
        let scope = RateScope {
            ip: "198.51.100.200",
            email: Some("alice@example.com"),
        };
        let decision = limiter.check_limit(RateAction::Login, &scope).await?;
        assert!(!decision.allowed);
        assert_eq!(decision.dimension, Some(LimitDimension::Email));
        Ok(())
    }

    #[tokio::test]
    async fn registration_has_a_global_daily_ceiling() -> Result<()> {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(MemoryKvStore::new(clock.clone()));
        let config = RateLimitConfig {
            register_daily_max: 2,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(store, clock, config);

        for n in 0..2 {
            let ip = format!("198.51.100.{n}");
            let scope = RateScope {
                ip: &ip,
                email: None,
            };
            assert!(
                limiter
                    .check_limit(RateAction::Register, &scope)
                    .await?
                    .allowed
            );
            limiter.record(RateAction::Register, &scope, true).await?;
        }
        let scope = RateScope {
            ip: "198.51.100.99",
            email: None,
        };
        let decision = limiter.check_limit(RateAction::Register, &scope).await?;
        assert!(!decision.allowed);
        assert_eq!(decision.dimension, Some(LimitDimension::Global));
        Ok(())
    }

    #[tokio::test]
    async fn failed_attempts_escalate_to_lockout() -> Result<()> {
        let (limiter, _clock) = limiter();
        let email = "alice@example.com";
        for n in 0..5 {
            assert!(limiter.check_lockout(email).await?.is_none(), "attempt {n}");
            let ip = format!("198.51.100.{n}");
            let scope = RateScope {
                ip: &ip,
                email: Some(email),
            };
            limiter.record(RateAction::Login, &scope, false).await?;
        }
        let lockout = limiter.check_lockout(email).await?;
        let record = match lockout {
            Some(record) => record,
            None => panic!("expected lockout after threshold failures"),
        };
        assert_eq!(record.attempt_count, 5);
        assert!(record.locked_until > 10_000);
        Ok(())
    }

    #[tokio::test]
    async fn lockout_expires_and_is_deleted() -> Result<()> {
        let (limiter, clock) = limiter();
        let email = "alice@example.com";
        for n in 0..5 {
            let ip = format!("198.51.100.{n}");
            let scope = RateScope {
                ip: &ip,
                email: Some(email),
            };
            limiter.record(RateAction::Login, &scope, false).await?;
        }
        assert!(limiter.check_lockout(email).await?.is_some());

        clock.advance(30 * 60);
        assert!(limiter.check_lockout(email).await?.is_none());
        // Deleted on read, so still absent without further time passing.
        assert!(limiter.check_lockout(email).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn successful_login_clears_failed_attempts() -> Result<()> {
        let (limiter, _clock) = limiter();
        let email = "alice@example.com";
        for n in 0..4 {
            let ip = format!("198.51.100.{n}");
            let scope = RateScope {
                ip: &ip,
                email: Some(email),
            };
            limiter.record(RateAction::Login, &scope, false).await?;
        }
        let scope = RateScope {
            ip: "198.51.100.50",
            email: Some(email),
        };
        limiter.record(RateAction::Login, &scope, true).await?;

        // The slate is clean: four more failures do not lock the account.
        for n in 0..4 {
            let ip = format!("198.51.100.{n}");
            let scope = RateScope {
                ip: &ip,
                email: Some(email),
            };
            limiter.record(RateAction::Login, &scope, false).await?;
        }
        assert!(limiter.check_lockout(email).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_counter_resets_instead_of_failing() -> Result<()> {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(MemoryKvStore::new(clock.clone()));
        store
            .put(
                &keys::rate_ip("login", "203.0.113.7"),
                "not-json".to_string(),
                None,
            )
            .await?;
        let limiter = RateLimiter::new(store, clock, RateLimitConfig::default());
        let scope = RateScope {
            ip: "203.0.113.7",
            email: None,
        };
        assert!(limiter.check_limit(RateAction::Login, &scope).await?.allowed);
        Ok(())
    }
}
