//! Orchestration of the authentication flows.
//!
//! [`AuthService`] owns one component of each kind and enforces the screening
//! order on every authentication attempt: anti-forgery token, account
//! lockout, rate limits, and only then credential verification; no password
//! hashing happens for a request that is going to be rejected anyway.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::kv::KvStore;

use super::csrf::CsrfService;
use super::error::{AuthError, UnauthorizedReason};
use super::permissions::{self, Operation, Visibility};
use super::rate_limit::{RateAction, RateLimiter, RateScope};
use super::session::{Session, SessionManager};
use super::state::AuthConfig;
use super::types::{ClientContext, User};
use super::users::CredentialStore;

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
    pub expires_at: i64,
}

pub struct AuthService {
    credentials: CredentialStore,
    sessions: SessionManager,
    csrf: CsrfService,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl AuthService {
    /// Wire the components over the two store namespaces: `auth_store` for
    /// user-adjacent data, `session_store` for sessions.
    #[must_use]
    pub fn new(
        auth_store: Arc<dyn KvStore>,
        session_store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        csrf_secret: &SecretString,
        config: AuthConfig,
    ) -> Self {
        Self {
            credentials: CredentialStore::new(
                auth_store.clone(),
                clock.clone(),
                config.confirm_ttl_seconds(),
                config.reset_ttl_seconds(),
            ),
            sessions: SessionManager::new(
                session_store,
                clock.clone(),
                config.session_ttl_seconds(),
            ),
            csrf: CsrfService::new(csrf_secret.expose_secret(), config.csrf_ttl_seconds()),
            limiter: RateLimiter::new(auth_store, clock.clone(), config.rate_limits()),
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Mint a CSRF token for the caller's context (one per form render).
    ///
    /// # Errors
    /// Returns an error if the token cannot be sealed.
    pub fn issue_csrf(&self, ctx: &ClientContext) -> anyhow::Result<String> {
        self.csrf.issue(ctx, self.clock.now_unix())
    }

    fn require_csrf(&self, token: &str, ctx: &ClientContext) -> Result<(), AuthError> {
        if let Err(rejection) = self.csrf.validate(token, ctx, self.clock.now_unix()) {
            // Reject with a generic reason; the specifics only go to the log.
            warn!("CSRF token rejected: {rejection}");
            return Err(AuthError::Unauthorized(UnauthorizedReason::CsrfRejected));
        }
        Ok(())
    }

    /// Register a new account.
    ///
    /// Returns the unconfirmed user and the confirmation token for the
    /// out-of-scope mailer. A duplicate email surfaces as
    /// `Conflict(ConflictField::Email)`; the HTTP layer must respond to that
    /// as if registration succeeded (email existence is never disclosed).
    ///
    /// # Errors
    /// Per the error taxonomy; CSRF and rate-limit failures precede any
    /// credential work.
    pub async fn register(
        &self,
        csrf_token: &str,
        ctx: &ClientContext,
        username: &str,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(User, String), AuthError> {
        self.require_csrf(csrf_token, ctx)?;

        let scope = RateScope {
            ip: &ctx.ip,
            email: None,
        };
        let decision = self.limiter.check_limit(RateAction::Register, &scope).await?;
        if !decision.allowed {
            return Err(AuthError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds.unwrap_or(1),
            });
        }
        self.limiter.record(RateAction::Register, &scope, true).await?;

        let (user, confirmation_token) = self
            .credentials
            .create_user(username, name, email, password)
            .await?;
        info!("Registered user {} ({})", user.username, user.id);
        Ok((user, confirmation_token))
    }

    /// Authenticate and mint a session.
    ///
    /// Screening order: CSRF, lockout, rate limits, credentials. A locked
    /// account is rejected even with correct credentials; an unconfirmed
    /// account is only told so after its password verified.
    ///
    /// # Errors
    /// Per the error taxonomy.
    pub async fn login(
        &self,
        csrf_token: &str,
        ctx: &ClientContext,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, AuthError> {
        self.require_csrf(csrf_token, ctx)?;

        let email = super::users::normalize_email(email);
        if let Some(lockout) = self.limiter.check_lockout(&email).await? {
            return Err(AuthError::Locked {
                retry_after_seconds: (lockout.locked_until - self.clock.now_unix()).max(1),
            });
        }

        let scope = RateScope {
            ip: &ctx.ip,
            email: Some(&email),
        };
        let decision = self.limiter.check_limit(RateAction::Login, &scope).await?;
        if !decision.allowed {
            return Err(AuthError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds.unwrap_or(1),
            });
        }

        let Some(user) = self.credentials.validate_credentials(&email, password).await? else {
            self.limiter.record(RateAction::Login, &scope, false).await?;
            return Err(AuthError::Unauthorized(UnauthorizedReason::BadCredentials));
        };

        if !user.email_confirmed {
            // Password was correct, so disclosing the pending confirmation
            // leaks nothing. The attempt still spends a window slot; only the
            // lockout counter is left alone.
            self.limiter.record(RateAction::Login, &scope, true).await?;
            return Err(AuthError::Unauthorized(
                UnauthorizedReason::EmailNotConfirmed,
            ));
        }

        self.limiter.record(RateAction::Login, &scope, true).await?;
        let (token, expires_at) = self.sessions.create_session(user.id).await?;
        info!("User {} logged in", user.id);
        Ok(LoginOutcome {
            user,
            token,
            expires_at,
        })
    }

    /// Redeem an email-confirmation token.
    ///
    /// # Errors
    /// `InvalidInput` for an unknown, consumed, or expired token.
    pub async fn confirm_email(&self, token: &str) -> Result<User, AuthError> {
        match self.credentials.confirm_email(token).await? {
            Some(user) => {
                info!("Email confirmed for user {}", user.id);
                Ok(user)
            }
            None => Err(AuthError::InvalidInput(
                "invalid or expired confirmation token".to_string(),
            )),
        }
    }

    /// Resolve a session token to the session and its user.
    ///
    /// # Errors
    /// `Store` for store failures.
    pub async fn current_user(&self, token: &str) -> Result<Option<(Session, User)>, AuthError> {
        let Some(session) = self.sessions.get_session(token).await? else {
            return Ok(None);
        };
        let Some(user) = self.credentials.find_by_id(session.user_id).await? else {
            // Account deleted since the session was minted.
            self.sessions.delete_session(token).await?;
            return Ok(None);
        };
        Ok(Some((session, user)))
    }

    /// Revoke a session; unknown tokens are a no-op success.
    ///
    /// # Errors
    /// `Store` for store failures.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.delete_session(token).await?;
        Ok(())
    }

    /// Begin a password reset. Returns the token for the out-of-scope mailer,
    /// or `None` when the email is unknown; callers respond identically
    /// either way.
    ///
    /// # Errors
    /// Per the error taxonomy.
    pub async fn request_password_reset(
        &self,
        csrf_token: &str,
        ctx: &ClientContext,
        email: &str,
    ) -> Result<Option<String>, AuthError> {
        self.require_csrf(csrf_token, ctx)?;

        let scope = RateScope {
            ip: &ctx.ip,
            email: None,
        };
        let decision = self
            .limiter
            .check_limit(RateAction::PasswordReset, &scope)
            .await?;
        if !decision.allowed {
            return Err(AuthError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds.unwrap_or(1),
            });
        }
        self.limiter
            .record(RateAction::PasswordReset, &scope, true)
            .await?;

        self.credentials.create_reset_token(email).await
    }

    /// Complete a password reset: set the new password and clear any
    /// failed-attempt or lockout state for the account.
    ///
    /// # Errors
    /// `InvalidInput` for a weak password or an unknown/expired token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let Some(user) = self
            .credentials
            .consume_reset_token(token, new_password)
            .await?
        else {
            return Err(AuthError::InvalidInput(
                "invalid or expired reset token".to_string(),
            ));
        };
        self.limiter.clear_account(&user.email).await?;
        info!("Password reset completed for user {}", user.id);
        Ok(())
    }

    /// Delete an account. Allowed for the account owner and for admins
    /// (a user-administration operation); removes the primary record, the
    /// index entries, and for self-deletion the current session.
    ///
    /// # Errors
    /// `Unauthorized` without a valid session, `Forbidden` without the
    /// required privilege.
    pub async fn delete_account(
        &self,
        session_token: &str,
        target_user_id: Uuid,
    ) -> Result<(), AuthError> {
        let Some((_, actor)) = self.current_user(session_token).await? else {
            return Err(AuthError::Unauthorized(UnauthorizedReason::SessionInvalid));
        };

        let self_delete = actor.id == target_user_id;
        if !self_delete {
            let decision = permissions::evaluate(
                Operation::ManageUsers,
                Some(&actor),
                Some(target_user_id),
                Visibility::Private,
            );
            if !decision.granted {
                return Err(AuthError::Forbidden("user administration requires admin"));
            }
        }

        self.credentials.delete_user(target_user_id).await?;
        if self_delete {
            self.sessions.delete_session(session_token).await?;
        }
        info!("Deleted account {target_user_id}");
        Ok(())
    }
}
