//! Credential storage: user records, uniqueness indexes, confirmation and
//! reset tokens.
//!
//! The primary record lives at `user:{id}`; uniqueness of email and username
//! is enforced through secondary index entries mapping the normalized value
//! back to the id. The store has no cross-key transactions, so the
//! check-then-write sequence in [`CredentialStore::create_user`] can race a
//! concurrent registration on the same email; this is an accepted, documented
//! risk rather than a solved one.

use regex::Regex;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rngs::OsRng};

use crate::clock::Clock;
use crate::kv::{KvStore, keys};

use super::error::{AuthError, ConflictField};
use super::password::{PasswordHash, decoy_hash};
use super::types::{ResetTokenRecord, Role, User};

const TOKEN_BYTES: usize = 32;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Usernames are lowercase, URL-safe, 3-32 characters.
pub(crate) fn valid_username(username_normalized: &str) -> bool {
    Regex::new(r"^[a-z0-9_-]{3,32}$").is_ok_and(|regex| regex.is_match(username_normalized))
}

/// Minimal strength rule; safe to disclose in registration errors.
pub(crate) fn valid_password(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Opaque high-entropy token for confirmation/reset links. Only ever handed
/// to the user; the store maps it to the account it belongs to.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub struct CredentialStore {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    confirm_ttl_seconds: i64,
    reset_ttl_seconds: i64,
    /// Verified against when the account does not exist, keeping response
    /// timing independent of account existence.
    decoy: PasswordHash,
}

impl CredentialStore {
    #[must_use]
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        confirm_ttl_seconds: i64,
        reset_ttl_seconds: i64,
    ) -> Self {
        Self {
            store,
            clock,
            confirm_ttl_seconds,
            reset_ttl_seconds,
            decoy: decoy_hash(),
        }
    }

    /// Create an unconfirmed account and its confirmation token.
    ///
    /// The primary record, both index entries, and the confirmation-token
    /// entry are written together (sequentially; see module docs on the
    /// registration race).
    ///
    /// # Errors
    /// `InvalidInput` for malformed fields, `Conflict` for a taken email or
    /// username, `Store` for store failures.
    pub async fn create_user(
        &self,
        username: &str,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(User, String), AuthError> {
        let email = normalize_email(email);
        let username = username.trim().to_lowercase();

        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email address".to_string()));
        }
        if !valid_username(&username) {
            return Err(AuthError::InvalidInput(
                "username must be 3-32 characters: a-z, 0-9, '-', '_'".to_string(),
            ));
        }
        if !valid_password(password) {
            return Err(AuthError::InvalidInput(
                "password must be at least 8 characters with a letter and a digit".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(AuthError::InvalidInput("name must not be empty".to_string()));
        }

        if self.store.get(&keys::username_index(&username)).await?.is_some() {
            return Err(AuthError::Conflict(ConflictField::Username));
        }
        if self.store.get(&keys::email_index(&email)).await?.is_some() {
            return Err(AuthError::Conflict(ConflictField::Email));
        }

        let now = self.clock.now_unix();
        let confirmation_token = generate_token();
        let user = User {
            id: Uuid::new_v4(),
            username,
            name: name.trim().to_string(),
            email,
            password_hash: PasswordHash::new(password).to_string(),
            role: Role::Contributor,
            avatar: None,
            bio: None,
            created_at: now,
            email_confirmed: false,
            confirmation_token: Some(confirmation_token.clone()),
            confirmation_expires_at: Some(now + self.confirm_ttl_seconds),
        };

        self.put_user(&user).await?;
        self.store
            .put(&keys::email_index(&user.email), user.id.to_string(), None)
            .await?;
        self.store
            .put(
                &keys::username_index(&user.username),
                user.id.to_string(),
                None,
            )
            .await?;
        self.store
            .put(
                &keys::confirm_token(&confirmation_token),
                user.id.to_string(),
                Some(self.confirm_ttl_seconds),
            )
            .await?;

        Ok((user, confirmation_token))
    }

    /// Verify an email/password pair.
    ///
    /// Returns `None` on any mismatch without distinguishing "no such user"
    /// from "wrong password": unknown accounts still burn a full hash
    /// verification against a decoy. A successful verification against a
    /// legacy hash transparently rewrites the record with the current scheme;
    /// login still succeeds if that rewrite fails.
    ///
    /// # Errors
    /// `Store` for store failures.
    pub async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.find_by_email(&email).await? else {
            let _ = self.decoy.verify(password);
            return Ok(None);
        };

        let Some(hash) = PasswordHash::parse(&user.password_hash) else {
            error!("Unparseable password hash for user {}", user.id);
            let _ = self.decoy.verify(password);
            return Ok(None);
        };

        if !hash.verify(password) {
            return Ok(None);
        }

        if hash.needs_upgrade() {
            let mut upgraded = user.clone();
            upgraded.password_hash = PasswordHash::new(password).to_string();
            // Never force a re-login over a failed upgrade write.
            if let Err(err) = self.put_user(&upgraded).await {
                warn!("Failed to upgrade password hash for {}: {err}", user.id);
                return Ok(Some(user));
            }
            return Ok(Some(upgraded));
        }

        Ok(Some(user))
    }

    /// Redeem a confirmation token.
    ///
    /// Idempotent failure: a consumed, expired, or unknown token yields
    /// `Ok(None)`, never an error.
    ///
    /// # Errors
    /// `Store` for store failures.
    pub async fn confirm_email(&self, token: &str) -> Result<Option<User>, AuthError> {
        let key = keys::confirm_token(token);
        let Some(raw_id) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let Ok(user_id) = raw_id.parse::<Uuid>() else {
            warn!("Dropping undecodable confirmation entry");
            self.store.delete(&key).await?;
            return Ok(None);
        };
        let Some(mut user) = self.find_by_id(user_id).await? else {
            self.store.delete(&key).await?;
            return Ok(None);
        };

        let now = self.clock.now_unix();
        let token_matches = user.confirmation_token.as_deref() == Some(token);
        let unexpired = user.confirmation_expires_at.is_some_and(|at| at > now);
        if !token_matches || !unexpired {
            self.store.delete(&key).await?;
            return Ok(None);
        }

        user.email_confirmed = true;
        user.confirmation_token = None;
        user.confirmation_expires_at = None;
        self.put_user(&user).await?;
        self.store.delete(&key).await?;
        Ok(Some(user))
    }

    /// Issue a single-use password-reset token, or `None` when the email is
    /// unknown. Callers must respond identically either way; email existence
    /// is never confirmed on this path.
    ///
    /// # Errors
    /// `Store` for store failures.
    pub async fn create_reset_token(&self, email: &str) -> Result<Option<String>, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.find_by_email(&email).await? else {
            return Ok(None);
        };

        let now = self.clock.now_unix();
        let token = generate_token();
        let record = ResetTokenRecord {
            user_id: user.id,
            email: user.email,
            created_at: now,
            expires_at: now + self.reset_ttl_seconds,
        };
        let raw = serde_json::to_string(&record)
            .map_err(|err| AuthError::InvalidInput(err.to_string()))?;
        self.store
            .put(&keys::reset_token(&token), raw, Some(self.reset_ttl_seconds))
            .await?;
        Ok(Some(token))
    }

    /// Redeem a reset token and set the new password (current hash scheme).
    /// The token is deleted whether or not it was still valid: single use.
    ///
    /// # Errors
    /// `InvalidInput` for a weak password, `Store` for store failures.
    pub async fn consume_reset_token(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<Option<User>, AuthError> {
        if !valid_password(new_password) {
            return Err(AuthError::InvalidInput(
                "password must be at least 8 characters with a letter and a digit".to_string(),
            ));
        }

        let key = keys::reset_token(token);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        self.store.delete(&key).await?;

        let record: ResetTokenRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!("Dropping undecodable reset record: {err}");
                return Ok(None);
            }
        };
        if record.expires_at <= self.clock.now_unix() {
            return Ok(None);
        }
        let Some(mut user) = self.find_by_id(record.user_id).await? else {
            return Ok(None);
        };

        user.password_hash = PasswordHash::new(new_password).to_string();
        self.put_user(&user).await?;
        Ok(Some(user))
    }

    /// # Errors
    /// `Store` for store failures.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let Some(raw) = self.store.get(&keys::user(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                error!("Undecodable user record {id}: {err}");
                Ok(None)
            }
        }
    }

    /// Resolve the email index, then the primary record. Expects normalized
    /// input.
    ///
    /// # Errors
    /// `Store` for store failures.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let Some(raw_id) = self.store.get(&keys::email_index(email)).await? else {
            return Ok(None);
        };
        let Ok(id) = raw_id.parse::<Uuid>() else {
            error!("Undecodable email index entry for {email}");
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    /// Remove the account: primary record, both index entries, and any
    /// pending confirmation token, so no orphaned index entries remain.
    ///
    /// # Errors
    /// `Store` for store failures.
    pub async fn delete_user(&self, id: Uuid) -> Result<(), AuthError> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(());
        };
        if let Some(token) = &user.confirmation_token {
            self.store.delete(&keys::confirm_token(token)).await?;
        }
        self.store.delete(&keys::email_index(&user.email)).await?;
        self.store
            .delete(&keys::username_index(&user.username))
            .await?;
        self.store.delete(&keys::user(id)).await?;
        Ok(())
    }

    async fn put_user(&self, user: &User) -> Result<(), AuthError> {
        let raw =
            serde_json::to_string(user).map_err(|err| AuthError::InvalidInput(err.to_string()))?;
        self.store.put(&keys::user(user.id), raw, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::ConflictField;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKvStore;
    use anyhow::Result;

    const HOUR: i64 = 60 * 60;
    const DAY: i64 = 24 * HOUR;

    fn store() -> (CredentialStore, Arc<ManualClock>, Arc<MemoryKvStore>) {
        let clock = Arc::new(ManualClock::new(100_000));
        let kv = Arc::new(MemoryKvStore::new(clock.clone()));
        (
            CredentialStore::new(kv.clone(), clock.clone(), DAY, HOUR),
            clock,
            kv,
        )
    }

    async fn alice(credentials: &CredentialStore) -> Result<(User, String)> {
        let created = credentials
            .create_user("alice", "Alice", "Alice@Example.COM", "Passw0rd")
            .await?;
        Ok(created)
    }

    #[test]
    fn input_validators() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));

        assert!(valid_username("alice-01_x"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("Has Spaces"));

        assert!(valid_password("Passw0rd"));
        assert!(!valid_password("short1"));
        assert!(!valid_password("lettersonly"));
        assert!(!valid_password("12345678"));
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn create_user_normalizes_and_indexes() -> Result<()> {
        let (credentials, _clock, kv) = store();
        let (user, token) = alice(&credentials).await?;

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, Role::Contributor);
        assert!(!user.email_confirmed);
        assert!(!token.is_empty());

        let indexed = kv.get(&keys::email_index("alice@example.com")).await?;
        assert_eq!(indexed, Some(user.id.to_string()));
        let indexed = kv.get(&keys::username_index("alice")).await?;
        assert_eq!(indexed, Some(user.id.to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_and_username_conflict() -> Result<()> {
        let (credentials, _clock, _kv) = store();
        alice(&credentials).await?;

        let err = credentials
            .create_user("alice", "Other", "other@example.com", "Passw0rd")
            .await;
        assert!(matches!(
            err,
            Err(AuthError::Conflict(ConflictField::Username))
        ));

        let err = credentials
            .create_user("bob", "Bob", "alice@example.com", "Passw0rd")
            .await;
        assert!(matches!(err, Err(AuthError::Conflict(ConflictField::Email))));
        Ok(())
    }

    #[tokio::test]
    async fn weak_inputs_are_rejected_before_any_write() -> Result<()> {
        let (credentials, _clock, kv) = store();
        let err = credentials
            .create_user("alice", "Alice", "alice@example.com", "weak")
            .await;
        assert!(matches!(err, Err(AuthError::InvalidInput(_))));
        assert!(kv.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn validate_credentials_accepts_and_rejects() -> Result<()> {
        let (credentials, _clock, _kv) = store();
        alice(&credentials).await?;

        let user = credentials
            .validate_credentials("alice@example.com", "Passw0rd")
            .await?;
        assert!(user.is_some());

        // Wrong password and unknown user are the same observable outcome.
        let user = credentials
            .validate_credentials("alice@example.com", "wrong-pass1")
            .await?;
        assert!(user.is_none());
        let user = credentials
            .validate_credentials("nobody@example.com", "Passw0rd")
            .await?;
        assert!(user.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn legacy_hash_upgrades_transparently_on_login() -> Result<()> {
        let (credentials, _clock, kv) = store();
        let (user, _) = alice(&credentials).await?;

        // Rewrite the stored record with a pre-migration hash.
        let mut legacy_user = user.clone();
        legacy_user.password_hash = PasswordHash::legacy("Passw0rd").to_string();
        kv.put(
            &keys::user(user.id),
            serde_json::to_string(&legacy_user)?,
            None,
        )
        .await?;

        let validated = credentials
            .validate_credentials("alice@example.com", "Passw0rd")
            .await?;
        assert!(validated.is_some());

        // Stored record now carries a current-format hash, and the original
        // password still verifies against it.
        let stored = credentials.find_by_id(user.id).await?;
        let hash = stored
            .as_ref()
            .and_then(|user| PasswordHash::parse(&user.password_hash));
        let hash = match hash {
            Some(hash) => hash,
            None => panic!("stored hash should parse"),
        };
        assert!(!hash.needs_upgrade());
        assert!(hash.verify("Passw0rd"));
        Ok(())
    }

    #[tokio::test]
    async fn confirm_email_is_single_use() -> Result<()> {
        let (credentials, _clock, _kv) = store();
        let (_, token) = alice(&credentials).await?;

        let confirmed = credentials.confirm_email(&token).await?;
        assert!(confirmed.is_some_and(|user| user.email_confirmed));

        // Already consumed: quiet failure, not an error.
        assert!(credentials.confirm_email(&token).await?.is_none());
        assert!(credentials.confirm_email("unknown-token").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn confirm_email_respects_expiry() -> Result<()> {
        let (credentials, clock, _kv) = store();
        let (_, token) = alice(&credentials).await?;
        clock.advance(DAY + 1);
        assert!(credentials.confirm_email(&token).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reset_token_round_trip() -> Result<()> {
        let (credentials, _clock, _kv) = store();
        alice(&credentials).await?;

        // Unknown email: no token, no error.
        assert!(
            credentials
                .create_reset_token("nobody@example.com")
                .await?
                .is_none()
        );

        let token = credentials.create_reset_token("alice@example.com").await?;
        let token = match token {
            Some(token) => token,
            None => panic!("reset token expected"),
        };

        let user = credentials
            .consume_reset_token(&token, "NewPassw0rd")
            .await?;
        assert!(user.is_some());
        assert!(
            credentials
                .validate_credentials("alice@example.com", "NewPassw0rd")
                .await?
                .is_some()
        );
        assert!(
            credentials
                .validate_credentials("alice@example.com", "Passw0rd")
                .await?
                .is_none()
        );

        // Single use.
        assert!(
            credentials
                .consume_reset_token(&token, "OtherPass1")
                .await?
                .is_none()
        );
        Ok(())
    }

    #[tokio::test]
    async fn reset_token_expires() -> Result<()> {
        let (credentials, clock, _kv) = store();
        alice(&credentials).await?;
        let token = credentials.create_reset_token("alice@example.com").await?;
        let token = match token {
            Some(token) => token,
            None => panic!("reset token expected"),
        };
        clock.advance(HOUR + 1);
        assert!(
            credentials
                .consume_reset_token(&token, "NewPassw0rd")
                .await?
                .is_none()
        );
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_removes_record_and_indexes() -> Result<()> {
        let (credentials, _clock, kv) = store();
        let (user, _) = alice(&credentials).await?;

        credentials.delete_user(user.id).await?;
        assert!(kv.get(&keys::user(user.id)).await?.is_none());
        assert!(kv.get(&keys::email_index("alice@example.com")).await?.is_none());
        assert!(kv.get(&keys::username_index("alice")).await?.is_none());

        // Email and username are free again.
        assert!(alice(&credentials).await.is_ok());
        Ok(())
    }
}
