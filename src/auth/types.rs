//! Shared data model: users, roles, client context.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Closed role enumeration with a total privilege order.
///
/// Declaration order drives the derived `Ord`; the numeric access level is
/// what gets exposed to callers that want to compare privileges.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Contributor,
    Editor,
    Admin,
}

impl Role {
    /// Numeric rank, monotonic with privilege.
    #[must_use]
    pub fn access_level(self) -> u8 {
        match self {
            Self::Viewer => 1,
            Self::Contributor => 2,
            Self::Editor => 3,
            Self::Admin => 4,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Contributor => "contributor",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }
}

/// Primary user record, stored at `user:{id}`.
///
/// The email and username are unique via secondary index entries
/// (`email:{email}`, `username:{username}`) that map back to the id; index
/// entries and this record are created and deleted together.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    /// Versioned hash string, parsed by [`crate::auth::password::PasswordHash`].
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub created_at: i64,
    pub email_confirmed: bool,
    #[serde(default)]
    pub confirmation_token: Option<String>,
    #[serde(default)]
    pub confirmation_expires_at: Option<i64>,
}

impl User {
    #[must_use]
    pub fn access_level(&self) -> u8 {
        self.role.access_level()
    }
}

/// Client-side request context supplied by the HTTP layer.
///
/// Used for rate-limit dimensions and for binding CSRF tokens to the client
/// that requested them.
#[derive(Clone, Debug, Default)]
pub struct ClientContext {
    pub ip: String,
    pub country: Option<String>,
    pub user_agent: Option<String>,
}

/// Single-use password-reset record, stored at `reset:{token}` with a 1 h TTL.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ResetTokenRecord {
    pub user_id: Uuid,
    pub email: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_is_total() {
        assert!(Role::Admin > Role::Editor);
        assert!(Role::Editor > Role::Contributor);
        assert!(Role::Contributor > Role::Viewer);
    }

    #[test]
    fn access_level_is_monotonic_with_role() {
        let roles = [Role::Viewer, Role::Contributor, Role::Editor, Role::Admin];
        for pair in roles.windows(2) {
            assert!(pair[0].access_level() < pair[1].access_level());
        }
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Contributor).ok().as_deref(),
            Some("\"contributor\"")
        );
        let parsed: Result<Role, _> = serde_json::from_str("\"admin\"");
        assert_eq!(parsed.ok(), Some(Role::Admin));
    }

    #[test]
    fn user_record_round_trips_without_optional_fields() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "username": "alice",
            "name": "Alice",
            "email": "alice@example.com",
            "password_hash": "v2$100000$c2FsdA$ZGlnZXN0",
            "role": "contributor",
            "created_at": 1_700_000_000,
            "email_confirmed": true,
        });
        let user: Result<User, _> = serde_json::from_value(json);
        let user = match user {
            Ok(user) => user,
            Err(err) => panic!("user should deserialize: {err}"),
        };
        assert_eq!(user.avatar, None);
        assert_eq!(user.confirmation_token, None);
        assert_eq!(user.access_level(), 2);
    }
}
