//! Authentication core: credentials, sessions, CSRF, rate limiting, RBAC.
//!
//! Components are independent and stateless between requests; everything they
//! share lives in the key-value store. [`service::AuthService`] wires them
//! together and enforces the screening order for authentication attempts.

pub mod csrf;
pub mod error;
pub mod password;
pub mod permissions;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod state;
pub mod types;
pub mod users;

pub use error::{AuthError, UnauthorizedReason};
pub use service::{AuthService, LoginOutcome};
pub use state::AuthConfig;
pub use types::{ClientContext, Role, User};
