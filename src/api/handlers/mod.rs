pub mod confirm;
pub mod csrf;
pub mod health;
pub mod login;
pub mod register;
pub mod reset;
pub mod root;
pub mod session;
pub mod types;
pub mod users;

// common functions for the handlers

use axum::{
    Json,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, RETRY_AFTER, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::auth::{AuthConfig, AuthError, ClientContext, UnauthorizedReason};

use self::types::ErrorBody;

pub(crate) const SESSION_COOKIE_NAME: &str = "wikigate_session";
pub(crate) const CSRF_HEADER: &str = "x-csrf-token";

/// Extract the client context used for rate-limit dimensions and CSRF
/// binding. A request with no usable IP header still gets limited, just under
/// a shared bucket.
pub(crate) fn client_context(headers: &HeaderMap) -> ClientContext {
    let ip = header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next().map(str::trim).map(str::to_string))
        .filter(|value| !value.is_empty())
        .or_else(|| header_str(headers, "x-real-ip").map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    ClientContext {
        ip,
        country: header_str(headers, "cf-ipcountry").map(str::to_string),
        user_agent: header_str(headers, "user-agent").map(str::to_string),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub(crate) fn extract_csrf_token(headers: &HeaderMap) -> Option<String> {
    header_str(headers, CSRF_HEADER).map(str::to_string)
}

/// Session token from the cookie, with a bearer fallback for API clients.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        // Skip malformed pairs instead of giving up on the whole header.
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == SESSION_COOKIE_NAME {
            return Some(val.trim().to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn set_cookie_headers(cookie: Result<HeaderValue, InvalidHeaderValue>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match cookie {
        Ok(value) => {
            headers.insert(SET_COOKIE, value);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
        }
    }
    headers
}

/// Translate a service error into an HTTP response. Bodies stay generic;
/// anything specific goes to the log.
pub(crate) fn error_response(err: &AuthError) -> Response {
    match err {
        AuthError::InvalidInput(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new(message.clone())),
        )
            .into_response(),
        AuthError::Conflict(_) => (
            StatusCode::CONFLICT,
            Json(ErrorBody::new("Already taken".to_string()).with_reason("conflict")),
        )
            .into_response(),
        AuthError::Unauthorized(reason) => {
            let (message, tag) = match reason {
                UnauthorizedReason::BadCredentials => {
                    ("Invalid email or password", "bad_credentials")
                }
                UnauthorizedReason::EmailNotConfirmed => {
                    ("Email address not confirmed", "email_not_confirmed")
                }
                UnauthorizedReason::SessionInvalid => ("No active session", "session_invalid"),
                UnauthorizedReason::CsrfRejected => {
                    ("Invalid or expired request token", "csrf_rejected")
                }
            };
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new(message.to_string()).with_reason(tag)),
            )
                .into_response()
        }
        AuthError::Forbidden(message) => (
            StatusCode::FORBIDDEN,
            Json(ErrorBody::new((*message).to_string()).with_reason("forbidden")),
        )
            .into_response(),
        AuthError::RateLimited {
            retry_after_seconds,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            retry_after_headers(*retry_after_seconds),
            Json(
                ErrorBody::new("Too many requests".to_string())
                    .with_reason("rate_limited")
                    .with_retry_after(*retry_after_seconds),
            ),
        )
            .into_response(),
        AuthError::Locked {
            retry_after_seconds,
        } => (
            StatusCode::LOCKED,
            retry_after_headers(*retry_after_seconds),
            Json(
                ErrorBody::new("Account temporarily locked".to_string())
                    .with_reason("locked")
                    .with_retry_after(*retry_after_seconds),
            ),
        )
            .into_response(),
        AuthError::Store(store_err) => {
            error!("Store failure while handling request: {store_err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::new("Service temporarily unavailable".to_string())),
            )
                .into_response()
        }
    }
}

fn retry_after_headers(retry_after_seconds: i64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
        headers.insert(RETRY_AFTER, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvError;
    use axum::http::HeaderValue;

    #[test]
    fn client_context_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("DE"));
        let ctx = client_context(&headers);
        assert_eq!(ctx.ip, "1.2.3.4");
        assert_eq!(ctx.country.as_deref(), Some("DE"));
    }

    #[test]
    fn client_context_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(client_context(&headers).ip, "9.9.9.9");

        let headers = HeaderMap::new();
        assert_eq!(client_context(&headers).ip, "unknown");
    }

    #[test]
    fn session_token_from_cookie_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; wikigate_session=tok123; lang=en"),
        );
        assert_eq!(extract_session_token(&headers), Some("tok123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok456"));
        assert_eq!(extract_session_token(&headers), Some("tok456".to_string()));

        let headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn session_token_survives_malformed_cookie_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("garbage; wikigate_session=tok789"),
        );
        assert_eq!(extract_session_token(&headers), Some("tok789".to_string()));
    }

    #[test]
    fn session_cookie_attributes() {
        let config = AuthConfig::new();
        let cookie = session_cookie(&config, "tok");
        let value = cookie.ok().and_then(|v| v.to_str().ok().map(str::to_string));
        let value = value.unwrap_or_default();
        assert!(value.starts_with("wikigate_session=tok"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Secure"));

        let config = AuthConfig::new().with_cookie_secure(false);
        let cookie = clear_session_cookie(&config);
        let value = cookie.ok().and_then(|v| v.to_str().ok().map(str::to_string));
        let value = value.unwrap_or_default();
        assert!(value.contains("Max-Age=0"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn error_response_sets_retry_after() {
        let response = error_response(&AuthError::RateLimited {
            retry_after_seconds: 42,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from_static("42"))
        );

        let response = error_response(&AuthError::Locked {
            retry_after_seconds: 60,
        });
        assert_eq!(response.status(), StatusCode::LOCKED);

        let response = error_response(&AuthError::Store(KvError::Timeout));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
