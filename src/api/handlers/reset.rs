//! Password-reset endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthService;

use super::types::{ResetConfirmRequest, ResetRequest};
use super::{client_context, error_response, extract_csrf_token};

/// Start a password reset (always returns 204 to avoid user enumeration).
#[utoipa::path(
    post,
    path = "/v1/auth/reset/request",
    request_body = ResetRequest,
    params(
        ("x-csrf-token" = String, Header, description = "CSRF token from /v1/auth/csrf")
    ),
    responses(
        (status = 204, description = "Reset accepted"),
        (status = 401, description = "Missing or invalid CSRF token"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn reset_request(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ResetRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let csrf_token = extract_csrf_token(&headers).unwrap_or_default();
    let ctx = client_context(&headers);

    match service
        .request_password_reset(&csrf_token, &ctx, &request.email)
        .await
    {
        Ok(Some(token)) => {
            // Stand-in for the mailer: the reset link lands in the log.
            info!("Password reset token issued: {token}");
            StatusCode::NO_CONTENT.into_response()
        }
        // Unknown email: same response, nothing issued.
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

/// Complete a password reset with the emailed token.
#[utoipa::path(
    post,
    path = "/v1/auth/reset/confirm",
    request_body = ResetConfirmRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid token or weak password")
    ),
    tag = "auth"
)]
pub async fn reset_confirm(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ResetConfirmRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    match service.reset_password(token, &request.new_password).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
