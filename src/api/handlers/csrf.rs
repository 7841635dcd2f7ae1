use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use crate::auth::AuthService;

use super::client_context;
use super::types::CsrfResponse;

/// Mint a short-lived CSRF token bound to the caller's context. Forms fetch
/// one of these before submitting any state-changing request.
#[utoipa::path(
    get,
    path = "/v1/auth/csrf",
    responses(
        (status = 200, description = "Token minted", body = CsrfResponse)
    ),
    tag = "auth"
)]
pub async fn csrf(headers: HeaderMap, service: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let ctx = client_context(&headers);
    match service.issue_csrf(&ctx) {
        Ok(csrf_token) => (
            StatusCode::OK,
            Json(CsrfResponse {
                csrf_token,
                expires_in_seconds: service.config().csrf_ttl_seconds(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to mint CSRF token: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
