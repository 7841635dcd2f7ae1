use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::auth::AuthService;

use super::error_response;
use super::types::ConfirmRequest;

/// Redeem the emailed confirmation token and activate the account.
#[utoipa::path(
    post,
    path = "/v1/auth/confirm",
    request_body = ConfirmRequest,
    responses(
        (status = 204, description = "Email confirmed"),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "auth"
)]
pub async fn confirm(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ConfirmRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    match service.confirm_email(token).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
