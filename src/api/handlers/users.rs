use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthError, AuthService, UnauthorizedReason};

use super::{error_response, extract_session_token};

/// Delete an account. The caller must hold a valid session and be either the
/// account owner or an admin.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(
        ("id" = Uuid, Path, description = "Account to delete")
    ),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "No valid session"),
        (status = 403, description = "Not the owner and not an admin")
    ),
    tag = "auth"
)]
pub async fn delete_user(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(token) = extract_session_token(&headers) else {
        return error_response(&AuthError::Unauthorized(UnauthorizedReason::SessionInvalid));
    };

    match service.delete_account(&token, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
