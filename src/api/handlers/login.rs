use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::auth::AuthService;

use super::types::{LoginRequest, SessionResponse};
use super::{client_context, error_response, extract_csrf_token, session_cookie, set_cookie_headers};

/// Authenticate and set the session cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    params(
        ("x-csrf-token" = String, Header, description = "CSRF token from /v1/auth/csrf")
    ),
    responses(
        (status = 200, description = "Session created", body = SessionResponse),
        (status = 401, description = "Invalid credentials, unconfirmed email, or bad CSRF token"),
        (status = 423, description = "Account locked"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let csrf_token = extract_csrf_token(&headers).unwrap_or_default();
    let ctx = client_context(&headers);

    match service
        .login(&csrf_token, &ctx, &request.email, &request.password)
        .await
    {
        Ok(outcome) => {
            let response_headers =
                set_cookie_headers(session_cookie(service.config(), &outcome.token));
            (
                StatusCode::OK,
                response_headers,
                Json(SessionResponse {
                    user_id: outcome.user.id.to_string(),
                    username: outcome.user.username,
                    name: outcome.user.name,
                    role: outcome.user.role.as_str().to_string(),
                    expires_at: outcome.expires_at,
                }),
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}
