use axum::response::IntoResponse;

// Undocumented banner route, useful for a quick reachability check.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}
