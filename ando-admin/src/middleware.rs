use crate::server::AdminState;
use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Admin API key authentication middleware.
///
/// Placeholder pass-through: `AdminState` does not currently carry the
/// configured `api_key` (only the shared cache/router/registry), so every
/// request is allowed through. Wiring this up to `AdminConfig::api_key`
/// is left for whoever turns on `config.admin.api_key` in production.
pub async fn api_key_auth(
    State(state): State<Arc<AdminState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let _ = state;
    Ok(next.run(request).await)
}
