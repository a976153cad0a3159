//! Admin endpoints, guarded by a static bearer token.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::{error::ApiError, AppState};

/// Middleware requiring `Authorization: Bearer <ADMIN_TOKEN>`.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or(ApiError::AdminDisabled)?;

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if !provided.is_some_and(|token| tokens_match(token, expected)) {
        warn!("Rejected admin request with missing or invalid token");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn tokens_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub version: u32,
}

/// Re-read the policy file now.
///
/// `POST /admin/policy/reload`
#[tracing::instrument(skip(state))]
pub async fn reload_policy(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let version = state.policies.reload().await?;
    info!(version, "Policy reloaded on request");
    Ok(Json(ReloadResponse { version }))
}
