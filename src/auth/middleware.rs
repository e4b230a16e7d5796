//! Bearer authentication layer and per-account ownership check

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::provider::AuthenticatedUser;
use crate::error::LedgerError;
use crate::gateway::state::AppState;

/// Resolve the bearer token through the auth chain and attach the
/// [`AuthenticatedUser`] to the request.
pub async fn bearer_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, LedgerError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| LedgerError::unauthorized("Missing authentication credentials"))?;

    let (scheme, token) = auth_header
        .split_once(' ')
        .ok_or_else(|| LedgerError::unauthorized("Invalid token format"))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(LedgerError::unauthorized("Invalid token format"));
    }

    let user = state.auth.authenticate(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// The caller may only touch its own account.
pub fn ensure_owner(user: &AuthenticatedUser, owner_user_id: i64) -> Result<(), LedgerError> {
    if user.user_id != owner_user_id {
        tracing::warn!(
            user_id = user.user_id,
            owner_user_id,
            "Access to foreign account denied"
        );
        return Err(LedgerError::forbidden(
            "Not authorized to access this resource",
        ));
    }
    Ok(())
}
