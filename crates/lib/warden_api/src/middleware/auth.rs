//! Authentication middleware: bearer extraction, token verification and
//! per-route permission checks.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::debug;
use warden_core::auth::{AuthContext, authorize, authorize_optional};

use crate::AppState;
use crate::error::AppError;

/// Key used to store the caller's `AuthContext` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthContext);

/// Inserted by [`optional_auth`] on every request it sees.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<AuthContext>);

/// State for [`require_auth`]: app state plus the route's permission set.
#[derive(Clone)]
pub struct AuthGate {
    state: AppState,
    required: &'static [&'static str],
}

impl AuthGate {
    pub fn new(state: AppState, required: &'static [&'static str]) -> Self {
        Self { state, required }
    }
}

fn authorization(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Rejects the request unless it carries a valid access token holding
/// one of the gate's permissions, then injects `AuthenticatedUser`.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = authorize(gate.state.tokens(), authorization(&request), gate.required).map_err(
        |rejection| {
            debug!(path = %request.uri().path(), reason = %rejection, "request rejected");
            AppError::from(rejection)
        },
    )?;
    request.extensions_mut().insert(AuthenticatedUser(ctx));
    Ok(next.run(request).await)
}

/// Attaches the caller's context when a valid token is present. Never
/// rejects.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = authorize_optional(state.tokens(), authorization(&request));
    request.extensions_mut().insert(MaybeAuthenticated(ctx));
    next.run(request).await
}
