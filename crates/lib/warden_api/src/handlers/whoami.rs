//! Identity echo for optionally-authenticated callers.

use axum::{Extension, Json};

use crate::middleware::auth::MaybeAuthenticated;
use crate::models::WhoamiResponse;

/// `GET /api/v1/whoami`: who the token says the caller is, if anyone.
pub async fn whoami_handler(
    Extension(MaybeAuthenticated(ctx)): Extension<MaybeAuthenticated>,
) -> Json<WhoamiResponse> {
    Json(match ctx {
        Some(ctx) => WhoamiResponse {
            authenticated: true,
            user_id: Some(ctx.user_id),
            roles: ctx.roles,
            permissions: ctx.permissions,
        },
        None => WhoamiResponse {
            authenticated: false,
            user_id: None,
            roles: Vec::new(),
            permissions: Vec::new(),
        },
    })
}
