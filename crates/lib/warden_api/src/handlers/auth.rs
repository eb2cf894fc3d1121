//! Authentication request handlers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};

use super::issuer;
use crate::AppState;
use crate::error::AppResult;
use crate::extract::JsonBody;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    LoginRequest, LogoutResponse, RefreshRequest, RegisterRequest, TokenResponse, UserResponse,
};

/// `POST /api/v1/auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state
        .auth
        .login(&body.email, &body.password, issuer(&headers))
        .await?;
    Ok(Json(pair.into()))
}

/// `POST /api/v1/auth/register`: create an account holding the default role.
pub async fn register_handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state
        .auth
        .register(&body.username, &body.email, &body.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// `POST /api/v1/auth/refresh`: rotate a refresh token into a new pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state.auth.refresh(&body.refresh_token).await?;
    Ok(Json(pair.into()))
}

/// `POST /api/v1/auth/logout`: drop the caller's refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(ctx)): Extension<AuthenticatedUser>,
) -> AppResult<Json<LogoutResponse>> {
    state.auth.logout(ctx.user_id).await?;
    Ok(Json(LogoutResponse { success: true }))
}
