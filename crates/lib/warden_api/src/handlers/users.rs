//! User administration handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use tracing::info;
use warden_core::models::pagination::ListQuery;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{AssignRoleRequest, AssignmentResponse, PageResponse, UserResponse};

const SOURCE: &str = "api::users";

/// `GET /api/v1/users/me`: the caller's own account.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(ctx)): Extension<AuthenticatedUser>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .repos
        .users
        .get_by_id(ctx.user_id)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "user", e))?;
    Ok(Json(user.into()))
}

/// `GET /api/v1/users?page=&per_page=&keyword=`
pub async fn list_users_handler(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListQuery>,
) -> AppResult<Json<PageResponse<UserResponse>>> {
    let page = state
        .repos
        .users
        .list(&query)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "user", e))?;
    Ok(Json(PageResponse {
        items: page.items.into_iter().map(Into::into).collect(),
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    }))
}

/// `GET /api/v1/users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .repos
        .users
        .get_by_id(id)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "user", e))?;
    Ok(Json(user.into()))
}

/// `DELETE /api/v1/users/{id}`: remove the account and its session.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    let user = state
        .repos
        .users
        .delete(id)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "user", e))?;
    state.auth.logout(user.id).await?;
    info!(user_id = user.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/users/{id}/roles`: assign a role by name.
///
/// Takes effect on the user's next login or refresh.
pub async fn assign_role_handler(
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<AssignRoleRequest>,
) -> AppResult<(StatusCode, Json<AssignmentResponse>)> {
    let role = state
        .repos
        .roles
        .get_by_name(&body.role)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "role", e))?;
    let assignment = state
        .repos
        .assignments
        .create(id, role.id)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "user role", e))?;
    Ok((StatusCode::CREATED, Json(assignment.into())))
}
