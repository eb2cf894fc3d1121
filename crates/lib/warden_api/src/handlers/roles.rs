//! Role administration handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use warden_core::models::pagination::ListQuery;
use warden_core::rbac::catalog::split_key;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::models::{CreateRoleRequest, GrantPermissionRequest, GrantResponse, PageResponse, RoleResponse};

const SOURCE: &str = "api::roles";

/// `GET /api/v1/roles?page=&per_page=&keyword=`
pub async fn list_roles_handler(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListQuery>,
) -> AppResult<Json<PageResponse<RoleResponse>>> {
    let page = state
        .repos
        .roles
        .list(&query)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "role", e))?;
    Ok(Json(PageResponse {
        items: page.items.into_iter().map(Into::into).collect(),
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    }))
}

/// `POST /api/v1/roles`
pub async fn create_role_handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleResponse>)> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request(SOURCE, "Role name is required"));
    }
    let role = state
        .repos
        .roles
        .create(name)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "role", e))?;
    Ok((StatusCode::CREATED, Json(role.into())))
}

/// `POST /api/v1/roles/{id}/permissions`: grant `group:name` to a role.
pub async fn grant_permission_handler(
    State(state): State<AppState>,
    PathParam(role_id): PathParam<i64>,
    JsonBody(body): JsonBody<GrantPermissionRequest>,
) -> AppResult<(StatusCode, Json<GrantResponse>)> {
    let (group, name) = split_key(&body.permission)
        .ok_or_else(|| AppError::bad_request(SOURCE, "Permission must be `group:name`"))?;
    let role = state
        .repos
        .roles
        .get_by_id(role_id)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "role", e))?;
    let permission = state
        .repos
        .permissions
        .get_by_key(group, name)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "permission", e))?;
    let grant = state
        .repos
        .grants
        .create(role.id, permission.id)
        .await
        .map_err(|e| AppError::from_store(SOURCE, "role permission", e))?;
    Ok((StatusCode::CREATED, Json(grant.into())))
}
