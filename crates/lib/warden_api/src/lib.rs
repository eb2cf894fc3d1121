//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{MethodRouter, delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use warden_core::auth::{AuthService, TokenService};
use warden_core::rbac::catalog;
use warden_core::repo::{Repositories, Resources};
use warden_core::store::Storage;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, roles, users, whoami};
use crate::middleware::auth::{AuthGate, optional_auth, require_auth};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub repos: Repositories,
    /// System of record, for health checks.
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(res: &Resources, tokens: Arc<TokenService>, config: &ApiConfig) -> Self {
        Self {
            auth: AuthService::new(res, tokens, config.auth_settings()),
            repos: Repositories::new(res),
            storage: res.storage.clone(),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        self.auth.tokens()
    }
}

/// Run embedded database migrations.
///
/// Delegates to `warden_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Wrap `route` so it only runs for callers holding one of `required`.
/// An empty set only demands a valid access token.
fn guarded(
    state: &AppState,
    required: &'static [&'static str],
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(axum::middleware::from_fn_with_state(
        AuthGate::new(state.clone(), required),
        require_auth,
    ))
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(
            routes::GET_WHOAMI,
            get(whoami::whoami_handler).route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                optional_auth,
            )),
        );

    let protected = Router::new()
        .route(
            routes::POST_AUTH_LOGOUT,
            guarded(&state, &[], post(auth::logout_handler)),
        )
        .route(
            routes::GET_USERS_ME,
            guarded(&state, &[catalog::USER_ME], get(users::me_handler)),
        )
        .route(
            routes::USERS,
            guarded(&state, &[catalog::USER_LIST], get(users::list_users_handler)),
        )
        .route(
            routes::USERS_ID,
            guarded(&state, &[catalog::USER_READ], get(users::get_user_handler)).merge(guarded(
                &state,
                &[catalog::USER_DELETE],
                delete(users::delete_user_handler),
            )),
        )
        .route(
            routes::POST_USERS_ID_ROLES,
            guarded(
                &state,
                &[catalog::USER_ROLE_CREATE],
                post(users::assign_role_handler),
            ),
        )
        .route(
            routes::ROLES,
            guarded(&state, &[catalog::ROLE_LIST], get(roles::list_roles_handler)).merge(guarded(
                &state,
                &[catalog::ROLE_CREATE],
                post(roles::create_role_handler),
            )),
        )
        .route(
            routes::POST_ROLES_ID_PERMISSIONS,
            guarded(
                &state,
                &[catalog::ROLE_PERMISSION_CREATE],
                post(roles::grant_permission_handler),
            ),
        );

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
