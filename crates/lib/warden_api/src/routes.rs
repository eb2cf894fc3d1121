//! Route path constants.

pub const GET_HEALTH: &str = "/api/v1/health";

pub const POST_AUTH_LOGIN: &str = "/api/v1/auth/login";
pub const POST_AUTH_REGISTER: &str = "/api/v1/auth/register";
pub const POST_AUTH_REFRESH: &str = "/api/v1/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/api/v1/auth/logout";

pub const GET_WHOAMI: &str = "/api/v1/whoami";

pub const GET_USERS_ME: &str = "/api/v1/users/me";
/// `GET` list.
pub const USERS: &str = "/api/v1/users";
/// `GET` one, `DELETE` one.
pub const USERS_ID: &str = "/api/v1/users/{id}";
pub const POST_USERS_ID_ROLES: &str = "/api/v1/users/{id}/roles";

/// `GET` list, `POST` create.
pub const ROLES: &str = "/api/v1/roles";
pub const POST_ROLES_ID_PERMISSIONS: &str = "/api/v1/roles/{id}/permissions";
