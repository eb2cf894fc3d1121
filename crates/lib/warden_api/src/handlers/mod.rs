//! Request handlers.

pub mod auth;
pub mod health;
pub mod roles;
pub mod users;
pub mod whoami;

use axum::http::HeaderMap;
use axum::http::header::HOST;

/// Token issuer for this request: the `Host` it was addressed to.
pub(crate) fn issuer(headers: &HeaderMap) -> &str {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost")
}
