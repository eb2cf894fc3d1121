//! # warden_core
//!
//! Core domain logic for Warden: token issuance and verification,
//! refresh-token rotation, RBAC permission resolution, the cache-aside
//! layer and transactional registration.

pub mod auth;
pub mod cache;
pub mod error;
pub mod migrate;
pub mod models;
pub mod rbac;
pub mod repo;
pub mod store;
pub mod tx;
pub mod validation;

pub use error::{ErrorKind, ServiceError, ServiceErrors, ServiceResult};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
