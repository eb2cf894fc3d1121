//! Domain models.
//!
//! These are internal domain models shared by the storage backends, the
//! cache layer and the HTTP crate.

pub mod auth;
pub mod pagination;
pub mod rbac;
