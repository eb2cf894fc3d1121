//! Role-based access control: the permission catalogue, default seeding and
//! effective-permission resolution.

pub mod catalog;
pub mod resolver;
pub mod seed;

pub use resolver::{PermissionResolver, ResolvedAccess};
pub use seed::{SeedReport, seed_default_rbac};
