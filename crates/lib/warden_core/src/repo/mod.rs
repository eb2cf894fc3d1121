//! Cache-aside repositories over the system of record.
//!
//! Reads check the cache first and fill it on a miss. Every write drops the
//! entity's primary and alternate keys plus the whole list family of its
//! type once the storage call has succeeded.

mod rbac;
mod users;

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::store::Storage;

pub use rbac::{PermissionRepository, RoleAssignmentRepository, RoleGrantRepository, RoleRepository};
pub use users::UserRepository;

/// Shared handles passed to every component constructor.
#[derive(Clone)]
pub struct Resources {
    pub storage: Arc<dyn Storage>,
    /// `None` runs every cache in nil-store mode.
    pub cache: Option<Arc<dyn CacheStore>>,
    /// Backend of the refresh token store. Defaults to `cache`.
    pub sessions: Option<Arc<dyn CacheStore>>,
}

impl Resources {
    pub fn new(storage: Arc<dyn Storage>, cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            storage,
            sessions: cache.clone(),
            cache,
        }
    }

    /// Keep refresh tokens in `sessions` even when entity caching is off.
    pub fn with_sessions(mut self, sessions: Arc<dyn CacheStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }
}

/// All repositories built over one [`Resources`].
#[derive(Clone)]
pub struct Repositories {
    pub users: UserRepository,
    pub roles: RoleRepository,
    pub permissions: PermissionRepository,
    pub grants: RoleGrantRepository,
    pub assignments: RoleAssignmentRepository,
}

impl Repositories {
    pub fn new(res: &Resources) -> Self {
        Self {
            users: UserRepository::new(res),
            roles: RoleRepository::new(res),
            permissions: PermissionRepository::new(res),
            grants: RoleGrantRepository::new(res),
            assignments: RoleAssignmentRepository::new(res),
        }
    }
}
