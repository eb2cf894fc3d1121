//! Idempotent bootstrap of the default roles and permission catalogue.

use tracing::{debug, info};

use super::catalog;
use crate::error::{ServiceErrors, ServiceResult};
use crate::models::rbac::{NewPermission, Permission, Role};
use crate::repo::Repositories;
use crate::store::StoreError;

pub const ADMIN_ROLE: &str = "admin";

/// Role assigned to every newly registered identity.
pub const USER_ROLE: &str = "user";

/// Grants of the default user role.
pub const USER_ROLE_PERMISSIONS: [&str; 2] = [catalog::USER_READ, catalog::USER_ME];

const SOURCE: &str = "rbac::seed";

/// Rows created by one seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions: usize,
    pub roles: usize,
    pub grants: usize,
}

/// Ensure the permission catalogue, `admin` (every permission) and `user`
/// (`user:read`, `user:me`) exist. Safe to run on every startup.
pub async fn seed_default_rbac(repos: &Repositories) -> ServiceResult<SeedReport> {
    let mut report = SeedReport::default();

    let mut permissions = Vec::new();
    for new in catalog::all_permissions() {
        permissions.push(ensure_permission(repos, &new, &mut report).await?);
    }

    let admin = ensure_role(repos, ADMIN_ROLE, &mut report).await?;
    for permission in &permissions {
        ensure_grant(repos, &admin, permission, &mut report).await?;
    }

    let user = ensure_role(repos, USER_ROLE, &mut report).await?;
    for permission in permissions
        .iter()
        .filter(|p| USER_ROLE_PERMISSIONS.contains(&p.key().as_str()))
    {
        ensure_grant(repos, &user, permission, &mut report).await?;
    }

    info!(
        permissions = report.permissions,
        roles = report.roles,
        grants = report.grants,
        "default RBAC seeded"
    );
    Ok(report)
}

async fn ensure_permission(
    repos: &Repositories,
    new: &NewPermission,
    report: &mut SeedReport,
) -> ServiceResult<Permission> {
    match repos.permissions.get_by_key(&new.group, &new.name).await {
        Ok(existing) => return Ok(existing),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(ServiceErrors::wrapped(SOURCE, e, "permission")),
    }
    match repos.permissions.create(new).await {
        Ok(created) => {
            report.permissions += 1;
            Ok(created)
        }
        // Lost a race with a concurrent seeder.
        Err(StoreError::Conflict(_)) => repos
            .permissions
            .get_by_key(&new.group, &new.name)
            .await
            .map_err(|e| ServiceErrors::wrapped(SOURCE, e, "permission")),
        Err(e) => Err(ServiceErrors::wrapped(SOURCE, e, "permission")),
    }
}

async fn ensure_role(
    repos: &Repositories,
    name: &str,
    report: &mut SeedReport,
) -> ServiceResult<Role> {
    match repos.roles.get_by_name(name).await {
        Ok(existing) => return Ok(existing),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(ServiceErrors::wrapped(SOURCE, e, "role")),
    }
    match repos.roles.create(name).await {
        Ok(created) => {
            report.roles += 1;
            Ok(created)
        }
        Err(StoreError::Conflict(_)) => repos
            .roles
            .get_by_name(name)
            .await
            .map_err(|e| ServiceErrors::wrapped(SOURCE, e, "role")),
        Err(e) => Err(ServiceErrors::wrapped(SOURCE, e, "role")),
    }
}

async fn ensure_grant(
    repos: &Repositories,
    role: &Role,
    permission: &Permission,
    report: &mut SeedReport,
) -> ServiceResult<()> {
    match repos.grants.create(role.id, permission.id).await {
        Ok(_) => {
            report.grants += 1;
            Ok(())
        }
        Err(StoreError::Conflict(_)) => {
            debug!(role = %role.name, permission = %permission.key(), "grant exists");
            Ok(())
        }
        Err(e) => Err(ServiceErrors::wrapped(SOURCE, e, "role permission")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::repo::Resources;
    use crate::store::memory::MemoryStorage;

    fn repos() -> Repositories {
        Repositories::new(&Resources::new(Arc::new(MemoryStorage::new()), None))
    }

    #[tokio::test]
    async fn seeds_catalogue_and_default_roles() {
        let repos = repos();
        let report = seed_default_rbac(&repos).await.unwrap();
        assert_eq!(report.permissions, 26);
        assert_eq!(report.roles, 2);
        assert_eq!(report.grants, 26 + 2);

        let user = repos.roles.get_by_name(USER_ROLE).await.unwrap();
        let grants = repos.grants.for_role(user.id).await.unwrap();
        assert_eq!(grants.len(), 2);
    }

    #[tokio::test]
    async fn seeding_twice_creates_nothing() {
        let repos = repos();
        seed_default_rbac(&repos).await.unwrap();
        let second = seed_default_rbac(&repos).await.unwrap();
        assert_eq!(second, SeedReport::default());
    }
}
