//! Effective-permission resolution over user → role → permission links.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{ServiceErrors, ServiceResult};
use crate::models::rbac::Role;
use crate::repo::{
    PermissionRepository, Repositories, RoleAssignmentRepository, RoleGrantRepository,
    RoleRepository,
};

const SOURCE: &str = "rbac::resolver";

/// Roles and permissions a user holds at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccess {
    /// Role names in assignment order.
    pub roles: Vec<String>,
    /// Deduplicated `group:name` strings, sorted.
    pub permissions: Vec<String>,
}

#[derive(Clone)]
pub struct PermissionResolver {
    assignments: RoleAssignmentRepository,
    roles: RoleRepository,
    grants: RoleGrantRepository,
    permissions: PermissionRepository,
}

impl PermissionResolver {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            assignments: repos.assignments.clone(),
            roles: repos.roles.clone(),
            grants: repos.grants.clone(),
            permissions: repos.permissions.clone(),
        }
    }

    /// Resolve `user_id`'s roles and permissions.
    ///
    /// Only a failure to load the assignments is an error. A role, grant or
    /// permission that cannot be loaded is skipped, so one dangling link does
    /// not deny the rest of the user's access.
    pub async fn resolve(&self, user_id: i64) -> ServiceResult<ResolvedAccess> {
        let assignments = self
            .assignments
            .for_user(user_id)
            .await
            .map_err(|e| ServiceErrors::wrapped(SOURCE, e, "role assignment"))?;

        let mut roles = Vec::with_capacity(assignments.len());
        let mut permissions = BTreeSet::new();
        for assignment in &assignments {
            let Some(role) = self.role(assignment.role_id).await else {
                continue;
            };
            self.collect_permissions(&role, &mut permissions).await;
            roles.push(role.name);
        }

        Ok(ResolvedAccess {
            roles,
            permissions: permissions.into_iter().collect(),
        })
    }

    async fn role(&self, role_id: i64) -> Option<Role> {
        match self.roles.get_by_id(role_id).await {
            Ok(role) => Some(role),
            Err(e) => {
                debug!(role_id, error = %e, "skipping unresolvable role");
                None
            }
        }
    }

    async fn collect_permissions(&self, role: &Role, into: &mut BTreeSet<String>) {
        let grants = match self.grants.for_role(role.id).await {
            Ok(grants) => grants,
            Err(e) => {
                debug!(role_id = role.id, error = %e, "skipping role grants");
                return;
            }
        };
        for grant in grants {
            match self.permissions.get_by_id(grant.permission_id).await {
                Ok(permission) => {
                    into.insert(permission.key());
                }
                Err(e) => {
                    debug!(
                        permission_id = grant.permission_id,
                        error = %e,
                        "skipping unresolvable permission"
                    );
                }
            }
        }
    }
}
