use std::sync::Arc;

use crate::cache::EntityCache;
use crate::models::pagination::{ListQuery, Page};
use crate::models::rbac::{NewPermission, Permission, Role, RoleAssignment, RoleGrant, permission_key};
use crate::store::{Storage, StoreResult};

use super::Resources;

const ROLE: &str = "role";
const PERMISSION: &str = "permission";
const ROLE_PERMISSION: &str = "role_permission";
pub(super) const USER_ROLE: &str = "user_role";

#[derive(Clone)]
pub struct RoleRepository {
    storage: Arc<dyn Storage>,
    cache: EntityCache<Role>,
    grants: EntityCache<Vec<RoleGrant>>,
    assignments: EntityCache<Vec<RoleAssignment>>,
}

impl RoleRepository {
    pub fn new(res: &Resources) -> Self {
        Self {
            storage: res.storage.clone(),
            cache: EntityCache::new(res.cache.clone(), ROLE),
            grants: EntityCache::new(res.cache.clone(), ROLE_PERMISSION),
            assignments: EntityCache::new(res.cache.clone(), USER_ROLE),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Role> {
        let key = self.cache.id_key(id);
        if let Some(role) = self.cache.get(&key).await {
            return Ok(role);
        }
        let role = self.storage.role_by_id(id).await?;
        self.cache.set(&key, &role).await;
        Ok(role)
    }

    pub async fn get_by_name(&self, name: &str) -> StoreResult<Role> {
        let key = self.cache.alt_key("name", name);
        if let Some(role) = self.cache.get(&key).await {
            return Ok(role);
        }
        let role = self.storage.role_by_name(name).await?;
        self.cache.set(&key, &role).await;
        Ok(role)
    }

    pub async fn create(&self, name: &str) -> StoreResult<Role> {
        let role = self.storage.insert_role(name).await?;
        self.invalidate(&role).await;
        Ok(role)
    }

    pub async fn rename(&self, id: i64, name: &str) -> StoreResult<Role> {
        let before = self.storage.role_by_id(id).await?;
        let after = self.storage.rename_role(id, name).await?;
        self.invalidate(&before).await;
        self.cache
            .invalidate(&[self.cache.alt_key("name", &after.name)])
            .await;
        Ok(after)
    }

    /// Deleting a role cascades to its grants and assignments.
    pub async fn delete(&self, id: i64) -> StoreResult<Role> {
        let role = self.storage.delete_role(id).await?;
        self.invalidate(&role).await;
        self.grants
            .invalidate(&[self.grants.alt_key(ROLE, &id.to_string())])
            .await;
        self.assignments.invalidate_all().await;
        Ok(role)
    }

    pub async fn list(&self, query: &ListQuery) -> StoreResult<Page<Role>> {
        if let Some(page) = self.cache.get_list(query).await {
            return Ok(page);
        }
        let page = self.storage.list_roles(query).await?;
        self.cache.set_list(query, &page).await;
        Ok(page)
    }

    async fn invalidate(&self, role: &Role) {
        self.cache
            .invalidate(&[
                self.cache.id_key(role.id),
                self.cache.alt_key("name", &role.name),
            ])
            .await;
        self.cache.invalidate_all_lists().await;
    }
}

#[derive(Clone)]
pub struct PermissionRepository {
    storage: Arc<dyn Storage>,
    cache: EntityCache<Permission>,
    grants: EntityCache<Vec<RoleGrant>>,
}

impl PermissionRepository {
    pub fn new(res: &Resources) -> Self {
        Self {
            storage: res.storage.clone(),
            cache: EntityCache::new(res.cache.clone(), PERMISSION),
            grants: EntityCache::new(res.cache.clone(), ROLE_PERMISSION),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Permission> {
        let key = self.cache.id_key(id);
        if let Some(permission) = self.cache.get(&key).await {
            return Ok(permission);
        }
        let permission = self.storage.permission_by_id(id).await?;
        self.cache.set(&key, &permission).await;
        Ok(permission)
    }

    pub async fn get_by_key(&self, group: &str, name: &str) -> StoreResult<Permission> {
        let key = self.cache.alt_key("key", &permission_key(group, name));
        if let Some(permission) = self.cache.get(&key).await {
            return Ok(permission);
        }
        let permission = self.storage.permission_by_key(group, name).await?;
        self.cache.set(&key, &permission).await;
        Ok(permission)
    }

    pub async fn create(&self, new: &NewPermission) -> StoreResult<Permission> {
        let permission = self.storage.insert_permission(new).await?;
        self.invalidate(&permission).await;
        Ok(permission)
    }

    /// Deleting a permission cascades to grants of any role, so every
    /// cached grant list is dropped.
    pub async fn delete(&self, id: i64) -> StoreResult<Permission> {
        let permission = self.storage.delete_permission(id).await?;
        self.invalidate(&permission).await;
        self.grants.invalidate_all().await;
        Ok(permission)
    }

    async fn invalidate(&self, permission: &Permission) {
        self.cache
            .invalidate(&[
                self.cache.id_key(permission.id),
                self.cache.alt_key("key", &permission.key()),
            ])
            .await;
        self.cache.invalidate_all_lists().await;
    }
}

/// Role-to-permission links, cached per role.
#[derive(Clone)]
pub struct RoleGrantRepository {
    storage: Arc<dyn Storage>,
    cache: EntityCache<Vec<RoleGrant>>,
}

impl RoleGrantRepository {
    pub fn new(res: &Resources) -> Self {
        Self {
            storage: res.storage.clone(),
            cache: EntityCache::new(res.cache.clone(), ROLE_PERMISSION),
        }
    }

    fn role_key(&self, role_id: i64) -> String {
        self.cache.alt_key(ROLE, &role_id.to_string())
    }

    pub async fn for_role(&self, role_id: i64) -> StoreResult<Vec<RoleGrant>> {
        let key = self.role_key(role_id);
        if let Some(grants) = self.cache.get(&key).await {
            return Ok(grants);
        }
        let grants = self.storage.grants_for_role(role_id).await?;
        self.cache.set(&key, &grants).await;
        Ok(grants)
    }

    pub async fn create(&self, role_id: i64, permission_id: i64) -> StoreResult<RoleGrant> {
        let grant = self.storage.insert_grant(role_id, permission_id).await?;
        self.cache.invalidate(&[self.role_key(role_id)]).await;
        self.cache.invalidate_all_lists().await;
        Ok(grant)
    }

    pub async fn delete(&self, id: i64) -> StoreResult<RoleGrant> {
        let grant = self.storage.delete_grant(id).await?;
        self.cache.invalidate(&[self.role_key(grant.role_id)]).await;
        self.cache.invalidate_all_lists().await;
        Ok(grant)
    }
}

/// User-to-role links, cached per user.
#[derive(Clone)]
pub struct RoleAssignmentRepository {
    storage: Arc<dyn Storage>,
    cache: EntityCache<Vec<RoleAssignment>>,
}

impl RoleAssignmentRepository {
    pub fn new(res: &Resources) -> Self {
        Self {
            storage: res.storage.clone(),
            cache: EntityCache::new(res.cache.clone(), USER_ROLE),
        }
    }

    fn user_key(&self, user_id: i64) -> String {
        self.cache.alt_key("user", &user_id.to_string())
    }

    pub async fn for_user(&self, user_id: i64) -> StoreResult<Vec<RoleAssignment>> {
        let key = self.user_key(user_id);
        if let Some(assignments) = self.cache.get(&key).await {
            return Ok(assignments);
        }
        let assignments = self.storage.assignments_for_user(user_id).await?;
        self.cache.set(&key, &assignments).await;
        Ok(assignments)
    }

    pub async fn create(&self, user_id: i64, role_id: i64) -> StoreResult<RoleAssignment> {
        let assignment = self.storage.insert_assignment(user_id, role_id).await?;
        self.invalidate_user(user_id).await;
        Ok(assignment)
    }

    pub async fn delete(&self, id: i64) -> StoreResult<RoleAssignment> {
        let assignment = self.storage.delete_assignment(id).await?;
        self.invalidate_user(assignment.user_id).await;
        Ok(assignment)
    }

    /// Drop the cached assignments of `user_id`.
    pub async fn invalidate_user(&self, user_id: i64) {
        self.cache.invalidate(&[self.user_key(user_id)]).await;
        self.cache.invalidate_all_lists().await;
    }
}
