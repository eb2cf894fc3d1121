//! In-process storage backend.
//!
//! Holds every table behind one async mutex. A transaction takes the lock for
//! its whole lifetime and works on a staged copy, so commit is a single swap
//! and rollback is a drop. Used by the test suites and by single-node
//! development setups without PostgreSQL.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{
    PermissionStore, RoleAssignmentStore, RoleGrantStore, RoleStore, StorageTx, StoreError,
    StoreResult, TransactionalStore, UserStore,
};
use crate::models::auth::{NewUser, User, UserCredentials, UserUpdate};
use crate::models::pagination::{ListQuery, Page};
use crate::models::rbac::{NewPermission, Permission, Role, RoleAssignment, RoleGrant};

#[derive(Debug, Clone, Default)]
struct Sequence(i64);

impl Sequence {
    fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    user_seq: Sequence,
    role_seq: Sequence,
    permission_seq: Sequence,
    grant_seq: Sequence,
    assignment_seq: Sequence,
    users: BTreeMap<i64, UserCredentials>,
    roles: BTreeMap<i64, Role>,
    permissions: BTreeMap<i64, Permission>,
    grants: BTreeMap<i64, RoleGrant>,
    assignments: BTreeMap<i64, RoleAssignment>,
}

fn not_found(entity: &str) -> StoreError {
    StoreError::NotFound(format!("{entity} not found"))
}

fn paginate<T: Clone>(rows: Vec<T>, query: &ListQuery) -> Page<T> {
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.limit() as usize)
        .collect();
    Page {
        items,
        total,
        page: query.page.max(1),
        per_page: query.limit(),
    }
}

fn keyword(query: &ListQuery) -> Option<String> {
    query
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase)
}

impl Tables {
    fn insert_user(&mut self, new: &NewUser) -> StoreResult<User> {
        if self.users.values().any(|c| c.user.email == new.email) {
            return Err(StoreError::Conflict(
                "User with this email already exists.".into(),
            ));
        }
        if self.users.values().any(|c| c.user.username == new.username) {
            return Err(StoreError::Conflict(
                "User with this username already exists.".into(),
            ));
        }
        let now = Utc::now();
        let user = User {
            id: self.user_seq.next(),
            username: new.username.clone(),
            email: new.email.clone(),
            created_at: now,
            updated_at: now,
        };
        self.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: new.password_hash.clone(),
            },
        );
        Ok(user)
    }

    fn update_user(&mut self, id: i64, update: &UserUpdate) -> StoreResult<User> {
        if let Some(email) = &update.email
            && self
                .users
                .values()
                .any(|c| c.user.id != id && &c.user.email == email)
        {
            return Err(StoreError::Conflict(
                "User with this email already exists.".into(),
            ));
        }
        if let Some(username) = &update.username
            && self
                .users
                .values()
                .any(|c| c.user.id != id && &c.user.username == username)
        {
            return Err(StoreError::Conflict(
                "User with this username already exists.".into(),
            ));
        }
        let creds = self.users.get_mut(&id).ok_or_else(|| not_found("User"))?;
        if let Some(username) = &update.username {
            creds.user.username = username.clone();
        }
        if let Some(email) = &update.email {
            creds.user.email = email.clone();
        }
        if let Some(hash) = &update.password_hash {
            creds.password_hash = hash.clone();
        }
        creds.user.updated_at = Utc::now();
        Ok(creds.user.clone())
    }

    fn delete_user(&mut self, id: i64) -> StoreResult<User> {
        let creds = self.users.remove(&id).ok_or_else(|| not_found("User"))?;
        self.assignments.retain(|_, a| a.user_id != id);
        Ok(creds.user)
    }

    fn role_by_name(&self, name: &str) -> StoreResult<Role> {
        self.roles
            .values()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| not_found("Role"))
    }

    fn insert_role(&mut self, name: &str) -> StoreResult<Role> {
        if self.roles.values().any(|r| r.name == name) {
            return Err(StoreError::Conflict("Role already exists.".into()));
        }
        let now = Utc::now();
        let role = Role {
            id: self.role_seq.next(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    fn insert_assignment(&mut self, user_id: i64, role_id: i64) -> StoreResult<RoleAssignment> {
        if !self.users.contains_key(&user_id) || !self.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(
                "UserRole references a missing row".into(),
            ));
        }
        if self
            .assignments
            .values()
            .any(|a| a.user_id == user_id && a.role_id == role_id)
        {
            return Err(StoreError::Conflict("UserRole already exists.".into()));
        }
        let assignment = RoleAssignment {
            id: self.assignment_seq.next(),
            user_id,
            role_id,
            created_at: Utc::now(),
        };
        self.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }
}

/// In-memory [`super::Storage`] with optional fault injection.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Arc<Mutex<HashSet<(&'static str, Option<i64>)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail with a storage error, for every id (`None`) or
    /// only when called with `id`.
    pub fn inject_fault(&self, operation: &'static str, id: Option<i64>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert((operation, id));
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    fn check(&self, operation: &'static str, id: Option<i64>) -> StoreResult<()> {
        let faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Storage("fault table poisoned".into()))?;
        if faults.contains(&(operation, None)) || (id.is_some() && faults.contains(&(operation, id)))
        {
            return Err(StoreError::Storage(format!("injected fault in {operation}")));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn insert_user(&self, new: &NewUser) -> StoreResult<User> {
        self.check("insert_user", None)?;
        self.tables.lock().await.insert_user(new)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<User> {
        self.check("user_by_id", Some(id))?;
        let tables = self.tables.lock().await;
        tables
            .users
            .get(&id)
            .map(|c| c.user.clone())
            .ok_or_else(|| not_found("User"))
    }

    async fn credentials_by_email(&self, email: &str) -> StoreResult<UserCredentials> {
        self.check("credentials_by_email", None)?;
        let tables = self.tables.lock().await;
        tables
            .users
            .values()
            .find(|c| c.user.email == email)
            .cloned()
            .ok_or_else(|| not_found("User"))
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> StoreResult<User> {
        self.check("update_user", Some(id))?;
        self.tables.lock().await.update_user(id, update)
    }

    async fn delete_user(&self, id: i64) -> StoreResult<User> {
        self.check("delete_user", Some(id))?;
        self.tables.lock().await.delete_user(id)
    }

    async fn list_users(&self, query: &ListQuery) -> StoreResult<Page<User>> {
        self.check("list_users", None)?;
        let tables = self.tables.lock().await;
        let kw = keyword(query);
        let rows: Vec<User> = tables
            .users
            .values()
            .map(|c| c.user.clone())
            .filter(|u| match &kw {
                Some(k) => u.username.to_lowercase().contains(k) || u.email.to_lowercase().contains(k),
                None => true,
            })
            .collect();
        Ok(paginate(rows, query))
    }
}

#[async_trait]
impl RoleStore for MemoryStorage {
    async fn insert_role(&self, name: &str) -> StoreResult<Role> {
        self.check("insert_role", None)?;
        self.tables.lock().await.insert_role(name)
    }

    async fn role_by_id(&self, id: i64) -> StoreResult<Role> {
        self.check("role_by_id", Some(id))?;
        let tables = self.tables.lock().await;
        tables.roles.get(&id).cloned().ok_or_else(|| not_found("Role"))
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Role> {
        self.check("role_by_name", None)?;
        self.tables.lock().await.role_by_name(name)
    }

    async fn rename_role(&self, id: i64, name: &str) -> StoreResult<Role> {
        self.check("rename_role", Some(id))?;
        let mut tables = self.tables.lock().await;
        if tables.roles.values().any(|r| r.id != id && r.name == name) {
            return Err(StoreError::Conflict("Role already exists.".into()));
        }
        let role = tables.roles.get_mut(&id).ok_or_else(|| not_found("Role"))?;
        role.name = name.to_string();
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: i64) -> StoreResult<Role> {
        self.check("delete_role", Some(id))?;
        let mut tables = self.tables.lock().await;
        let role = tables.roles.remove(&id).ok_or_else(|| not_found("Role"))?;
        tables.grants.retain(|_, g| g.role_id != id);
        tables.assignments.retain(|_, a| a.role_id != id);
        Ok(role)
    }

    async fn list_roles(&self, query: &ListQuery) -> StoreResult<Page<Role>> {
        self.check("list_roles", None)?;
        let tables = self.tables.lock().await;
        let kw = keyword(query);
        let rows: Vec<Role> = tables
            .roles
            .values()
            .filter(|r| kw.as_ref().is_none_or(|k| r.name.to_lowercase().contains(k)))
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }
}

#[async_trait]
impl PermissionStore for MemoryStorage {
    async fn insert_permission(&self, new: &NewPermission) -> StoreResult<Permission> {
        self.check("insert_permission", None)?;
        let mut tables = self.tables.lock().await;
        if tables
            .permissions
            .values()
            .any(|p| p.group == new.group && p.name == new.name)
        {
            return Err(StoreError::Conflict("Permission already exists.".into()));
        }
        let now = Utc::now();
        let permission = Permission {
            id: tables.permission_seq.next(),
            group: new.group.clone(),
            name: new.name.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn permission_by_id(&self, id: i64) -> StoreResult<Permission> {
        self.check("permission_by_id", Some(id))?;
        let tables = self.tables.lock().await;
        tables
            .permissions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Permission"))
    }

    async fn permission_by_key(&self, group: &str, name: &str) -> StoreResult<Permission> {
        self.check("permission_by_key", None)?;
        let tables = self.tables.lock().await;
        tables
            .permissions
            .values()
            .find(|p| p.group == group && p.name == name)
            .cloned()
            .ok_or_else(|| not_found("Permission"))
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<Permission> {
        self.check("delete_permission", Some(id))?;
        let mut tables = self.tables.lock().await;
        let permission = tables
            .permissions
            .remove(&id)
            .ok_or_else(|| not_found("Permission"))?;
        tables.grants.retain(|_, g| g.permission_id != id);
        Ok(permission)
    }
}

#[async_trait]
impl RoleGrantStore for MemoryStorage {
    async fn insert_grant(&self, role_id: i64, permission_id: i64) -> StoreResult<RoleGrant> {
        self.check("insert_grant", None)?;
        let mut tables = self.tables.lock().await;
        if !tables.roles.contains_key(&role_id) || !tables.permissions.contains_key(&permission_id)
        {
            return Err(StoreError::NotFound(
                "RolePermission references a missing row".into(),
            ));
        }
        if tables
            .grants
            .values()
            .any(|g| g.role_id == role_id && g.permission_id == permission_id)
        {
            return Err(StoreError::Conflict("RolePermission already exists.".into()));
        }
        let grant = RoleGrant {
            id: tables.grant_seq.next(),
            role_id,
            permission_id,
            created_at: Utc::now(),
        };
        tables.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn grants_for_role(&self, role_id: i64) -> StoreResult<Vec<RoleGrant>> {
        self.check("grants_for_role", Some(role_id))?;
        let tables = self.tables.lock().await;
        Ok(tables
            .grants
            .values()
            .filter(|g| g.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn delete_grant(&self, id: i64) -> StoreResult<RoleGrant> {
        self.check("delete_grant", Some(id))?;
        let mut tables = self.tables.lock().await;
        tables
            .grants
            .remove(&id)
            .ok_or_else(|| not_found("RolePermission"))
    }
}

#[async_trait]
impl RoleAssignmentStore for MemoryStorage {
    async fn insert_assignment(&self, user_id: i64, role_id: i64) -> StoreResult<RoleAssignment> {
        self.check("insert_assignment", None)?;
        self.tables.lock().await.insert_assignment(user_id, role_id)
    }

    async fn assignments_for_user(&self, user_id: i64) -> StoreResult<Vec<RoleAssignment>> {
        self.check("assignments_for_user", Some(user_id))?;
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_assignment(&self, id: i64) -> StoreResult<RoleAssignment> {
        self.check("delete_assignment", Some(id))?;
        let mut tables = self.tables.lock().await;
        tables
            .assignments
            .remove(&id)
            .ok_or_else(|| not_found("UserRole"))
    }
}

/// Open in-memory transaction: exclusive lock plus a staged copy of the tables.
pub struct MemoryStorageTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    storage: MemoryStorage,
}

#[async_trait]
impl StorageTx for MemoryStorageTx {
    async fn insert_user(&mut self, new: &NewUser) -> StoreResult<User> {
        self.storage.check("insert_user", None)?;
        self.staged.insert_user(new)
    }

    async fn role_by_name(&mut self, name: &str) -> StoreResult<Role> {
        self.storage.check("role_by_name", None)?;
        self.staged.role_by_name(name)
    }

    async fn insert_assignment(
        &mut self,
        user_id: i64,
        role_id: i64,
    ) -> StoreResult<RoleAssignment> {
        self.storage.check("insert_assignment", None)?;
        self.staged.insert_assignment(user_id, role_id)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.storage.check("commit", None)?;
        let MemoryStorageTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for MemoryStorage {
    async fn begin(&self) -> StoreResult<Box<dyn StorageTx>> {
        self.check("begin", None)?;
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryStorageTx {
            guard,
            staged,
            storage: self.clone(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check("ping", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_and_username_conflict() {
        let store = MemoryStorage::new();
        store.insert_user(&new_user("alice")).await.unwrap();

        let err = store.insert_user(&new_user("alice")).await.unwrap_err();
        assert!(err.is_conflict());

        let mut other = new_user("bob");
        other.username = "alice".into();
        let err = store.insert_user(&other).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn duplicate_assignment_and_grant_conflict() {
        let store = MemoryStorage::new();
        let user = store.insert_user(&new_user("alice")).await.unwrap();
        let role = store.insert_role("user").await.unwrap();
        let perm = store
            .insert_permission(&NewPermission {
                group: "user".into(),
                name: "read".into(),
            })
            .await
            .unwrap();

        store.insert_assignment(user.id, role.id).await.unwrap();
        assert!(
            store
                .insert_assignment(user.id, role.id)
                .await
                .unwrap_err()
                .is_conflict()
        );

        store.insert_grant(role.id, perm.id).await.unwrap();
        assert!(
            store
                .insert_grant(role.id, perm.id)
                .await
                .unwrap_err()
                .is_conflict()
        );
    }

    #[tokio::test]
    async fn deleting_user_cascades_assignments() {
        let store = MemoryStorage::new();
        let user = store.insert_user(&new_user("alice")).await.unwrap();
        let role = store.insert_role("user").await.unwrap();
        store.insert_assignment(user.id, role.id).await.unwrap();

        store.delete_user(user.id).await.unwrap();
        assert!(store.assignments_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uncommitted_transaction_leaves_no_trace() {
        let store = MemoryStorage::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_user(&new_user("alice")).await.unwrap();
            tx.rollback().await.unwrap();
        }
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_user(&new_user("bob")).await.unwrap();
            drop(tx);
        }
        assert!(
            store
                .credentials_by_email("alice@example.com")
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            store
                .credentials_by_email("bob@example.com")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStorage::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(&new_user("alice")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.user_by_id(user.id).await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn injected_fault_targets_single_id() {
        let store = MemoryStorage::new();
        let a = store.insert_role("a").await.unwrap();
        let b = store.insert_role("b").await.unwrap();
        store.inject_fault("role_by_id", Some(a.id));

        assert!(store.role_by_id(a.id).await.is_err());
        assert!(store.role_by_id(b.id).await.is_ok());

        store.clear_faults();
        assert!(store.role_by_id(a.id).await.is_ok());
    }

    #[tokio::test]
    async fn list_users_filters_and_pages() {
        let store = MemoryStorage::new();
        for name in ["alice", "alina", "bob"] {
            store.insert_user(&new_user(name)).await.unwrap();
        }
        let page = store
            .list_users(&ListQuery {
                page: 1,
                per_page: 1,
                keyword: Some("ALI".into()),
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].username, "alice");
    }
}
