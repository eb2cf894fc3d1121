//! System-of-record storage for identities, roles, permissions and links.
//!
//! Each entity family is a small async trait; [`Storage`] bundles them with
//! the ability to open a transaction. Two backends are provided:
//! [`postgres::PgStorage`] and [`memory::MemoryStorage`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{NewUser, User, UserCredentials, UserUpdate};
use crate::models::pagination::{ListQuery, Page};
use crate::models::rbac::{NewPermission, Permission, Role, RoleAssignment, RoleGrant};

/// Repository outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username or email is taken.
    async fn insert_user(&self, new: &NewUser) -> StoreResult<User>;
    async fn user_by_id(&self, id: i64) -> StoreResult<User>;
    async fn credentials_by_email(&self, email: &str) -> StoreResult<UserCredentials>;
    async fn update_user(&self, id: i64, update: &UserUpdate) -> StoreResult<User>;
    /// Deletes the user and its role assignments, returning the removed row.
    async fn delete_user(&self, id: i64) -> StoreResult<User>;
    async fn list_users(&self, query: &ListQuery) -> StoreResult<Page<User>>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn insert_role(&self, name: &str) -> StoreResult<Role>;
    async fn role_by_id(&self, id: i64) -> StoreResult<Role>;
    async fn role_by_name(&self, name: &str) -> StoreResult<Role>;
    async fn rename_role(&self, id: i64, name: &str) -> StoreResult<Role>;
    async fn delete_role(&self, id: i64) -> StoreResult<Role>;
    async fn list_roles(&self, query: &ListQuery) -> StoreResult<Page<Role>>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fails with `Conflict` when the `(group, name)` pair exists.
    async fn insert_permission(&self, new: &NewPermission) -> StoreResult<Permission>;
    async fn permission_by_id(&self, id: i64) -> StoreResult<Permission>;
    async fn permission_by_key(&self, group: &str, name: &str) -> StoreResult<Permission>;
    async fn delete_permission(&self, id: i64) -> StoreResult<Permission>;
}

#[async_trait]
pub trait RoleGrantStore: Send + Sync {
    /// Fails with `Conflict` on a duplicate grant.
    async fn insert_grant(&self, role_id: i64, permission_id: i64) -> StoreResult<RoleGrant>;
    async fn grants_for_role(&self, role_id: i64) -> StoreResult<Vec<RoleGrant>>;
    async fn delete_grant(&self, id: i64) -> StoreResult<RoleGrant>;
}

#[async_trait]
pub trait RoleAssignmentStore: Send + Sync {
    /// Fails with `Conflict` on a duplicate assignment.
    async fn insert_assignment(&self, user_id: i64, role_id: i64) -> StoreResult<RoleAssignment>;
    /// Assignments in insertion order.
    async fn assignments_for_user(&self, user_id: i64) -> StoreResult<Vec<RoleAssignment>>;
    async fn delete_assignment(&self, id: i64) -> StoreResult<RoleAssignment>;
}

/// Operations available on an open transaction.
///
/// Dropping a transaction without calling `commit` discards its writes.
#[async_trait]
pub trait StorageTx: Send {
    async fn insert_user(&mut self, new: &NewUser) -> StoreResult<User>;
    async fn role_by_name(&mut self, name: &str) -> StoreResult<Role>;
    async fn insert_assignment(&mut self, user_id: i64, role_id: i64)
    -> StoreResult<RoleAssignment>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StorageTx>>;

    /// Round trip to the backend without touching any table.
    async fn ping(&self) -> StoreResult<()>;
}

/// A complete storage backend.
pub trait Storage:
    UserStore + RoleStore + PermissionStore + RoleGrantStore + RoleAssignmentStore + TransactionalStore
{
}

impl<T> Storage for T where
    T: UserStore
        + RoleStore
        + PermissionStore
        + RoleGrantStore
        + RoleAssignmentStore
        + TransactionalStore
{
}
