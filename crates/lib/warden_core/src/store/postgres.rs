//! PostgreSQL storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use super::{
    PermissionStore, RoleAssignmentStore, RoleGrantStore, RoleStore, StorageTx, StoreError,
    StoreResult, TransactionalStore, UserStore,
};
use crate::models::auth::{NewUser, User, UserCredentials, UserUpdate};
use crate::models::pagination::{ListQuery, Page};
use crate::models::rbac::{NewPermission, Permission, Role, RoleAssignment, RoleGrant};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";
const ROLE_COLUMNS: &str = "id, name, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, perm_group, name, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_credentials(self) -> UserCredentials {
        UserCredentials {
            password_hash: self.password_hash,
            user: User {
                id: self.id,
                username: self.username,
                email: self.email,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        }
    }

    fn into_user(self) -> User {
        self.into_credentials().user
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(r: RoleRow) -> Self {
        Role {
            id: r.id,
            name: r.name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: i64,
    perm_group: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(r: PermissionRow) -> Self {
        Permission {
            id: r.id,
            group: r.perm_group,
            name: r.name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: i64,
    left_id: i64,
    right_id: i64,
    created_at: DateTime<Utc>,
}

/// Map a sqlx error onto the repository taxonomy.
fn classify(err: sqlx::Error, entity: &str) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("{entity} not found")),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let message = match db.constraint() {
                Some("users_email_key") => "User with this email already exists.".to_string(),
                Some("users_username_key") => {
                    "User with this username already exists.".to_string()
                }
                _ => format!("{entity} already exists."),
            };
            StoreError::Conflict(message)
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::NotFound(format!("{entity} references a missing row"))
        }
        _ => StoreError::Db(err),
    }
}

/// `%keyword%` pattern for ILIKE searches, `None` when no keyword is given.
fn like_pattern(query: &ListQuery) -> Option<String> {
    query
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| format!("%{k}%"))
}

async fn insert_user<'e>(exec: impl PgExecutor<'e>, new: &NewUser) -> StoreResult<User> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&new.username)
    .bind(&new.email)
    .bind(&new.password_hash)
    .fetch_one(exec)
    .await
    .map_err(|e| classify(e, "User"))?;
    Ok(row.into_user())
}

async fn role_by_name<'e>(exec: impl PgExecutor<'e>, name: &str) -> StoreResult<Role> {
    sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1"))
        .bind(name)
        .fetch_one(exec)
        .await
        .map(Role::from)
        .map_err(|e| classify(e, "Role"))
}

async fn insert_assignment<'e>(
    exec: impl PgExecutor<'e>,
    user_id: i64,
    role_id: i64,
) -> StoreResult<RoleAssignment> {
    sqlx::query_as::<_, LinkRow>(
        "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) \
         RETURNING id, user_id AS left_id, role_id AS right_id, created_at",
    )
    .bind(user_id)
    .bind(role_id)
    .fetch_one(exec)
    .await
    .map(assignment_from)
    .map_err(|e| classify(e, "UserRole"))
}

/// PostgreSQL-backed [`super::Storage`].
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStorage {
    async fn insert_user(&self, new: &NewUser) -> StoreResult<User> {
        insert_user(&self.pool, new).await
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<User> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map(UserRow::into_user)
            .map_err(|e| classify(e, "User"))
    }

    async fn credentials_by_email(&self, email: &str) -> StoreResult<UserCredentials> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map(UserRow::into_credentials)
        .map_err(|e| classify(e, "User"))
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> StoreResult<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
               username = COALESCE($2, username), \
               email = COALESCE($3, email), \
               password_hash = COALESCE($4, password_hash), \
               updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.username.as_deref())
        .bind(update.email.as_deref())
        .bind(update.password_hash.as_deref())
        .fetch_one(&self.pool)
        .await
        .map(UserRow::into_user)
        .map_err(|e| classify(e, "User"))
    }

    async fn delete_user(&self, id: i64) -> StoreResult<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map(UserRow::into_user)
        .map_err(|e| classify(e, "User"))
    }

    async fn list_users(&self, query: &ListQuery) -> StoreResult<Page<User>> {
        let pattern = like_pattern(query);
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users \
             WHERE $1::text IS NULL OR username ILIKE $1 OR email ILIKE $1",
        )
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE $1::text IS NULL OR username ILIKE $1 OR email ILIKE $1 \
             ORDER BY id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(pattern.as_deref())
        .bind(i64::from(query.limit()))
        .bind(i64::from(query.offset()))
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(UserRow::into_user).collect(),
            total,
            page: query.page.max(1),
            per_page: query.limit(),
        })
    }
}

#[async_trait]
impl RoleStore for PgStorage {
    async fn insert_role(&self, name: &str) -> StoreResult<Role> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "INSERT INTO roles (name) VALUES ($1) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map(Role::from)
        .map_err(|e| classify(e, "Role"))
    }

    async fn role_by_id(&self, id: i64) -> StoreResult<Role> {
        sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map(Role::from)
            .map_err(|e| classify(e, "Role"))
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Role> {
        role_by_name(&self.pool, name).await
    }

    async fn rename_role(&self, id: i64, name: &str) -> StoreResult<Role> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "UPDATE roles SET name = $2, updated_at = now() WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map(Role::from)
        .map_err(|e| classify(e, "Role"))
    }

    async fn delete_role(&self, id: i64) -> StoreResult<Role> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "DELETE FROM roles WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map(Role::from)
        .map_err(|e| classify(e, "Role"))
    }

    async fn list_roles(&self, query: &ListQuery) -> StoreResult<Page<Role>> {
        let pattern = like_pattern(query);
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM roles WHERE $1::text IS NULL OR name ILIKE $1",
        )
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE $1::text IS NULL OR name ILIKE $1 \
             ORDER BY id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(pattern.as_deref())
        .bind(i64::from(query.limit()))
        .bind(i64::from(query.offset()))
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Role::from).collect(),
            total,
            page: query.page.max(1),
            per_page: query.limit(),
        })
    }
}

#[async_trait]
impl PermissionStore for PgStorage {
    async fn insert_permission(&self, new: &NewPermission) -> StoreResult<Permission> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "INSERT INTO permissions (perm_group, name) VALUES ($1, $2) \
             RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(&new.group)
        .bind(&new.name)
        .fetch_one(&self.pool)
        .await
        .map(Permission::from)
        .map_err(|e| classify(e, "Permission"))
    }

    async fn permission_by_id(&self, id: i64) -> StoreResult<Permission> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map(Permission::from)
        .map_err(|e| classify(e, "Permission"))
    }

    async fn permission_by_key(&self, group: &str, name: &str) -> StoreResult<Permission> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE perm_group = $1 AND name = $2"
        ))
        .bind(group)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map(Permission::from)
        .map_err(|e| classify(e, "Permission"))
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<Permission> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "DELETE FROM permissions WHERE id = $1 RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map(Permission::from)
        .map_err(|e| classify(e, "Permission"))
    }
}

fn grant_from(row: LinkRow) -> RoleGrant {
    RoleGrant {
        id: row.id,
        role_id: row.left_id,
        permission_id: row.right_id,
        created_at: row.created_at,
    }
}

fn assignment_from(row: LinkRow) -> RoleAssignment {
    RoleAssignment {
        id: row.id,
        user_id: row.left_id,
        role_id: row.right_id,
        created_at: row.created_at,
    }
}

#[async_trait]
impl RoleGrantStore for PgStorage {
    async fn insert_grant(&self, role_id: i64, permission_id: i64) -> StoreResult<RoleGrant> {
        sqlx::query_as::<_, LinkRow>(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) \
             RETURNING id, role_id AS left_id, permission_id AS right_id, created_at",
        )
        .bind(role_id)
        .bind(permission_id)
        .fetch_one(&self.pool)
        .await
        .map(grant_from)
        .map_err(|e| classify(e, "RolePermission"))
    }

    async fn grants_for_role(&self, role_id: i64) -> StoreResult<Vec<RoleGrant>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            "SELECT id, role_id AS left_id, permission_id AS right_id, created_at \
             FROM role_permissions WHERE role_id = $1 ORDER BY id",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(grant_from).collect())
    }

    async fn delete_grant(&self, id: i64) -> StoreResult<RoleGrant> {
        sqlx::query_as::<_, LinkRow>(
            "DELETE FROM role_permissions WHERE id = $1 \
             RETURNING id, role_id AS left_id, permission_id AS right_id, created_at",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map(grant_from)
        .map_err(|e| classify(e, "RolePermission"))
    }
}

#[async_trait]
impl RoleAssignmentStore for PgStorage {
    async fn insert_assignment(&self, user_id: i64, role_id: i64) -> StoreResult<RoleAssignment> {
        insert_assignment(&self.pool, user_id, role_id).await
    }

    async fn assignments_for_user(&self, user_id: i64) -> StoreResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            "SELECT id, user_id AS left_id, role_id AS right_id, created_at \
             FROM user_roles WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(assignment_from).collect())
    }

    async fn delete_assignment(&self, id: i64) -> StoreResult<RoleAssignment> {
        sqlx::query_as::<_, LinkRow>(
            "DELETE FROM user_roles WHERE id = $1 \
             RETURNING id, user_id AS left_id, role_id AS right_id, created_at",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map(assignment_from)
        .map_err(|e| classify(e, "UserRole"))
    }
}

/// An open PostgreSQL transaction. Dropped without commit → rolled back by sqlx.
pub struct PgStorageTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PgStorageTx {
    async fn insert_user(&mut self, new: &NewUser) -> StoreResult<User> {
        insert_user(&mut *self.tx, new).await
    }

    async fn role_by_name(&mut self, name: &str) -> StoreResult<Role> {
        role_by_name(&mut *self.tx, name).await
    }

    async fn insert_assignment(
        &mut self,
        user_id: i64,
        role_id: i64,
    ) -> StoreResult<RoleAssignment> {
        insert_assignment(&mut *self.tx, user_id, role_id).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for PgStorage {
    async fn begin(&self) -> StoreResult<Box<dyn StorageTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStorageTx { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = classify(sqlx::Error::RowNotFound, "Role");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: Role not found");
    }

    #[test]
    fn other_errors_stay_database_errors() {
        let err = classify(sqlx::Error::PoolTimedOut, "User");
        assert!(matches!(err, StoreError::Db(_)));
    }

    #[test]
    fn blank_keyword_yields_no_pattern() {
        let q = ListQuery {
            keyword: Some("  ".into()),
            ..ListQuery::default()
        };
        assert_eq!(like_pattern(&q), None);
        let q = ListQuery {
            keyword: Some("ali".into()),
            ..ListQuery::default()
        };
        assert_eq!(like_pattern(&q).as_deref(), Some("%ali%"));
    }
}
