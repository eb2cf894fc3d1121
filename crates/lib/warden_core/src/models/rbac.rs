//! Role, permission and link models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A permission identified by its `(group, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub group: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Canonical `group:name` string used in tokens and route guards.
    pub fn key(&self) -> String {
        permission_key(&self.group, &self.name)
    }
}

/// Join a permission group and name into the canonical string.
pub fn permission_key(group: &str, name: &str) -> String {
    format!("{group}:{name}")
}

/// Insert payload for a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermission {
    pub group: String,
    pub name: String,
}

/// Role ↔ permission link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub id: i64,
    pub role_id: i64,
    pub permission_id: i64,
    pub created_at: DateTime<Utc>,
}

/// User ↔ role link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub created_at: DateTime<Utc>,
}
