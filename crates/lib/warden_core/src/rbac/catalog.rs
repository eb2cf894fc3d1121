//! Permission strings known to the HTTP surface.

use crate::models::rbac::NewPermission;

/// Permission groups; each gets the full set of [`ACTIONS`].
pub const GROUPS: [&str; 5] = ["user", "role", "permission", "role_permission", "user_role"];

pub const ACTIONS: [&str; 5] = ["create", "read", "update", "delete", "list"];

pub const USER_CREATE: &str = "user:create";
pub const USER_READ: &str = "user:read";
pub const USER_UPDATE: &str = "user:update";
pub const USER_DELETE: &str = "user:delete";
pub const USER_LIST: &str = "user:list";
/// Read one's own identity.
pub const USER_ME: &str = "user:me";

pub const ROLE_CREATE: &str = "role:create";
pub const ROLE_READ: &str = "role:read";
pub const ROLE_LIST: &str = "role:list";

pub const ROLE_PERMISSION_CREATE: &str = "role_permission:create";
pub const USER_ROLE_CREATE: &str = "user_role:create";

/// Every permission in the catalogue, in seeding order.
pub fn all_permissions() -> Vec<NewPermission> {
    let mut all: Vec<NewPermission> = GROUPS
        .iter()
        .flat_map(|group| {
            ACTIONS.iter().map(move |name| NewPermission {
                group: (*group).to_string(),
                name: (*name).to_string(),
            })
        })
        .collect();
    all.push(NewPermission {
        group: "user".into(),
        name: "me".into(),
    });
    all
}

/// Split `group:name`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':')
        .filter(|(g, n)| !g.is_empty() && !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::permission_key;

    #[test]
    fn catalogue_covers_groups_actions_and_me() {
        let keys: Vec<String> = all_permissions()
            .iter()
            .map(|p| permission_key(&p.group, &p.name))
            .collect();
        assert_eq!(keys.len(), 26);
        for k in [USER_READ, USER_ME, USER_DELETE, ROLE_CREATE, ROLE_PERMISSION_CREATE, USER_ROLE_CREATE] {
            assert!(keys.iter().any(|x| x == k), "{k}");
        }
    }

    #[test]
    fn split_key_requires_both_halves() {
        assert_eq!(split_key("user:me"), Some(("user", "me")));
        assert_eq!(split_key("user:"), None);
        assert_eq!(split_key("nocolon"), None);
    }
}
