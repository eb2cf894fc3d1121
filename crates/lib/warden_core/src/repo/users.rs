use std::sync::Arc;

use crate::cache::EntityCache;
use crate::models::auth::{NewUser, User, UserCredentials, UserUpdate};
use crate::models::pagination::{ListQuery, Page};
use crate::models::rbac::RoleAssignment;
use crate::store::{Storage, StoreResult};

use super::Resources;
use super::rbac::USER_ROLE;

#[derive(Clone)]
pub struct UserRepository {
    storage: Arc<dyn Storage>,
    cache: EntityCache<User>,
    assignments: EntityCache<Vec<RoleAssignment>>,
}

impl UserRepository {
    pub fn new(res: &Resources) -> Self {
        Self {
            storage: res.storage.clone(),
            cache: EntityCache::new(res.cache.clone(), "user"),
            assignments: EntityCache::new(res.cache.clone(), USER_ROLE),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<User> {
        let key = self.cache.id_key(id);
        if let Some(user) = self.cache.get(&key).await {
            return Ok(user);
        }
        let user = self.storage.user_by_id(id).await?;
        self.cache.set(&key, &user).await;
        Ok(user)
    }

    pub async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let key = self.cache.alt_key("email", email);
        if let Some(user) = self.cache.get(&key).await {
            return Ok(user);
        }
        let user = self.storage.credentials_by_email(email).await?.user;
        self.cache.set(&key, &user).await;
        Ok(user)
    }

    /// Always read from storage; hashes are never cached.
    pub async fn credentials_by_email(&self, email: &str) -> StoreResult<UserCredentials> {
        self.storage.credentials_by_email(email).await
    }

    pub async fn create(&self, new: &NewUser) -> StoreResult<User> {
        let user = self.storage.insert_user(new).await?;
        self.invalidate(&user).await;
        Ok(user)
    }

    pub async fn update(&self, id: i64, update: &UserUpdate) -> StoreResult<User> {
        let before = self.storage.user_by_id(id).await?;
        let after = self.storage.update_user(id, update).await?;
        self.invalidate(&before).await;
        if after.email != before.email {
            self.cache
                .invalidate(&[self.cache.alt_key("email", &after.email)])
                .await;
        }
        Ok(after)
    }

    pub async fn delete(&self, id: i64) -> StoreResult<User> {
        let user = self.storage.delete_user(id).await?;
        self.invalidate(&user).await;
        self.assignments
            .invalidate(&[self.assignments.alt_key("user", &id.to_string())])
            .await;
        Ok(user)
    }

    pub async fn list(&self, query: &ListQuery) -> StoreResult<Page<User>> {
        if let Some(page) = self.cache.get_list(query).await {
            return Ok(page);
        }
        let page = self.storage.list_users(query).await?;
        self.cache.set_list(query, &page).await;
        Ok(page)
    }

    /// Drop every cache entry that may describe `user`.
    ///
    /// Also called after a committed transaction created `user` outside this
    /// repository.
    pub async fn invalidate(&self, user: &User) {
        self.cache
            .invalidate(&[
                self.cache.id_key(user.id),
                self.cache.alt_key("email", &user.email),
            ])
            .await;
        self.cache.invalidate_all_lists().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::store::UserStore;
    use crate::store::memory::MemoryStorage;

    fn setup() -> (MemoryStorage, UserRepository) {
        let storage = MemoryStorage::new();
        let res = Resources::new(
            Arc::new(storage.clone()),
            Some(Arc::new(MemoryCacheStore::new())),
        );
        (storage, UserRepository::new(&res))
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "h".into(),
        }
    }

    #[tokio::test]
    async fn reads_are_served_from_cache_after_first_hit() {
        let (storage, repo) = setup();
        let user = repo.create(&new_user("alice")).await.unwrap();
        assert_eq!(repo.get_by_id(user.id).await.unwrap(), user);

        storage.inject_fault("user_by_id", Some(user.id));
        assert_eq!(repo.get_by_id(user.id).await.unwrap(), user);
    }

    #[tokio::test]
    async fn update_is_visible_through_id_and_email_keys() {
        let (_, repo) = setup();
        let user = repo.create(&new_user("alice")).await.unwrap();
        repo.get_by_id(user.id).await.unwrap();
        repo.get_by_email("alice@example.com").await.unwrap();

        repo.update(
            user.id,
            &UserUpdate {
                email: Some("alice2@example.com".into()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(
            repo.get_by_id(user.id).await.unwrap().email,
            "alice2@example.com"
        );
        assert!(
            repo.get_by_email("alice@example.com")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn writes_drop_cached_lists() {
        let (_, repo) = setup();
        repo.create(&new_user("alice")).await.unwrap();
        let q = ListQuery::default();
        assert_eq!(repo.list(&q).await.unwrap().total, 1);

        repo.create(&new_user("bob")).await.unwrap();
        assert_eq!(repo.list(&q).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn delete_invalidates_entity() {
        let (storage, repo) = setup();
        let user = repo.create(&new_user("alice")).await.unwrap();
        repo.get_by_id(user.id).await.unwrap();

        repo.delete(user.id).await.unwrap();
        assert!(repo.get_by_id(user.id).await.unwrap_err().is_not_found());
        assert!(storage.user_by_id(user.id).await.is_err());
    }
}
