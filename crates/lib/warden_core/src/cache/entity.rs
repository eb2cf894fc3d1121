use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::CacheStore;
use crate::models::pagination::{ListQuery, Page};

/// Base TTL for single-entity entries.
pub const ENTITY_TTL: Duration = Duration::from_secs(15 * 60);

/// Base TTL for list entries; shorter because any write drops them.
pub const LIST_TTL: Duration = Duration::from_secs(60);

/// Upper bound (exclusive) of the random jitter added to every TTL.
pub const JITTER_MAX_SECS: u64 = 60;

/// `base` plus a random 0..60 s offset.
pub fn jittered(base: Duration) -> Duration {
    base + Duration::from_secs(rand::rng().random_range(0..JITTER_MAX_SECS))
}

/// Typed cache-aside view over a [`CacheStore`] for one entity type.
///
/// Keys are namespaced as `warden:{entity}:get:{id}` for the primary key,
/// `warden:{entity}:{field}:{value}` for alternate keys and
/// `warden:{entity}:list:{query}` for list pages. Without a store every read
/// misses and every write is a no-op.
pub struct EntityCache<T> {
    store: Option<Arc<dyn CacheStore>>,
    entity: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            entity: self.entity,
            _marker: PhantomData,
        }
    }
}

impl<T> EntityCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Option<Arc<dyn CacheStore>>, entity: &'static str) -> Self {
        Self {
            store,
            entity,
            _marker: PhantomData,
        }
    }

    pub fn id_key(&self, id: i64) -> String {
        format!("warden:{}:get:{id}", self.entity)
    }

    pub fn alt_key(&self, field: &str, value: &str) -> String {
        format!("warden:{}:{field}:{value}", self.entity)
    }

    pub fn list_key(&self, query: &ListQuery) -> String {
        format!("warden:{}:list:{}", self.entity, query.cache_fragment())
    }

    fn list_pattern(&self) -> String {
        format!("warden:{}:list:*", self.entity)
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.read(key).await
    }

    pub async fn set(&self, key: &str, value: &T) {
        self.write(key, value, ENTITY_TTL).await;
    }

    pub async fn get_list(&self, query: &ListQuery) -> Option<Page<T>> {
        self.read(&self.list_key(query)).await
    }

    pub async fn set_list(&self, query: &ListQuery, page: &Page<T>) {
        self.write(&self.list_key(query), page, LIST_TTL).await;
    }

    /// Drop the given keys. Failures are logged only.
    pub async fn invalidate(&self, keys: &[String]) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.delete(keys).await {
            warn!(entity = self.entity, error = %e, "cache invalidation failed");
        }
    }

    /// Drop every entry of this entity type, lists included.
    pub async fn invalidate_all(&self) {
        let Some(store) = &self.store else { return };
        let pattern = format!("warden:{}:*", self.entity);
        if let Err(e) = store.delete_pattern(&pattern).await {
            warn!(entity = self.entity, error = %e, "cache invalidation failed");
        }
    }

    /// Drop every cached list page of this entity type.
    pub async fn invalidate_all_lists(&self) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.delete_pattern(&self.list_pattern()).await {
            warn!(entity = self.entity, error = %e, "cache list invalidation failed");
        }
    }

    async fn read<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let store = self.store.as_ref()?;
        let raw = match store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "cache entry undecodable");
                None
            }
        }
    }

    async fn write<V: Serialize>(&self, key: &str, value: &V, base: Duration) {
        let Some(store) = &self.store else { return };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cache entry unencodable");
                return;
            }
        };
        if let Err(e) = store.set(key, raw, jittered(base)).await {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::cache::{CacheError, CacheResult};
    use crate::models::rbac::Role;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Backend("down".into()))
        }
        async fn set(&self, _: &str, _: String, _: Duration) -> CacheResult<()> {
            Err(CacheError::Backend("down".into()))
        }
        async fn delete(&self, _: &[String]) -> CacheResult<()> {
            Err(CacheError::Backend("down".into()))
        }
        async fn delete_pattern(&self, _: &str) -> CacheResult<()> {
            Err(CacheError::Backend("down".into()))
        }
        async fn keys(&self, _: &str) -> CacheResult<Vec<String>> {
            Err(CacheError::Backend("down".into()))
        }
    }

    fn role(id: i64) -> Role {
        let now = Utc::now();
        Role {
            id,
            name: format!("role{id}"),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let ttl = jittered(LIST_TTL);
            assert!(ttl >= LIST_TTL);
            assert!(ttl < LIST_TTL + Duration::from_secs(JITTER_MAX_SECS));
        }
        assert!(LIST_TTL < ENTITY_TTL);
    }

    #[tokio::test]
    async fn set_then_get_returns_equal_entity() {
        let cache: EntityCache<Role> =
            EntityCache::new(Some(Arc::new(MemoryCacheStore::new())), "role");
        let r = role(7);
        cache.set(&cache.id_key(7), &r).await;
        assert_eq!(cache.get(&cache.id_key(7)).await, Some(r));

        cache.invalidate(&[cache.id_key(7)]).await;
        assert_eq!(cache.get(&cache.id_key(7)).await, None);
    }

    #[tokio::test]
    async fn invalidate_all_lists_keeps_entity_entries() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache: EntityCache<Role> = EntityCache::new(Some(store.clone()), "role");
        let page = Page {
            items: vec![role(1)],
            total: 1,
            page: 1,
            per_page: 20,
        };
        let q1 = ListQuery::default();
        let q2 = ListQuery {
            keyword: Some("adm".into()),
            ..ListQuery::default()
        };
        cache.set_list(&q1, &page).await;
        cache.set_list(&q2, &page).await;
        cache.set(&cache.id_key(1), &role(1)).await;

        cache.invalidate_all_lists().await;
        assert!(cache.get_list(&q1).await.is_none());
        assert!(cache.get_list(&q2).await.is_none());
        assert!(cache.get(&cache.id_key(1)).await.is_some());
    }

    #[tokio::test]
    async fn backend_failures_are_misses() {
        let cache: EntityCache<Role> = EntityCache::new(Some(Arc::new(BrokenStore)), "role");
        cache.set(&cache.id_key(1), &role(1)).await;
        assert!(cache.get(&cache.id_key(1)).await.is_none());
        cache.invalidate(&[cache.id_key(1)]).await;
        cache.invalidate_all_lists().await;
    }

    #[tokio::test]
    async fn nil_store_is_a_permanent_miss() {
        let cache: EntityCache<Role> = EntityCache::new(None, "role");
        cache.set(&cache.id_key(1), &role(1)).await;
        assert!(cache.get(&cache.id_key(1)).await.is_none());
    }
}
