//! Single-slot, per-user refresh token persistence.
//!
//! Only the SHA-256 digest of the most recently issued refresh token is
//! kept, under `warden:refresh:{user_id}`. Saving overwrites, so issuing a
//! new token instantly retires the previous one.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::cache::CacheStore;
use crate::error::{ServiceError, ServiceResult};

const SOURCE: &str = "auth::refresh_store";

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    cache: Option<Arc<dyn CacheStore>>,
}

impl RefreshTokenStore {
    pub fn new(cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self { cache }
    }

    fn key(user_id: i64) -> String {
        format!("warden:refresh:{user_id}")
    }

    /// Unlike entity caches, this store is authoritative, so a missing
    /// backend is an error rather than a miss.
    fn backend(&self) -> ServiceResult<&Arc<dyn CacheStore>> {
        self.cache.as_ref().ok_or_else(|| {
            ServiceError::internal(SOURCE, "refresh token store unavailable").into()
        })
    }

    pub async fn save(&self, user_id: i64, token: &str, ttl: Duration) -> ServiceResult<()> {
        self.backend()?
            .set(&Self::key(user_id), hash_refresh_token(token), ttl)
            .await
            .map_err(|e| ServiceError::internal(SOURCE, e.to_string()).into())
    }

    /// Stored digest, or `NotFound` when absent or expired.
    pub async fn get(&self, user_id: i64) -> ServiceResult<String> {
        self.backend()?
            .get(&Self::key(user_id))
            .await
            .map_err(|e| ServiceError::internal(SOURCE, e.to_string()))?
            .ok_or_else(|| ServiceError::not_found(SOURCE, "Refresh token not found").into())
    }

    pub async fn delete(&self, user_id: i64) -> ServiceResult<()> {
        self.backend()?
            .delete(&[Self::key(user_id)])
            .await
            .map_err(|e| ServiceError::internal(SOURCE, e.to_string()).into())
    }

    /// Whether `token` is the one currently stored for `user_id`.
    pub async fn matches(&self, user_id: i64, token: &str) -> ServiceResult<bool> {
        let stored = self.get(user_id).await?;
        Ok(stored == hash_refresh_token(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::error::ErrorKind;

    fn store() -> RefreshTokenStore {
        RefreshTokenStore::new(Some(Arc::new(MemoryCacheStore::new())))
    }

    #[test]
    fn digest_is_hex_sha256() {
        let h = hash_refresh_token("abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn save_overwrites_previous_token() {
        let s = store();
        let ttl = Duration::from_secs(60);
        s.save(1, "t1", ttl).await.unwrap();
        assert!(s.matches(1, "t1").await.unwrap());

        s.save(1, "t2", ttl).await.unwrap();
        assert!(!s.matches(1, "t1").await.unwrap());
        assert!(s.matches(1, "t2").await.unwrap());
        assert_eq!(s.get(1).await.unwrap(), hash_refresh_token("t2"));
    }

    #[tokio::test]
    async fn missing_expired_and_deleted_records_are_not_found() {
        let s = store();
        assert_eq!(s.get(1).await.unwrap_err().kind(), ErrorKind::NotFound);

        s.save(1, "t", Duration::ZERO).await.unwrap();
        assert_eq!(s.get(1).await.unwrap_err().kind(), ErrorKind::NotFound);

        s.save(1, "t", Duration::from_secs(60)).await.unwrap();
        s.delete(1).await.unwrap();
        assert_eq!(s.get(1).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn absent_backend_is_internal() {
        let s = RefreshTokenStore::new(None);
        let err = s.save(1, "t", Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
