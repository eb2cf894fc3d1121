//! Password hashing via bcrypt.
//!
//! bcrypt is deliberately slow, so both operations run on the blocking pool.

use crate::error::{ServiceError, ServiceResult};

/// bcrypt cost factor.
pub const DEFAULT_COST: u32 = 10;

const SOURCE: &str = "auth::password";

/// Hash a password with bcrypt at `cost`.
pub async fn hash_password(password: &str, cost: u32) -> ServiceResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ServiceError::internal(SOURCE, format!("bcrypt task: {e}")))?
        .map_err(|e| ServiceError::internal(SOURCE, format!("bcrypt hash: {e}")).into())
}

/// Verify a password against a bcrypt hash.
pub async fn verify_password(password: &str, hash: &str) -> ServiceResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ServiceError::internal(SOURCE, format!("bcrypt task: {e}")))?
        .map_err(|e| ServiceError::internal(SOURCE, format!("bcrypt verify: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_and_verify() {
        let hash = hash_password("secret123", 4).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("secret123", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_is_internal_error() {
        let err = verify_password("x", "not-a-hash").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
