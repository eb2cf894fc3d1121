//! End-to-end flows over the in-memory backends.

use std::sync::Arc;

use warden_core::auth::{AuthRejection, AuthService, AuthSettings, TokenService, authorize};
use warden_core::cache::CacheStore;
use warden_core::cache::memory::MemoryCacheStore;
use warden_core::error::ErrorKind;
use warden_core::rbac::seed_default_rbac;
use warden_core::repo::{Repositories, Resources};
use warden_core::store::memory::MemoryStorage;

struct Harness {
    storage: MemoryStorage,
    cache: Arc<MemoryCacheStore>,
    repos: Repositories,
    auth: AuthService,
}

fn key(name: &str) -> String {
    std::fs::read_to_string(format!(
        "{}/tests/fixtures/keys/{name}.pem",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap()
}

async fn harness() -> Harness {
    let storage = MemoryStorage::new();
    let cache = Arc::new(MemoryCacheStore::new());
    let res = Resources::new(Arc::new(storage.clone()), Some(cache.clone()));
    let repos = Repositories::new(&res);
    seed_default_rbac(&repos).await.unwrap();
    let tokens = Arc::new(TokenService::from_pem(&key("p256")).unwrap());
    let auth = AuthService::new(
        &res,
        tokens,
        AuthSettings {
            bcrypt_cost: 4,
            ..AuthSettings::default()
        },
    );
    Harness {
        storage,
        cache,
        repos,
        auth,
    }
}

#[tokio::test]
async fn login_issues_pair_for_the_identity_and_persists_refresh_token() {
    let h = harness().await;
    let user = h.auth.register("bob", "bob@x.com", "pw123456").await.unwrap();

    let pair = h.auth.login("bob@x.com", "pw123456", "api.example.com").await.unwrap();
    let claims = h.auth.tokens().verify(&pair.access_token).unwrap();
    assert_eq!(claims.user_id(), Some(user.id));
    assert_eq!(claims.iss, "api.example.com");

    let stored = h
        .cache
        .keys(&format!("warden:refresh:{}", user.id))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized_and_leave_refresh_token_alone() {
    let h = harness().await;
    h.auth.register("bob", "bob@x.com", "pw123456").await.unwrap();
    let pair = h.auth.login("bob@x.com", "pw123456", "localhost").await.unwrap();

    let wrong = h.auth.login("bob@x.com", "nope", "localhost").await.unwrap_err();
    assert_eq!(wrong.kind(), ErrorKind::Unauthorized);
    let unknown = h.auth.login("who@x.com", "pw123456", "localhost").await.unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::Unauthorized);
    assert_eq!(wrong.primary().message, unknown.primary().message);

    // The refresh token issued before the failed attempts still works.
    h.auth.refresh(&pair.refresh_token).await.unwrap();
}

#[tokio::test]
async fn refresh_rotation_rejects_the_previous_token() {
    let h = harness().await;
    h.auth.register("bob", "bob@x.com", "pw123456").await.unwrap();
    let t1 = h.auth.login("bob@x.com", "pw123456", "localhost").await.unwrap();

    let t2 = h.auth.refresh(&t1.refresh_token).await.unwrap();
    assert_ne!(t1.refresh_token, t2.refresh_token);

    let reused = h.auth.refresh(&t1.refresh_token).await.unwrap_err();
    assert_eq!(reused.kind(), ErrorKind::Unauthorized);

    h.auth.refresh(&t2.refresh_token).await.unwrap();
}

#[tokio::test]
async fn failed_default_role_lookup_leaves_no_identity() {
    let h = harness().await;
    h.storage.inject_fault("role_by_name", None);

    let errs = h.auth.register("carol", "carol@x.com", "pw123456").await.unwrap_err();
    assert_eq!(errs.kind(), ErrorKind::Internal);

    h.storage.clear_faults();
    let missing = h.auth.get_user_by_email("carol@x.com").await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn malformed_email_lookup_never_reaches_storage() {
    let h = harness().await;
    h.storage.inject_fault("credentials_by_email", None);

    let errs = h.auth.get_user_by_email("carol.at.x.com").await.unwrap_err();
    assert_eq!(errs.kind(), ErrorKind::BadRequest);

    let errs = h.auth.get_user_by_email("carol@x.com").await.unwrap_err();
    assert_eq!(errs.kind(), ErrorKind::Internal);
    assert_eq!(errs.len(), 2);
}

#[tokio::test]
async fn missing_default_role_is_not_found_and_rolls_back() {
    let h = harness().await;
    let role = h.repos.roles.get_by_name("user").await.unwrap();
    h.repos.roles.delete(role.id).await.unwrap();

    let errs = h.auth.register("carol", "carol@x.com", "pw123456").await.unwrap_err();
    assert_eq!(errs.kind(), ErrorKind::NotFound);
    assert_eq!(errs.primary().message, "Default role not found");
    assert!(
        h.repos
            .users
            .get_by_email("carol@x.com")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn registered_user_lists_are_fresh() {
    let h = harness().await;
    let q = Default::default();
    assert_eq!(h.repos.users.list(&q).await.unwrap().total, 0);

    h.auth.register("alice", "a@x.com", "secret123").await.unwrap();
    assert_eq!(h.repos.users.list(&q).await.unwrap().total, 1);
}

#[tokio::test]
async fn alice_gets_default_grants_and_is_forbidden_from_role_create() {
    let h = harness().await;
    h.auth.register("alice", "a@x.com", "secret123").await.unwrap();

    let pair = h.auth.login("a@x.com", "secret123", "localhost").await.unwrap();
    let claims = h.auth.tokens().verify(&pair.access_token).unwrap();
    assert_eq!(claims.roles, vec!["user"]);
    assert!(claims.permissions.contains(&"user:read".to_string()));
    assert!(claims.permissions.contains(&"user:me".to_string()));
    assert!(!claims.permissions.contains(&"user:delete".to_string()));

    let header = format!("Bearer {}", pair.access_token);
    let rejection = authorize(h.auth.tokens(), Some(&header), &["role:create"]).unwrap_err();
    assert!(matches!(rejection, AuthRejection::Forbidden));

    let ctx = authorize(h.auth.tokens(), Some(&header), &["user:me"]).unwrap();
    assert_eq!(claims.user_id(), Some(ctx.user_id));
}

#[tokio::test]
async fn login_survives_cache_loss() {
    let h = harness().await;
    h.auth.register("alice", "a@x.com", "secret123").await.unwrap();
    h.cache.delete_pattern("warden:*").await.unwrap();
    h.auth.login("a@x.com", "secret123", "localhost").await.unwrap();
}
