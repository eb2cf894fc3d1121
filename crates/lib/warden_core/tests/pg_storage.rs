//! PostgreSQL backend tests. Need a scratch database:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost:5432/warden_test cargo test -p warden_core -- --ignored
//! ```

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use warden_core::models::auth::NewUser;
use warden_core::rbac::seed_default_rbac;
use warden_core::repo::{Repositories, Resources};
use warden_core::store::postgres::PgStorage;
use warden_core::store::{RoleAssignmentStore, TransactionalStore, UserStore};

async fn storage() -> PgStorage {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .unwrap();
    warden_core::migrate::migrate(&pool).await.unwrap();
    sqlx::query("TRUNCATE users, roles, permissions, role_permissions, user_roles RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .unwrap();
    PgStorage::new(pool)
}

fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.into(),
        email: format!("{name}@example.com"),
        password_hash: "h".into(),
    }
}

#[tokio::test]
#[ignore]
async fn unique_violations_are_conflicts() {
    let pg = storage().await;
    pg.insert_user(&new_user("alice")).await.unwrap();
    let err = pg.insert_user(&new_user("alice")).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
#[ignore]
async fn dropped_transaction_rolls_back() {
    let pg = storage().await;
    {
        let mut tx = pg.begin().await.unwrap();
        tx.insert_user(&new_user("alice")).await.unwrap();
    }
    assert!(
        pg.credentials_by_email("alice@example.com")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
#[ignore]
async fn seeded_user_role_can_be_assigned_in_a_transaction() {
    let pg = storage().await;
    let repos = Repositories::new(&Resources::new(Arc::new(pg.clone()), None));
    seed_default_rbac(&repos).await.unwrap();

    let mut tx = pg.begin().await.unwrap();
    let user = tx.insert_user(&new_user("alice")).await.unwrap();
    let role = tx.role_by_name("user").await.unwrap();
    tx.insert_assignment(user.id, role.id).await.unwrap();
    tx.commit().await.unwrap();

    let assignments = pg.assignments_for_user(user.id).await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].role_id, role.id);
}
