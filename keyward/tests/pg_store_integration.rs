//! Integration tests for the PostgreSQL identity store.
//!
//! Requires a database with `migrations/001_initial_schema.sql` applied; run
//! with `cargo test -- --ignored`.

use keyward::IdentityError;
use keyward::db::{
    Database, DatabaseConfig, IdentityStore, NewPhone, NewUser, Pagination, PgIdentityStore,
    SessionRecord, UserViewFilter,
};
use keyward::secrets::Secret;
use uuid::Uuid;

/// Helper to create a test store
async fn setup_store() -> PgIdentityStore {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/keyward_test".to_string());

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.identity_store()
}

/// Unique email so tests can share a database
fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, Uuid::new_v4().simple())
}

/// Unique title so tests can share a database
fn unique_title(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "Requires database setup"]
async fn test_registration_is_one_transaction() {
    let store = setup_store().await;
    let email = unique_email("tx");

    let registered = store
        .create_user(&NewUser {
            email: Some(email.clone()),
            phone: None,
            password_hash: Some("hash".to_string()),
        })
        .await
        .expect("registration should succeed");
    assert!(registered.email.is_some());
    assert!(registered.password.is_some());

    // Taking the same email moves it; the first user keeps existing
    let second = store
        .create_user(&NewUser {
            email: Some(email.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        second.email.unwrap().previous_owner,
        Some(registered.user.id)
    );

    store.delete_user(registered.user.id).await.unwrap();
    store.delete_user(second.user.id).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires database setup"]
async fn test_phone_upsert_reports_previous_owner() {
    let store = setup_store().await;
    let a = store.create_user(&NewUser::default()).await.unwrap().user.id;
    let b = store.create_user(&NewUser::default()).await.unwrap().user.id;
    let digits = Uuid::new_v4().as_u128() % 10_000_000;
    let phone = NewPhone {
        phone: format!("+1555{:07}", digits),
        country_code: 1,
    };

    let first = store.upsert_phone(a, &phone).await.unwrap();
    assert_eq!(first.previous_owner, None);

    let moved = store.upsert_phone(b, &phone).await.unwrap();
    assert_eq!(moved.previous_owner, Some(a));
    assert_eq!(moved.record.user_id, b);

    store.delete_user(a).await.unwrap();
    store.delete_user(b).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires database setup"]
async fn test_latest_password_is_highest_id() {
    let store = setup_store().await;
    let user_id = store.create_user(&NewUser::default()).await.unwrap().user.id;

    let first = store.create_password(user_id, "first").await.unwrap();
    let second = store.create_password(user_id, "second").await.unwrap();
    assert!(second.id > first.id);

    let latest = store.latest_password(user_id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);

    store.delete_user(user_id).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires database setup"]
async fn test_role_constraints_map_to_statuses() {
    let store = setup_store().await;
    let title = unique_title("role");
    let role = store.create_role(&title).await.unwrap();

    assert!(matches!(
        store.create_role(&title).await.unwrap_err(),
        IdentityError::RoleAlreadyExist
    ));
    assert!(matches!(
        store.create_user_role(Uuid::new_v4(), role.id).await.unwrap_err(),
        IdentityError::UserNotFound
    ));

    let user_id = store.create_user(&NewUser::default()).await.unwrap().user.id;
    assert!(matches!(
        store.create_user_role(user_id, Uuid::new_v4()).await.unwrap_err(),
        IdentityError::RoleNotFound
    ));

    store.create_user_role(user_id, role.id).await.unwrap();
    assert!(matches!(
        store.create_user_role(user_id, role.id).await.unwrap_err(),
        IdentityError::UserRoleAlreadyExist
    ));

    store.delete_user(user_id).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires database setup"]
async fn test_recompute_is_idempotent() {
    let store = setup_store().await;
    let email = unique_email("view");
    let user_id = store
        .create_user(&NewUser {
            email: Some(email.clone()),
            ..Default::default()
        })
        .await
        .unwrap()
        .user
        .id;

    let first = store.recompute_user_views(&[user_id]).await.unwrap();
    assert_eq!(first.views[0].emails, vec![email.clone()]);

    let second = store.recompute_user_views(&[user_id]).await.unwrap();
    assert!(second.written.is_empty());
    assert_eq!(second.views, first.views);

    let (views, info) = store
        .get_user_views(
            &UserViewFilter {
                email: Some(email),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(info.total, 1);

    store.delete_user(user_id).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires database setup"]
async fn test_secrets_are_durable() {
    let store = setup_store().await;
    let secret = Secret::generate();

    store.insert_secret(&secret).await.unwrap();
    let fetched = store.get_secret(secret.id).await.unwrap().unwrap();
    assert_eq!(fetched.key, secret.key);
    assert!(store.get_secret(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "Requires database setup"]
async fn test_concurrent_rotations_succeed_once() {
    let store = setup_store().await;
    let user = store.create_user(&NewUser::default()).await.unwrap().user;
    let secret = Secret::generate();
    store.insert_secret(&secret).await.unwrap();

    let now = chrono::Utc::now();
    let record = || SessionRecord {
        id: Uuid::new_v4(),
        refresh_token: Uuid::new_v4().to_string(),
        fingerprint: "fp".to_string(),
        user_id: user.id,
        secret_id: secret.id,
        user_agent: "test".to_string(),
        created_at: now,
        expires_at: now + chrono::Duration::days(1),
    };
    let old = record();
    store.create_session(&old).await.unwrap();

    let (first, second) = (record(), record());
    let (a, b) = tokio::join!(
        store.rotate_session(old.id, &first),
        store.rotate_session(old.id, &second),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

    // the losing rotation wrote nothing
    let mut live = 0;
    for candidate in [&first, &second] {
        if store
            .find_session(user.id, &candidate.refresh_token, "fp", now)
            .await
            .unwrap()
            .is_some()
        {
            live += 1;
        }
    }
    assert_eq!(live, 1);
    assert!(
        store
            .find_session(user.id, &old.refresh_token, "fp", now)
            .await
            .unwrap()
            .is_none()
    );

    store.delete_user(user.id).await.unwrap();
}
