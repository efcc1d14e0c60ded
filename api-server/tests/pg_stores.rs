use chrono::{Duration, Utc};
use iam_server::auth::{AuthError, PgRefreshTokenStore, RefreshTokenStore};
use iam_server::models::{NewUser, UserChanges};
use iam_server::test_support::{TestDatabase, TestFixtures};
use iam_server::users::{PgUserStore, UserStore};
use uuid::Uuid;

async fn provision(test_name: &str) -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(err) if err.is_unavailable() => {
            eprintln!("skipping {test_name}: {err}");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        password_hash: "$argon2id$placeholder".into(),
    }
}

#[tokio::test]
async fn user_store_round_trips_and_enforces_unique_email() {
    let Some(test_db) = provision("user store test").await else {
        return;
    };
    let store = PgUserStore::new(test_db.pool_clone());

    let user = store.insert(new_user("ada@example.com")).await.expect("insert");
    assert_eq!(
        store.find_by_id(user.id).await.expect("by id").map(|u| u.email),
        Some("ada@example.com".to_string())
    );
    assert_eq!(
        store
            .find_by_email("ada@example.com")
            .await
            .expect("by email")
            .map(|u| u.id),
        Some(user.id)
    );
    assert!(
        store
            .find_by_email("ADA@example.com")
            .await
            .expect("by email")
            .is_none(),
        "email lookups are exact"
    );

    let duplicate = store
        .insert(new_user("ada@example.com"))
        .await
        .expect_err("duplicate email");
    assert!(matches!(duplicate, AuthError::EmailAlreadyRegistered));

    let updated = store
        .update(
            user.id,
            UserChanges {
                last_name: Some("Byron".into()),
                ..Default::default()
            },
        )
        .await
        .expect("update")
        .expect("user exists");
    assert_eq!(updated.first_name, "Ada");
    assert_eq!(updated.last_name, "Byron");
    assert!(updated.updated_at >= user.updated_at);

    assert!(
        store
            .update(Uuid::new_v4(), UserChanges::default())
            .await
            .expect("update")
            .is_none()
    );

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn refresh_store_consumes_once_and_revokes_on_reuse() {
    let Some(test_db) = provision("refresh store test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let user_id = TestFixtures::new(&pool)
        .insert_user("ada@example.com", "Ada", "Lovelace", "hash")
        .await
        .expect("seed user");
    let store = PgRefreshTokenStore::new(pool.clone());
    let now = Utc::now();

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    store
        .record(first, user_id, now + Duration::hours(1))
        .await
        .expect("record first");
    store
        .record(second, user_id, now + Duration::hours(1))
        .await
        .expect("record second");

    store.consume(first, user_id, now).await.expect("first use");
    let reuse = store
        .consume(first, user_id, now)
        .await
        .expect_err("second use");
    assert!(matches!(reuse, AuthError::TokenReuseDetected { .. }));

    assert!(matches!(
        store.consume(Uuid::new_v4(), user_id, now).await,
        Err(AuthError::TokenInvalid)
    ));
    assert!(matches!(
        store.consume(second, Uuid::new_v4(), now).await,
        Err(AuthError::TokenInvalid)
    ));

    let revoked = store
        .revoke_all_for_user(user_id, now)
        .await
        .expect("revoke");
    assert_eq!(revoked, 1);
    assert_eq!(
        TestFixtures::new(&pool)
            .outstanding_refresh_tokens(user_id)
            .await
            .expect("count"),
        0
    );

    let expired = Uuid::new_v4();
    store
        .record(expired, user_id, now - Duration::minutes(1))
        .await
        .expect("record expired");
    assert!(matches!(
        store.consume(expired, user_id, now).await,
        Err(AuthError::TokenExpired)
    ));
    assert!(store.purge_expired(now).await.expect("purge") >= 1);

    test_db.close().await.expect("failed to drop test database");
}
