//! Persistence seam for user records.

use chrono::Utc;
use rocket_db_pools::sqlx::{self, PgPool};
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult};
use crate::models::{NewUser, User, UserChanges};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, password_hash, created_at, updated_at";

#[rocket::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;

    /// Exact, case-sensitive match on the stored email.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Fails with [`AuthError::EmailAlreadyRegistered`] when the email is taken.
    async fn insert(&self, user: NewUser) -> AuthResult<User>;

    /// Returns `None` when no user has `id`.
    async fn update(&self, id: Uuid, changes: UserChanges) -> AuthResult<Option<User>>;
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> AuthResult<User> {
        let now = Utc::now();
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, first_name, last_name, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> AuthResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                password_hash = COALESCE($5, password_hash),
                updated_at = $6
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.password_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)
    }
}

fn map_unique_violation(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().map(|code| code == "23505").unwrap_or(false) => {
            AuthError::EmailAlreadyRegistered
        }
        _ => AuthError::from(err),
    }
}
