//! Optional ledger of issued refresh-token ids, used when rotation is enabled.
//!
//! Without a ledger a refresh token stays valid until it expires. With one,
//! each id can be exchanged once; presenting an already-used id revokes every
//! outstanding id for that user.

use std::ops::DerefMut;

use chrono::{DateTime, Duration, Utc};
use rocket_db_pools::sqlx::{self, PgPool, Row};
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult};

#[rocket::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn record(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Mark `token_id` as used.
    ///
    /// Unknown ids or ids belonging to another user fail with
    /// [`AuthError::TokenInvalid`]; already-used ids fail with
    /// [`AuthError::TokenReuseDetected`].
    async fn consume(&self, token_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> AuthResult<()>;

    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AuthResult<u64>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

#[derive(Debug, Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn record(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token_id, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(token_id)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume(&self, token_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT user_id, expires_at, revoked_at FROM refresh_tokens WHERE token_id = $1 FOR UPDATE",
        )
        .bind(token_id)
        .fetch_optional(tx.deref_mut())
        .await?;

        let row = row.ok_or(AuthError::TokenInvalid)?;
        let owner: Uuid = row.try_get("user_id")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        let revoked_at: Option<DateTime<Utc>> = row.try_get("revoked_at")?;

        if owner != user_id {
            return Err(AuthError::TokenInvalid);
        }
        if revoked_at.is_some() {
            return Err(AuthError::TokenReuseDetected { user_id });
        }
        if expires_at <= now {
            return Err(AuthError::TokenExpired);
        }

        sqlx::query("UPDATE refresh_tokens SET revoked_at = $1 WHERE token_id = $2")
            .bind(now)
            .bind(token_id)
            .execute(tx.deref_mut())
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE user_id = $2 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        // Revoked rows are kept for a while so reuse can still be detected.
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at <= $1 OR (revoked_at IS NOT NULL AND revoked_at <= $2)",
        )
        .bind(now)
        .bind(now - Duration::days(30))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
