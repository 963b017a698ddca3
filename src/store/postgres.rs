/// Postgres-backed store
///
/// The conditional updates ("... WHERE revoked = false", "... WHERE
/// consumed = false") are what makes rotation and consumption safe under
/// concurrency: the row either matches and is marked in the same
/// statement, or the caller learns it lost the race from the affected
/// row count. No application-level lock is held across a round trip, so
/// the semantics hold across multiple process instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    RefreshTokenRecord, SingleUseTokenRecord, TokenPurpose, TokenStore, UserRecord, UserStore,
};
use crate::error::DatabaseError;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_purpose(raw: &str) -> Result<TokenPurpose, DatabaseError> {
    match raw {
        "password_reset" => Ok(TokenPurpose::PasswordReset),
        "verify_email" => Ok(TokenPurpose::VerifyEmail),
        other => Err(DatabaseError::UnexpectedError(format!(
            "Unknown token purpose in store: {}",
            other
        ))),
    }
}

type UserRow = (
    Uuid,
    String,
    String,
    String,
    bool,
    bool,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn user_from_row(row: UserRow) -> UserRecord {
    let (id, email, nickname, password_hash, is_active, first_login, created_at, last_login_at) =
        row;
    UserRecord {
        id,
        email,
        nickname,
        password_hash,
        is_active,
        first_login,
        created_at,
        last_login_at,
    }
}

const USER_COLUMNS: &str =
    "id, email, nickname, password_hash, is_active, first_login, created_at, last_login_at";

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, user: UserRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, nickname, password_hash, is_active, first_login, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.nickname)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.first_login)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET last_login_at = $1, first_login = false WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TokenStore for PostgresStore {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, issued_at, expires_at, revoked, replaced_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.replaced_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        let row = sqlx::query_as::<
            _,
            (
                Uuid,
                Uuid,
                String,
                DateTime<Utc>,
                DateTime<Utc>,
                bool,
                Option<Uuid>,
            ),
        >(
            r#"
            SELECT id, user_id, token_hash, issued_at, expires_at, revoked, replaced_by
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, user_id, token_hash, issued_at, expires_at, revoked, replaced_by)| {
                RefreshTokenRecord {
                    id,
                    user_id,
                    token_hash,
                    issued_at,
                    expires_at,
                    revoked,
                    replaced_by,
                }
            },
        ))
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        replacement: RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, issued_at, expires_at, revoked, replaced_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(replacement.id)
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .bind(replacement.revoked)
        .bind(replacement.replaced_by)
        .execute(&mut tx)
        .await?;

        // The conditional update decides the winner; losers roll the
        // replacement insert back.
        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, replaced_by = $1
            WHERE token_hash = $2 AND revoked = false AND expires_at > $3
            "#,
        )
        .bind(replacement.id)
        .bind(token_hash)
        .bind(now)
        .execute(&mut tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn revoke_chain(&self, start: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE chain AS (
                SELECT id, replaced_by FROM refresh_tokens WHERE id = $1
                UNION ALL
                SELECT rt.id, rt.replaced_by
                FROM refresh_tokens rt
                JOIN chain c ON rt.id = c.replaced_by
            )
            UPDATE refresh_tokens
            SET revoked = true
            WHERE id IN (SELECT id FROM chain)
            "#,
        )
        .bind(start)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true WHERE user_id = $1 AND revoked = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_single_use_token(
        &self,
        record: SingleUseTokenRecord,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        // Stale-link guard: older unconsumed links of the same purpose die
        // with the issuance of this one.
        sqlx::query(
            r#"
            UPDATE single_use_tokens
            SET consumed = true
            WHERE user_id = $1 AND purpose = $2 AND consumed = false
            "#,
        )
        .bind(record.user_id)
        .bind(record.purpose.as_str())
        .execute(&mut tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO single_use_tokens (id, user_id, token_hash, purpose, expires_at, consumed)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.purpose.as_str())
        .bind(record.expires_at)
        .bind(record.consumed)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn consume_single_use_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, DatabaseError> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            UPDATE single_use_tokens
            SET consumed = true
            WHERE token_hash = $1 AND purpose = $2 AND consumed = false AND expires_at > $3
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(purpose.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id,)| user_id))
    }

    async fn find_single_use_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SingleUseTokenRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, String, DateTime<Utc>, bool)>(
            r#"
            SELECT id, user_id, token_hash, purpose, expires_at, consumed
            FROM single_use_tokens
            WHERE token_hash = $1 AND purpose = $2
            "#,
        )
        .bind(token_hash)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, user_id, token_hash, raw_purpose, expires_at, consumed)| {
            Ok(SingleUseTokenRecord {
                id,
                user_id,
                token_hash,
                purpose: parse_purpose(&raw_purpose)?,
                expires_at,
                consumed,
            })
        })
        .transpose()
    }
}
