/// Storage seams for the authentication core
///
/// The core never talks to a database directly; it goes through the
/// `UserStore` and `TokenStore` traits. Two backends are provided:
/// a Postgres implementation for production wiring and an in-memory
/// implementation for tests and development.
///
/// Every mutation here is a single atomic conditional update. The
/// "check not-yet-revoked/not-yet-consumed, then mark" steps are one
/// compare-and-set, never a read followed by a separate write, so two
/// concurrent callers can never both observe a token as valid.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Identity and credential record, owned by the user store.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub password_hash: String,
    pub is_active: bool,
    pub first_login: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// One standing session grant.
///
/// `replaced_by` is a weak back-reference (id only) to the token that
/// superseded this one; a revoked record that carries it marks a link
/// in a rotation chain, which is what reuse detection walks.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub replaced_by: Option<Uuid>,
}

/// Purpose tag for single-use tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
    PasswordReset,
    VerifyEmail,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::VerifyEmail => "verify_email",
        }
    }
}

/// A password-reset or email-verification grant; valid for exactly one
/// successful consumption.
#[derive(Debug, Clone)]
pub struct SingleUseTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// User-record store operations. All are atomic single-record operations.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: UserRecord) -> Result<(), DatabaseError>;

    /// Lookup by email; callers pass the lowercased form.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str)
        -> Result<(), DatabaseError>;

    /// Stamps `last_login_at` and clears the first-login flag.
    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), DatabaseError>;
}

/// Token store operations for refresh and single-use tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), DatabaseError>;

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, DatabaseError>;

    /// Rotation compare-and-set: persist `replacement` and mark the token
    /// identified by `token_hash` revoked with its replaced-by link set,
    /// iff it is still unrevoked and unexpired at `now`.
    ///
    /// Returns `false` when the conditional update matched nothing, in
    /// which case `replacement` is not persisted. With concurrent callers
    /// exactly one receives `true`.
    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        replacement: RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Idempotent single-token revocation.
    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<(), DatabaseError>;

    /// Revokes every token reachable from `start` via replaced-by links,
    /// `start` included. Returns the number of records touched.
    async fn revoke_chain(&self, start: Uuid) -> Result<u64, DatabaseError>;

    /// Idempotent; revokes every active token of the user.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError>;

    /// Persists `record` and, in the same logical operation, invalidates
    /// every prior unconsumed token of the same user and purpose.
    async fn insert_single_use_token(
        &self,
        record: SingleUseTokenRecord,
    ) -> Result<(), DatabaseError>;

    /// Consumption compare-and-set: mark the token consumed iff it is
    /// still unconsumed and unexpired at `now`. Returns the owning user
    /// id on the winning call, `None` otherwise.
    async fn consume_single_use_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, DatabaseError>;

    /// Plain lookup used to classify a failed consumption attempt.
    async fn find_single_use_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SingleUseTokenRecord>, DatabaseError>;
}
