/// Single-use token management (password reset / email verification)
///
/// Opaque random values, hashed before storage, purpose-tagged and
/// time-boxed per purpose. Consumption flips the consumed flag in the
/// same conditional update that reads it, so no two callers can both
/// observe success for one value. Issuing a new token invalidates prior
/// unconsumed tokens of the same purpose for the same user, which kills
/// stale links.

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::store::{SingleUseTokenRecord, TokenPurpose, TokenStore};

/// Outcome of a consumption attempt.
///
/// `AlreadyUsed` takes precedence over `Expired`: a value that has been
/// spent reports so regardless of its expiry.
#[derive(Debug)]
pub enum ConsumeOutcome {
    Consumed(Uuid),
    Expired,
    AlreadyUsed,
    Unknown,
}

fn generate_token_value() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issue a single-use token for a user and purpose.
///
/// Prior unconsumed tokens of the same purpose are invalidated in the
/// same store operation. Returns the plaintext value for the link.
pub async fn issue_single_use_token(
    store: &dyn TokenStore,
    user_id: Uuid,
    purpose: TokenPurpose,
    expiry_seconds: i64,
) -> Result<String, AppError> {
    let token = generate_token_value();
    store
        .insert_single_use_token(SingleUseTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(&token),
            purpose,
            expires_at: Utc::now() + Duration::seconds(expiry_seconds),
            consumed: false,
        })
        .await?;

    tracing::info!(user_id = %user_id, purpose = purpose.as_str(), "Single-use token issued");
    Ok(token)
}

/// Consume a presented token value for a purpose.
///
/// The store's compare-and-set decides the winner; the follow-up lookup
/// only classifies why an attempt failed.
pub async fn consume_single_use_token(
    store: &dyn TokenStore,
    presented: &str,
    purpose: TokenPurpose,
) -> Result<ConsumeOutcome, AppError> {
    let presented_hash = hash_token(presented);

    if let Some(user_id) = store
        .consume_single_use_token(&presented_hash, purpose, Utc::now())
        .await?
    {
        tracing::info!(user_id = %user_id, purpose = purpose.as_str(), "Single-use token consumed");
        return Ok(ConsumeOutcome::Consumed(user_id));
    }

    match store
        .find_single_use_token(&presented_hash, purpose)
        .await?
    {
        None => {
            tracing::warn!(purpose = purpose.as_str(), "Unknown single-use token presented");
            Ok(ConsumeOutcome::Unknown)
        }
        Some(record) if record.consumed => {
            tracing::warn!(
                user_id = %record.user_id,
                purpose = purpose.as_str(),
                "Spent single-use token presented again"
            );
            Ok(ConsumeOutcome::AlreadyUsed)
        }
        Some(record) if record.expires_at <= Utc::now() => {
            tracing::info!(user_id = %record.user_id, purpose = purpose.as_str(), "Single-use token expired");
            Ok(ConsumeOutcome::Expired)
        }
        // The record looked live on re-read: a concurrent caller spent it
        // between our two store calls.
        Some(_) => Ok(ConsumeOutcome::AlreadyUsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_generated_values_are_opaque_and_distinct() {
        let a = generate_token_value();
        let b = generate_token_value();

        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_consume_succeeds_exactly_once() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let token = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
            .await
            .unwrap();

        let first = consume_single_use_token(&store, &token, TokenPurpose::PasswordReset)
            .await
            .unwrap();
        assert!(matches!(first, ConsumeOutcome::Consumed(id) if id == user_id));

        let second = consume_single_use_token(&store, &token, TokenPurpose::PasswordReset)
            .await
            .unwrap();
        assert!(matches!(second, ConsumeOutcome::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_unknown_value() {
        let store = MemoryStore::new();
        let outcome = consume_single_use_token(&store, "never-issued", TokenPurpose::PasswordReset)
            .await
            .unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Unknown));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let store = MemoryStore::new();
        let token =
            issue_single_use_token(&store, Uuid::new_v4(), TokenPurpose::PasswordReset, -10)
                .await
                .unwrap();

        let outcome = consume_single_use_token(&store, &token, TokenPurpose::PasswordReset)
            .await
            .unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Expired));
    }

    #[tokio::test]
    async fn test_spent_token_reports_already_used_even_after_expiry() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let token = issue_single_use_token(&store, user_id, TokenPurpose::VerifyEmail, 600)
            .await
            .unwrap();

        consume_single_use_token(&store, &token, TokenPurpose::VerifyEmail)
            .await
            .unwrap();

        // Backdate the spent record past its expiry.
        let hash = hash_token(&token);
        let mut record = store
            .find_single_use_token(&hash, TokenPurpose::VerifyEmail)
            .await
            .unwrap()
            .unwrap();
        record.expires_at = Utc::now() - Duration::seconds(10);
        store.insert_single_use_token(record).await.unwrap();

        let outcome = consume_single_use_token(&store, &token, TokenPurpose::VerifyEmail)
            .await
            .unwrap();
        assert!(matches!(outcome, ConsumeOutcome::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_purpose_mismatch_is_unknown() {
        let store = MemoryStore::new();
        let token = issue_single_use_token(&store, Uuid::new_v4(), TokenPurpose::VerifyEmail, 600)
            .await
            .unwrap();

        let outcome = consume_single_use_token(&store, &token, TokenPurpose::PasswordReset)
            .await
            .unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Unknown));
    }

    #[tokio::test]
    async fn test_new_issue_invalidates_prior_link() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let first = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
            .await
            .unwrap();
        let second = issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
            .await
            .unwrap();

        let stale = consume_single_use_token(&store, &first, TokenPurpose::PasswordReset)
            .await
            .unwrap();
        assert!(matches!(stale, ConsumeOutcome::AlreadyUsed));

        let live = consume_single_use_token(&store, &second, TokenPurpose::PasswordReset)
            .await
            .unwrap();
        assert!(matches!(live, ConsumeOutcome::Consumed(id) if id == user_id));
    }

    #[tokio::test]
    async fn test_purposes_do_not_supersede_each_other() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let verify = issue_single_use_token(&store, user_id, TokenPurpose::VerifyEmail, 600)
            .await
            .unwrap();
        // A reset issuance must not kill the verification link.
        issue_single_use_token(&store, user_id, TokenPurpose::PasswordReset, 600)
            .await
            .unwrap();

        let outcome = consume_single_use_token(&store, &verify, TokenPurpose::VerifyEmail)
            .await
            .unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Consumed(id) if id == user_id));
    }
}
