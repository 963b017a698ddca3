/// Refresh token management
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Rotated on every use: the presented token is revoked and linked to
///   its replacement in one conditional update
/// - Reuse-detected: presenting a rotated-out token revokes the whole
///   chain it belongs to and reports `Reused`
///
/// Two requests racing to rotate the same token are resolved by the
/// store's compare-and-set: the first successful mark-as-revoked wins,
/// the loser observes the token already revoked and is classified
/// `Reused`, which forces a full re-login.

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::store::{RefreshTokenRecord, TokenStore};

/// Outcome of a rotation attempt.
#[derive(Debug)]
pub enum RotateOutcome {
    /// The presented token was current; `token` is its replacement.
    Rotated { token: String, user_id: Uuid },
    /// The presented token had already been rotated out; the chain is
    /// revoked and the caller must force re-login.
    Reused { user_id: Uuid },
    Expired,
    Unknown,
}

/// Generate a new cryptographically secure refresh token
///
/// 64 alphanumeric characters, well above 256 bits of entropy. The
/// plaintext goes to the client; the server stores only its hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_record(user_id: Uuid, token: &str, expiry_seconds: i64) -> RefreshTokenRecord {
    let now = Utc::now();
    RefreshTokenRecord {
        id: Uuid::new_v4(),
        user_id,
        token_hash: hash_token(token),
        issued_at: now,
        expires_at: now + Duration::seconds(expiry_seconds),
        revoked: false,
        replaced_by: None,
    }
}

/// Issue a fresh refresh token for a user (login path).
///
/// Returns the plaintext token to hand to the client.
pub async fn issue_refresh_token(
    store: &dyn TokenStore,
    user_id: Uuid,
    expiry_seconds: i64,
) -> Result<String, AppError> {
    let token = generate_refresh_token();
    store
        .insert_refresh_token(new_record(user_id, &token, expiry_seconds))
        .await?;
    Ok(token)
}

/// Rotate a presented refresh token.
///
/// The compare-and-set in the store is the only authority on who wins;
/// the lookups around it merely classify the failure.
pub async fn rotate_refresh_token(
    store: &dyn TokenStore,
    presented: &str,
    expiry_seconds: i64,
) -> Result<RotateOutcome, AppError> {
    let presented_hash = hash_token(presented);

    let existing = match store.find_refresh_token(&presented_hash).await? {
        Some(record) => record,
        None => {
            tracing::warn!("Presented refresh token not found in store");
            return Ok(RotateOutcome::Unknown);
        }
    };

    if let Some(outcome) = classify_ineligible(store, &existing).await? {
        return Ok(outcome);
    }

    let replacement = generate_refresh_token();
    let rotated = store
        .rotate_refresh_token(
            &presented_hash,
            new_record(existing.user_id, &replacement, expiry_seconds),
            Utc::now(),
        )
        .await?;

    if rotated {
        return Ok(RotateOutcome::Rotated {
            token: replacement,
            user_id: existing.user_id,
        });
    }

    // Lost the race: re-read and classify what beat us. A concurrent
    // winner leaves the record revoked with its replaced-by link set,
    // which is exactly the reuse shape.
    match store.find_refresh_token(&presented_hash).await? {
        Some(record) => match classify_ineligible(store, &record).await? {
            Some(outcome) => Ok(outcome),
            None => Ok(RotateOutcome::Reused {
                user_id: record.user_id,
            }),
        },
        None => Ok(RotateOutcome::Unknown),
    }
}

/// Map a record that cannot be rotated to its outcome; `None` means the
/// record still looks eligible.
async fn classify_ineligible(
    store: &dyn TokenStore,
    record: &RefreshTokenRecord,
) -> Result<Option<RotateOutcome>, AppError> {
    if record.revoked {
        return if record.replaced_by.is_some() {
            // Reuse of a superseded token: treat as theft and kill the
            // chain, active tip included. This holds even when the
            // presented token is also past its expiry.
            let touched = store.revoke_chain(record.id).await?;
            tracing::warn!(
                user_id = %record.user_id,
                revoked = touched,
                "Rotated-out refresh token presented again; chain revoked"
            );
            Ok(Some(RotateOutcome::Reused {
                user_id: record.user_id,
            }))
        } else {
            // Revoked by logout or administrative action; nothing to chase.
            tracing::info!(user_id = %record.user_id, "Revoked refresh token presented");
            Ok(Some(RotateOutcome::Unknown))
        };
    }

    if record.expires_at <= Utc::now() {
        tracing::info!(user_id = %record.user_id, "Refresh token expired");
        return Ok(Some(RotateOutcome::Expired));
    }

    Ok(None)
}

/// Revoke a single refresh token (logout path). Idempotent.
pub async fn revoke_refresh_token(store: &dyn TokenStore, presented: &str) -> Result<(), AppError> {
    store.revoke_refresh_token(&hash_token(presented)).await?;
    Ok(())
}

/// Find the owning user of a presented token, if any.
pub async fn find_token_owner(
    store: &dyn TokenStore,
    presented: &str,
) -> Result<Option<Uuid>, AppError> {
    Ok(store
        .find_refresh_token(&hash_token(presented))
        .await?
        .map(|record| record.user_id))
}

/// Revoke all refresh tokens for a user
///
/// Used for logout-everywhere, reuse response, and password reset.
pub async fn revoke_all_user_tokens(
    store: &dyn TokenStore,
    user_id: Uuid,
) -> Result<(), AppError> {
    let touched = store.revoke_all_for_user(user_id).await?;
    tracing::info!(user_id = %user_id, revoked = touched, "All refresh tokens revoked for user");
    Ok(())
}
