/// In-memory store implementation for development and testing
///
/// Keeps all records behind one `RwLock`; each trait method takes the
/// write guard once, so every conditional update is atomic with respect
/// to concurrent callers, matching the first-writer-wins semantics of
/// the Postgres backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    RefreshTokenRecord, SingleUseTokenRecord, TokenPurpose, TokenStore, UserRecord, UserStore,
};
use crate::error::DatabaseError;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    users_by_email: HashMap<String, Uuid>,
    // keyed by token hash; ids index into hashes for chain walks
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    refresh_hash_by_id: HashMap<Uuid, String>,
    single_use_tokens: HashMap<String, SingleUseTokenRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: UserRecord) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        if inner.users_by_email.contains_key(&user.email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "Email already registered".to_string(),
            ));
        }
        inner.users_by_email.insert(user.email.clone(), user.id);
        inner.users.insert(user.id, user);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users_by_email
            .get(email)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(())
            }
            None => Err(DatabaseError::NotFound("Record not found".to_string())),
        }
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.last_login_at = Some(at);
                user.first_login = false;
                Ok(())
            }
            None => Err(DatabaseError::NotFound("Record not found".to_string())),
        }
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                Ok(())
            }
            None => Err(DatabaseError::NotFound("Record not found".to_string())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        inner
            .refresh_hash_by_id
            .insert(record.id, record.token_hash.clone());
        inner.refresh_tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        let inner = self.inner.read().await;
        Ok(inner.refresh_tokens.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        replacement: RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut inner = self.inner.write().await;

        let eligible = matches!(
            inner.refresh_tokens.get(token_hash),
            Some(existing) if !existing.revoked && existing.expires_at > now
        );
        if !eligible {
            return Ok(false);
        }

        let replacement_id = replacement.id;
        inner
            .refresh_hash_by_id
            .insert(replacement.id, replacement.token_hash.clone());
        inner
            .refresh_tokens
            .insert(replacement.token_hash.clone(), replacement);

        if let Some(existing) = inner.refresh_tokens.get_mut(token_hash) {
            existing.revoked = true;
            existing.replaced_by = Some(replacement_id);
        }

        Ok(true)
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.refresh_tokens.get_mut(token_hash) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn revoke_chain(&self, start: Uuid) -> Result<u64, DatabaseError> {
        let mut inner = self.inner.write().await;
        let mut touched = 0u64;
        let mut cursor = Some(start);

        while let Some(id) = cursor {
            let hash = match inner.refresh_hash_by_id.get(&id) {
                Some(hash) => hash.clone(),
                None => break,
            };
            cursor = match inner.refresh_tokens.get_mut(&hash) {
                Some(record) => {
                    record.revoked = true;
                    touched += 1;
                    record.replaced_by
                }
                None => None,
            };
        }

        Ok(touched)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let mut inner = self.inner.write().await;
        let mut touched = 0u64;
        for record in inner.refresh_tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_single_use_token(
        &self,
        record: SingleUseTokenRecord,
    ) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        // Supersede prior unconsumed tokens of the same purpose for this user.
        for existing in inner.single_use_tokens.values_mut() {
            if existing.user_id == record.user_id
                && existing.purpose == record.purpose
                && !existing.consumed
            {
                existing.consumed = true;
            }
        }
        inner
            .single_use_tokens
            .insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn consume_single_use_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, DatabaseError> {
        let mut inner = self.inner.write().await;
        match inner.single_use_tokens.get_mut(token_hash) {
            Some(record)
                if record.purpose == purpose && !record.consumed && record.expires_at > now =>
            {
                record.consumed = true;
                Ok(Some(record.user_id))
            }
            _ => Ok(None),
        }
    }

    async fn find_single_use_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SingleUseTokenRecord>, DatabaseError> {
        let inner = self.inner.read().await;
        Ok(inner
            .single_use_tokens
            .get(token_hash)
            .filter(|record| record.purpose == purpose)
            .cloned())
    }
}
