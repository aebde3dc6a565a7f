/// Refresh Token Session Store
///
/// Server-side record of every refresh token issued, used for revocation.
/// - Token values are hashed with SHA-256 before storage (never plaintext)
/// - Revocation flips `revoked`; rows are only deleted by the expiry sweep
/// - `revoke` is a conditional update, so two racing revokers of the same
///   token see exactly one `Revoked` outcome between them
/// - `revoke_all` is a single statement, never a read-then-write loop

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    /// SHA-256 hex digest of the token value
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// A refresh token about to be persisted
pub struct NewRefreshToken {
    pub account_id: Uuid,
    /// Plaintext token; only its digest is stored
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful `revoke`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// This call flipped the record from live to revoked
    Revoked,
    /// The record was already revoked before this call
    AlreadyRevoked,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new record with a fresh id
    async fn save(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, StoreError>;

    /// Exact-match lookup by token value
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Mark one record revoked.
    ///
    /// Revoking an already revoked record is not an error; revoking an unknown
    /// token is `StoreError::NotFound`.
    async fn revoke(&self, token: &str) -> Result<RevokeOutcome, StoreError>;

    /// Revoke every live record of an account, returning how many flipped
    async fn revoke_all(&self, account_id: Uuid) -> Result<u64, StoreError>;

    /// Delete records with `expires_at < now`, returning how many went
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// PostgreSQL session store
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn save(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            INSERT INTO refresh_tokens (id, account_id, token_hash, expires_at, created_at, revoked)
            VALUES ($1, $2, $3, $4, $5, false)
            RETURNING id, account_id, token_hash, expires_at, created_at, revoked
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(token.account_id)
        .bind(hash_token(&token.token))
        .bind(token.expires_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, account_id, token_hash, expires_at, created_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn revoke(&self, token: &str) -> Result<RevokeOutcome, StoreError> {
        let token_hash = hash_token(token);

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE token_hash = $2 AND revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(&token_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(RevokeOutcome::Revoked);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT revoked FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await?;

        match exists {
            Some(_) => Ok(RevokeOutcome::AlreadyRevoked),
            None => Err(StoreError::NotFound("refresh token".to_string())),
        }
    }

    async fn revoke_all(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE account_id = $2 AND revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// In-process session store keyed by token digest
#[derive(Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, StoreError> {
        let token_hash = hash_token(&token.token);
        let mut records = self.records.lock().await;

        if records.contains_key(&token_hash) {
            return Err(StoreError::UniqueViolation("token_hash".to_string()));
        }

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            account_id: token.account_id,
            token_hash: token_hash.clone(),
            expires_at: token.expires_at,
            created_at: Utc::now(),
            revoked: false,
        };
        records.insert(token_hash, record.clone());

        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.records.lock().await.get(&hash_token(token)).cloned())
    }

    async fn revoke(&self, token: &str) -> Result<RevokeOutcome, StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&hash_token(token))
            .ok_or_else(|| StoreError::NotFound("refresh token".to_string()))?;

        if record.revoked {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        record.revoked = true;
        Ok(RevokeOutcome::Revoked)
    }

    async fn revoke_all(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let mut records = self.records.lock().await;
        let mut revoked = 0;
        for record in records
            .values_mut()
            .filter(|r| r.account_id == account_id && !r.revoked)
        {
            record.revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }
}

/// Periodically delete expired refresh tokens.
///
/// Purely space reclamation: expired rows are rejected on read whether or not
/// the sweep has reached them yet.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.sweep_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!(removed = removed, "Swept expired refresh tokens");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Refresh token sweep failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn new_token(account_id: Uuid, token: &str, ttl_seconds: i64) -> NewRefreshToken {
        NewRefreshToken {
            account_id,
            token: token.to_string(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl_seconds),
        }
    }

    #[test]
    fn test_token_hashing() {
        let hash1 = hash_token("some.refresh.token");
        let hash2 = hash_token("some.refresh.token");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, "some.refresh.token");
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, hash_token("other.refresh.token"));
    }

    #[tokio::test]
    async fn save_then_find_by_token() {
        let store = InMemorySessionStore::new();
        let account_id = Uuid::new_v4();
        let saved = store.save(new_token(account_id, "token-a", 60)).await.unwrap();

        let found = store.find_by_token("token-a").await.unwrap().unwrap();
        assert_eq!(found, saved);
        assert_eq!(found.account_id, account_id);
        assert!(!found.revoked);
        assert_ne!(found.token_hash, "token-a");

        assert_eq!(store.find_by_token("token-b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn revoke_is_idempotent_for_known_tokens() {
        let store = InMemorySessionStore::new();
        store.save(new_token(Uuid::new_v4(), "token-a", 60)).await.unwrap();

        assert_eq!(store.revoke("token-a").await, Ok(RevokeOutcome::Revoked));
        assert_eq!(store.revoke("token-a").await, Ok(RevokeOutcome::AlreadyRevoked));
        assert!(store.find_by_token("token-a").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn revoke_of_unknown_token_is_not_found() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store.revoke("never-issued").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_revokes_have_one_winner() {
        let store = Arc::new(InMemorySessionStore::new());
        store.save(new_token(Uuid::new_v4(), "token-a", 60)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.revoke("token-a").await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() == Ok(RevokeOutcome::Revoked) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn revoke_all_only_touches_one_account() {
        let store = InMemorySessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.save(new_token(alice, "alice-phone", 60)).await.unwrap();
        store.save(new_token(alice, "alice-laptop", 60)).await.unwrap();
        store.save(new_token(alice, "alice-old", 60)).await.unwrap();
        store.save(new_token(bob, "bob-phone", 60)).await.unwrap();
        store.revoke("alice-old").await.unwrap();

        assert_eq!(store.revoke_all(alice).await, Ok(2));
        assert!(store.find_by_token("alice-phone").await.unwrap().unwrap().revoked);
        assert!(store.find_by_token("alice-laptop").await.unwrap().unwrap().revoked);
        assert!(!store.find_by_token("bob-phone").await.unwrap().unwrap().revoked);
        assert_eq!(store.revoke_all(alice).await, Ok(0));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let store = InMemorySessionStore::new();
        let account_id = Uuid::new_v4();
        store.save(new_token(account_id, "stale", -10)).await.unwrap();
        store.save(new_token(account_id, "fresh", 3600)).await.unwrap();

        assert_eq!(store.sweep_expired(Utc::now()).await, Ok(1));
        assert_eq!(store.find_by_token("stale").await.unwrap(), None);
        assert!(store.find_by_token("fresh").await.unwrap().is_some());
        assert_eq!(store.sweep_expired(Utc::now()).await, Ok(0));
    }

    #[tokio::test]
    async fn sweeper_task_reclaims_expired_rows() {
        let store = Arc::new(InMemorySessionStore::new());
        store.save(new_token(Uuid::new_v4(), "stale", -10)).await.unwrap();

        let handle = spawn_sweeper(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(store.find_by_token("stale").await.unwrap(), None);
    }
}
