//! Session coordinator: the refresh-token lifecycle state machine.
//!
//! Each login roots a lineage of refresh tokens linked by replacement
//! pointers. A lineage moves through
//! `NoSession -> Active -> Rotated -> Active(new) -> ... -> Revoked`:
//! rotation revokes the presented token and extends the chain by one link,
//! logout revokes terminally, and presenting an already-rotated secret is
//! treated as a replay that revokes everything downstream of it.
//!
//! The store's rotate operation is a compare-and-set, so two concurrent
//! refresh calls with the same still-active secret serialize: one rotates,
//! the other observes the token as revoked and takes the replay path. A
//! duplicate network retry and a genuine replay are indistinguishable here;
//! the strict policy forces re-login for both.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Refresh secret prefix, for log recognizability only.
const SECRET_PREFIX: &str = "todo_rt_";
/// Random bytes per refresh secret.
const SECRET_LEN: usize = 64;
/// Bounded retries for transient store failures.
const STORE_RETRY_ATTEMPTS: u32 = 3;
/// Delay between store retries.
const STORE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Generate a fresh high-entropy refresh secret.
pub fn generate_refresh_secret() -> String {
    let random_bytes: [u8; SECRET_LEN] = rand::random();
    format!("{}{}", SECRET_PREFIX, hex::encode(random_bytes))
}

/// Hash a refresh secret using SHA-256. Only the hash is ever persisted.
pub fn hash_refresh_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// One refresh token row as seen by the coordinator.
#[derive(Debug, Clone)]
pub struct StoredRefreshToken {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_hash: Option<String>,
}

/// Result of the store's atomic rotate attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// This caller won the claim; the lineage has been extended.
    Rotated { user_id: Uuid },
    /// No row matches the presented hash.
    NotFound,
    /// The row exists but was already rotated away or logged out.
    Replayed,
    /// The row exists, was never revoked, but its validity window has passed.
    Expired,
}

/// Persistence seam for refresh tokens.
///
/// `rotate` must be atomic per token row: of any number of concurrent calls
/// presenting the same active hash, exactly one may observe `Rotated`, and
/// the replacement row must be visible to other callers once it does.
#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn find_by_hash(&self, token_hash: &str) -> AppResult<Option<StoredRefreshToken>>;

    async fn rotate(
        &self,
        presented_hash: &str,
        replacement_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> AppResult<RotateOutcome>;

    async fn revoke_by_hash(&self, token_hash: &str) -> AppResult<bool>;

    async fn revoke_descendants(&self, start_hash: &str) -> AppResult<u64>;
}

/// A freshly issued refresh credential. The secret is returned to the caller
/// exactly once and exists server-side only as a hash.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct RotatedSession {
    pub user_id: Uuid,
    pub refresh: IssuedRefresh,
}

/// Orchestrates login, refresh, and logout against the refresh token store.
pub struct SessionService {
    store: Arc<dyn RefreshTokenStore>,
    refresh_ttl_secs: u64,
}

impl SessionService {
    pub fn new(store: Arc<dyn RefreshTokenStore>, refresh_ttl_secs: u64) -> Self {
        Self {
            store,
            refresh_ttl_secs,
        }
    }

    fn refresh_expiry(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(self.refresh_ttl_secs as i64)
    }

    /// Root a new session lineage for the given principal.
    pub async fn start_session(&self, user_id: Uuid) -> AppResult<IssuedRefresh> {
        let secret = generate_refresh_secret();
        let token_hash = hash_refresh_secret(&secret);
        let expires_at = self.refresh_expiry();

        with_store_retries(|| self.store.insert(user_id, &token_hash, expires_at)).await?;

        Ok(IssuedRefresh { secret, expires_at })
    }

    /// Rotate the presented refresh secret, single-use.
    ///
    /// Replay of an already-rotated secret revokes its entire downstream
    /// lineage before failing, so a leaked secret cannot keep a stolen
    /// session alive.
    pub async fn rotate(&self, presented_secret: &str) -> AppResult<RotatedSession> {
        let presented_hash = hash_refresh_secret(presented_secret);
        let secret = generate_refresh_secret();
        let replacement_hash = hash_refresh_secret(&secret);
        let expires_at = self.refresh_expiry();

        let outcome = with_store_retries(|| {
            self.store
                .rotate(&presented_hash, &replacement_hash, expires_at)
        })
        .await?;

        match outcome {
            RotateOutcome::Rotated { user_id } => Ok(RotatedSession {
                user_id,
                refresh: IssuedRefresh { secret, expires_at },
            }),
            RotateOutcome::NotFound | RotateOutcome::Expired => Err(AppError::RefreshInvalid),
            RotateOutcome::Replayed => {
                let revoked =
                    with_store_retries(|| self.store.revoke_descendants(&presented_hash)).await?;
                warn!(
                    revoked_descendants = revoked,
                    "Rotated-away refresh secret replayed; lineage revoked"
                );
                Err(AppError::ReplayDetected)
            }
        }
    }

    /// Revoke the presented refresh secret, if it is still active.
    ///
    /// Idempotent: unknown and already-revoked secrets are not an error.
    pub async fn logout(&self, presented_secret: &str) -> AppResult<()> {
        let presented_hash = hash_refresh_secret(presented_secret);
        with_store_retries(|| self.store.revoke_by_hash(&presented_hash)).await?;
        Ok(())
    }
}

/// Retry a store operation a bounded number of times on transient database
/// failures. Other error kinds propagate immediately.
async fn with_store_retries<T, F, Fut>(mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AppResult<T>>,
{
    let mut last_error = None;

    for attempt in 1..=STORE_RETRY_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(AppError::Database(msg)) => {
                warn!(attempt, "Refresh token store error: {}", msg);
                last_error = Some(AppError::Database(msg));
                if attempt < STORE_RETRY_ATTEMPTS {
                    tokio::time::sleep(STORE_RETRY_DELAY).await;
                }
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_error
        .unwrap_or_else(|| AppError::Database("Refresh token store retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory store with the same atomicity contract as the SQL store:
    /// rotate claims the row and inserts its replacement under one lock.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, StoredRefreshToken>>,
    }

    #[async_trait::async_trait]
    impl RefreshTokenStore for MemoryStore {
        async fn insert(
            &self,
            user_id: Uuid,
            token_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> AppResult<()> {
            self.rows.lock().unwrap().insert(
                token_hash.to_string(),
                StoredRefreshToken {
                    user_id,
                    expires_at,
                    revoked_at: None,
                    replaced_by_hash: None,
                },
            );
            Ok(())
        }

        async fn find_by_hash(&self, token_hash: &str) -> AppResult<Option<StoredRefreshToken>> {
            Ok(self.rows.lock().unwrap().get(token_hash).cloned())
        }

        async fn rotate(
            &self,
            presented_hash: &str,
            replacement_hash: &str,
            new_expires_at: DateTime<Utc>,
        ) -> AppResult<RotateOutcome> {
            let mut rows = self.rows.lock().unwrap();
            let now = Utc::now();

            let Some(row) = rows.get_mut(presented_hash) else {
                return Ok(RotateOutcome::NotFound);
            };
            if row.revoked_at.is_some() {
                return Ok(RotateOutcome::Replayed);
            }
            if row.expires_at < now {
                return Ok(RotateOutcome::Expired);
            }

            row.revoked_at = Some(now);
            row.replaced_by_hash = Some(replacement_hash.to_string());
            let user_id = row.user_id;

            rows.insert(
                replacement_hash.to_string(),
                StoredRefreshToken {
                    user_id,
                    expires_at: new_expires_at,
                    revoked_at: None,
                    replaced_by_hash: None,
                },
            );

            Ok(RotateOutcome::Rotated { user_id })
        }

        async fn revoke_by_hash(&self, token_hash: &str) -> AppResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(token_hash) {
                Some(row) if row.revoked_at.is_none() => {
                    row.revoked_at = Some(Utc::now());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn revoke_descendants(&self, start_hash: &str) -> AppResult<u64> {
            let mut rows = self.rows.lock().unwrap();
            let mut revoked = 0u64;
            let mut cursor = rows
                .get(start_hash)
                .and_then(|r| r.replaced_by_hash.clone());

            while let Some(hash) = cursor {
                let Some(row) = rows.get_mut(&hash) else { break };
                if row.revoked_at.is_none() {
                    row.revoked_at = Some(Utc::now());
                    revoked += 1;
                }
                cursor = row.replaced_by_hash.clone();
            }

            Ok(revoked)
        }
    }

    /// Store whose insert fails transiently a fixed number of times.
    struct FlakyStore {
        inner: MemoryStore,
        insert_failures: AtomicU32,
    }

    #[async_trait::async_trait]
    impl RefreshTokenStore for FlakyStore {
        async fn insert(
            &self,
            user_id: Uuid,
            token_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> AppResult<()> {
            if self.insert_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
            {
                return Err(AppError::Database("simulated contention".to_string()));
            }
            self.inner.insert(user_id, token_hash, expires_at).await
        }

        async fn find_by_hash(&self, token_hash: &str) -> AppResult<Option<StoredRefreshToken>> {
            self.inner.find_by_hash(token_hash).await
        }

        async fn rotate(
            &self,
            presented_hash: &str,
            replacement_hash: &str,
            new_expires_at: DateTime<Utc>,
        ) -> AppResult<RotateOutcome> {
            self.inner
                .rotate(presented_hash, replacement_hash, new_expires_at)
                .await
        }

        async fn revoke_by_hash(&self, token_hash: &str) -> AppResult<bool> {
            self.inner.revoke_by_hash(token_hash).await
        }

        async fn revoke_descendants(&self, start_hash: &str) -> AppResult<u64> {
            self.inner.revoke_descendants(start_hash).await
        }
    }

    fn service() -> (Arc<MemoryStore>, SessionService) {
        let store = Arc::new(MemoryStore::default());
        let svc = SessionService::new(store.clone(), 3600);
        (store, svc)
    }

    #[test]
    fn test_secret_hash_is_stable_and_disjoint() {
        let a = generate_refresh_secret();
        let b = generate_refresh_secret();

        assert_ne!(a, b);
        assert_eq!(hash_refresh_secret(&a), hash_refresh_secret(&a));
        assert_ne!(hash_refresh_secret(&a), hash_refresh_secret(&b));
        assert_eq!(hash_refresh_secret(&a).len(), 64);
    }

    #[tokio::test]
    async fn test_logins_issue_disjoint_refresh_tokens() {
        let (store, svc) = service();
        let user = Uuid::new_v4();

        let first = svc.start_session(user).await.unwrap();
        let second = svc.start_session(user).await.unwrap();

        assert_ne!(first.secret, second.secret);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rotation_chain_and_replay_cascade() {
        let (_, svc) = service();
        let user = Uuid::new_v4();

        // login -> R1; rotate -> R2; rotate -> R3
        let r1 = svc.start_session(user).await.unwrap();
        let r2 = svc.rotate(&r1.secret).await.unwrap();
        assert_eq!(r2.user_id, user);
        assert_ne!(r1.secret, r2.refresh.secret);

        let r3 = svc.rotate(&r2.refresh.secret).await.unwrap();

        // Replaying R1 is rejected and revokes everything downstream,
        // including the latest legitimate token R3.
        let replay = svc.rotate(&r1.secret).await;
        assert!(matches!(replay, Err(AppError::ReplayDetected)));

        let after = svc.rotate(&r3.refresh.secret).await;
        assert!(matches!(after, Err(AppError::ReplayDetected)));
    }

    #[tokio::test]
    async fn test_unknown_secret_is_refresh_invalid() {
        let (_, svc) = service();
        let result = svc.rotate("todo_rt_never_issued").await;
        assert!(matches!(result, Err(AppError::RefreshInvalid)));
    }

    #[tokio::test]
    async fn test_expired_secret_is_refresh_invalid_without_cascade() {
        let store = Arc::new(MemoryStore::default());
        // Zero TTL: the token is expired the moment it is issued.
        let svc = SessionService::new(store.clone(), 0);
        let user = Uuid::new_v4();

        let issued = svc.start_session(user).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let result = svc.rotate(&issued.secret).await;
        assert!(matches!(result, Err(AppError::RefreshInvalid)));

        // Not revoked: it expired, it was never rotated away.
        let row = store
            .find_by_hash(&hash_refresh_secret(&issued.secret))
            .await
            .unwrap()
            .unwrap();
        assert!(row.revoked_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_rotations_exactly_one_wins() {
        let (_, svc) = service();
        let svc = Arc::new(svc);
        let user = Uuid::new_v4();

        let issued = svc.start_session(user).await.unwrap();
        let secret = issued.secret;

        let a = {
            let svc = svc.clone();
            let secret = secret.clone();
            tokio::spawn(async move { svc.rotate(&secret).await })
        };
        let b = {
            let svc = svc.clone();
            let secret = secret.clone();
            tokio::spawn(async move { svc.rotate(&secret).await })
        };

        let mut results = vec![a.await.unwrap(), b.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one concurrent rotation may succeed");

        let winner_idx = results.iter().position(|r| r.is_ok()).unwrap();
        let rotated = results.swap_remove(winner_idx).unwrap();
        assert_eq!(rotated.user_id, user);

        let loser = results.pop().unwrap();
        assert!(matches!(loser, Err(AppError::ReplayDetected)));

        // The loser's replay handling revoked the winner's fresh token too,
        // so the whole lineage now requires a re-login.
        let after = svc.rotate(&rotated.refresh.secret).await;
        assert!(matches!(after, Err(AppError::ReplayDetected)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (store, svc) = service();
        let user = Uuid::new_v4();

        let issued = svc.start_session(user).await.unwrap();

        svc.logout(&issued.secret).await.unwrap();
        svc.logout(&issued.secret).await.unwrap();
        svc.logout("todo_rt_never_issued").await.unwrap();

        let row = store
            .find_by_hash(&hash_refresh_secret(&issued.secret))
            .await
            .unwrap()
            .unwrap();
        assert!(row.revoked_at.is_some());
        assert!(row.replaced_by_hash.is_none(), "logout ends the lineage");
    }

    #[tokio::test]
    async fn test_logged_out_secret_replay_is_rejected() {
        let (_, svc) = service();
        let user = Uuid::new_v4();

        let issued = svc.start_session(user).await.unwrap();
        svc.logout(&issued.secret).await.unwrap();

        let result = svc.rotate(&issued.secret).await;
        assert!(matches!(result, Err(AppError::ReplayDetected)));
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            insert_failures: AtomicU32::new(1),
        });
        let svc = SessionService::new(store.clone(), 3600);

        let issued = svc.start_session(Uuid::new_v4()).await.unwrap();
        let row = store
            .find_by_hash(&hash_refresh_secret(&issued.secret))
            .await
            .unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn test_persistent_store_failures_surface_after_bounded_retries() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            insert_failures: AtomicU32::new(u32::MAX),
        });
        let svc = SessionService::new(store, 3600);

        let result = svc.start_session(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }
}
