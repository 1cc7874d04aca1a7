//! Database operations for refresh tokens.
//!
//! Rotation is a compare-and-set: a single conditional UPDATE claims the
//! active row, so of two racing refresh calls exactly one observes the token
//! as active. The loser sees it already revoked and is reported as a replay.

use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::services::session::{RefreshTokenStore, RotateOutcome, StoredRefreshToken};

/// Upper bound on a lineage walk. Lineages grow by one per rotation, so this
/// is far beyond anything a 30-day session can produce.
const MAX_LINEAGE_WALK: usize = 1000;

/// Insert a new refresh token row (stores the hash, not the raw secret).
pub async fn insert(
    db: &DatabaseConnection,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    let now = Utc::now();

    let model = crate::entity::refresh_token::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        token_hash: Set(token_hash.to_string()),
        expires_at: Set(expires_at),
        revoked_at: Set(None),
        replaced_by_hash: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
    };

    crate::entity::refresh_token::Entity::insert(model)
        .exec(db)
        .await?;

    Ok(())
}

/// Find a refresh token row by its hash, regardless of validity.
pub async fn find_by_hash(
    db: &DatabaseConnection,
    token_hash: &str,
) -> AppResult<Option<crate::entity::refresh_token::Model>> {
    let result = crate::entity::refresh_token::Entity::find()
        .filter(crate::entity::refresh_token::Column::TokenHash.eq(token_hash))
        .filter(crate::entity::refresh_token::Column::DeletedAt.is_null())
        .one(db)
        .await?;

    Ok(result)
}

/// Atomically rotate the token matching `presented_hash`.
///
/// The claim UPDATE only matches a row that is still active, so concurrent
/// callers racing on the same secret serialize here: one wins and extends the
/// lineage, the others observe the row as revoked.
pub async fn rotate(
    db: &DatabaseConnection,
    presented_hash: &str,
    replacement_hash: &str,
    new_expires_at: DateTime<Utc>,
) -> AppResult<RotateOutcome> {
    let now = Utc::now();
    let txn = db.begin().await?;

    let claimed = crate::entity::refresh_token::Entity::update_many()
        .filter(crate::entity::refresh_token::Column::TokenHash.eq(presented_hash))
        .filter(crate::entity::refresh_token::Column::RevokedAt.is_null())
        .filter(crate::entity::refresh_token::Column::DeletedAt.is_null())
        .filter(crate::entity::refresh_token::Column::ExpiresAt.gt(now))
        .col_expr(
            crate::entity::refresh_token::Column::RevokedAt,
            Expr::value(Some(now)),
        )
        .col_expr(
            crate::entity::refresh_token::Column::ReplacedByHash,
            Expr::value(Some(replacement_hash.to_string())),
        )
        .exec(&txn)
        .await?;

    if claimed.rows_affected == 1 {
        let old = crate::entity::refresh_token::Entity::find()
            .filter(crate::entity::refresh_token::Column::TokenHash.eq(presented_hash))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                AppError::Database("Claimed refresh token row disappeared".to_string())
            })?;

        let model = crate::entity::refresh_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(old.user_id),
            token_hash: Set(replacement_hash.to_string()),
            expires_at: Set(new_expires_at),
            revoked_at: Set(None),
            replaced_by_hash: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        };

        crate::entity::refresh_token::Entity::insert(model)
            .exec(&txn)
            .await?;

        txn.commit().await?;
        return Ok(RotateOutcome::Rotated { user_id: old.user_id });
    }

    txn.rollback().await?;

    // No active row matched. Distinguish why for the session coordinator;
    // the caller still sees one uniform 401.
    match find_by_hash(db, presented_hash).await? {
        None => Ok(RotateOutcome::NotFound),
        Some(row) if row.revoked_at.is_some() => Ok(RotateOutcome::Replayed),
        Some(_) => Ok(RotateOutcome::Expired),
    }
}

/// Revoke a refresh token by its hash. Returns false if no active row matched.
pub async fn revoke_by_hash(db: &DatabaseConnection, token_hash: &str) -> AppResult<bool> {
    let result = crate::entity::refresh_token::Entity::update_many()
        .filter(crate::entity::refresh_token::Column::TokenHash.eq(token_hash))
        .filter(crate::entity::refresh_token::Column::RevokedAt.is_null())
        .filter(crate::entity::refresh_token::Column::DeletedAt.is_null())
        .col_expr(
            crate::entity::refresh_token::Column::RevokedAt,
            Expr::value(Some(Utc::now())),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Revoke every token downstream of `start_hash` by following the
/// replaced_by_hash lineage pointers. Returns the number of rows revoked.
pub async fn revoke_descendants(db: &DatabaseConnection, start_hash: &str) -> AppResult<u64> {
    let mut revoked = 0u64;
    let mut cursor = find_by_hash(db, start_hash)
        .await?
        .and_then(|row| row.replaced_by_hash);

    for _ in 0..MAX_LINEAGE_WALK {
        let Some(hash) = cursor else { break };

        if revoke_by_hash(db, &hash).await? {
            revoked += 1;
        }
        cursor = find_by_hash(db, &hash).await?.and_then(|r| r.replaced_by_hash);
    }

    Ok(revoked)
}

/// Soft-delete expired and revoked tokens older than the given age (cleanup job).
pub async fn cleanup_expired(db: &DatabaseConnection, older_than_secs: u64) -> AppResult<u64> {
    let cutoff = Utc::now() - chrono::Duration::seconds(older_than_secs as i64);
    let now = Utc::now();

    let result = crate::entity::refresh_token::Entity::update_many()
        .filter(crate::entity::refresh_token::Column::DeletedAt.is_null())
        .filter(
            Condition::any()
                .add(crate::entity::refresh_token::Column::ExpiresAt.lt(cutoff))
                .add(crate::entity::refresh_token::Column::RevokedAt.lt(cutoff)),
        )
        .col_expr(
            crate::entity::refresh_token::Column::DeletedAt,
            Expr::value(Some(now)),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// SeaORM-backed refresh token store used by the session coordinator.
#[derive(Clone)]
pub struct DbRefreshTokenStore {
    pool: DbPool,
}

impl DbRefreshTokenStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for DbRefreshTokenStore {
    async fn insert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        insert(self.pool.connection(), user_id, token_hash, expires_at).await
    }

    async fn find_by_hash(&self, token_hash: &str) -> AppResult<Option<StoredRefreshToken>> {
        let row = find_by_hash(self.pool.connection(), token_hash).await?;
        Ok(row.map(|r| StoredRefreshToken {
            user_id: r.user_id,
            expires_at: r.expires_at,
            revoked_at: r.revoked_at,
            replaced_by_hash: r.replaced_by_hash,
        }))
    }

    async fn rotate(
        &self,
        presented_hash: &str,
        replacement_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> AppResult<RotateOutcome> {
        rotate(
            self.pool.connection(),
            presented_hash,
            replacement_hash,
            new_expires_at,
        )
        .await
    }

    async fn revoke_by_hash(&self, token_hash: &str) -> AppResult<bool> {
        revoke_by_hash(self.pool.connection(), token_hash).await
    }

    async fn revoke_descendants(&self, start_hash: &str) -> AppResult<u64> {
        revoke_descendants(self.pool.connection(), start_hash).await
    }
}
