//! Background cleanup of dead refresh token rows.
//!
//! Expired and revoked tokens stay queryable for a grace period so that a
//! late replay of an old secret still hits its row and triggers lineage
//! revocation. Past the grace period the rows carry no security value and
//! are swept out.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::db::{self, DbPool};

/// Configuration for the token cleanup task.
#[derive(Clone)]
pub struct CleanupConfig {
    /// How often to run a sweep (in seconds).
    pub interval_secs: u64,
    /// How long dead rows are kept around for replay detection (in seconds).
    pub grace_secs: u64,
}

/// Start the cleanup background task.
///
/// Spawns a tokio task that periodically sweeps refresh token rows whose
/// expiry or revocation lies beyond the grace period.
pub fn start_cleanup_task(pool: DbPool, config: CleanupConfig) {
    tokio::spawn(async move {
        info!(
            "Starting token cleanup task (grace: {} seconds, interval: {} seconds)",
            config.grace_secs, config.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(config.interval_secs));

        loop {
            ticker.tick().await;

            match db::refresh_tokens::cleanup_expired(pool.connection(), config.grace_secs).await {
                Ok(0) => {}
                Ok(swept) => info!("Token cleanup: swept {} dead refresh tokens", swept),
                Err(e) => error!("Token cleanup error: {}", e),
            }
        }
    });
}
