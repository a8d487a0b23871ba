//! Stale checkout-intent sweep.
//!
//! Buyers abandon checkouts; their intents would sit pending forever. A
//! background task periodically moves pending intents older than two hours
//! to `abandoned`. The sweep is independent of webhook processing and never
//! blocks it.

use std::time::Duration;

use tokio::sync::watch;

use crate::db::{DbPool, queries};
use crate::error::Result;

/// Pending intents older than this are considered abandoned.
pub const STALE_INTENT_AGE_SECS: i64 = 2 * 60 * 60;

pub async fn run_intent_sweep(
    pool: DbPool,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("checkout intent sweep started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("checkout intent sweep shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match sweep_once(&pool) {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "marked stale checkout intents abandoned"),
            Err(e) => tracing::error!(error = %e, "intent sweep error"),
        }
    }
}

pub fn sweep_once(pool: &DbPool) -> Result<usize> {
    let conn = pool.get()?;
    let cutoff = chrono::Utc::now().timestamp() - STALE_INTENT_AGE_SECS;
    queries::mark_stale_intents_abandoned(&conn, cutoff)
}
