use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::error::StorageResult;
use crate::record::now_ms;
use crate::storage::StorageProvider;

// ─── Public entry points ─────────────────────────────────────────

/// Delete everything that started more than `max_age` before `now`.
/// Returns the number of records removed.
pub async fn sweep_once(
    storage: &dyn StorageProvider,
    max_age: Duration,
    now: i64,
) -> StorageResult<u64> {
    let age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now.saturating_sub(age_ms);
    storage.delete_requests_older_than(cutoff).await
}

/// Spawns a task that prunes old records every `interval` until
/// `running` is set to false.
pub fn spawn_sweeper(
    storage: Arc<dyn StorageProvider>,
    max_age: Duration,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately; skip it so startup isn't a prune
        ticker.tick().await;

        while running.load(Ordering::Relaxed) {
            ticker.tick().await;
            if !running.load(Ordering::Relaxed) {
                break;
            }

            match sweep_once(storage.as_ref(), max_age, now_ms()).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, max_age_secs = max_age.as_secs(), "retention sweep"),
                Err(e) => error!(error = %e, "retention sweep failed"),
            }
        }
    })
}
