//! Periodic expiry of progress records and downloaded files

use crate::config::RetentionSettings;
use crate::download::{CleanupFilter, DownloadManager, DownloadStore};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Run one retention pass, returning (records dropped, files removed)
pub async fn sweep_once(
    manager: &DownloadManager,
    store: &DownloadStore,
    retention: &RetentionSettings,
) -> (usize, usize) {
    let ttl = i64::try_from(retention.progress_ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX);
    let records = manager.registry().sweep(ttl);

    let filter = CleanupFilter {
        older_than_secs: Some(retention.file_ttl_secs),
    };
    let files = store.cleanup(filter, manager.active_count() > 0).await;

    (records, files)
}

/// Spawn the sweeper loop on the current runtime
pub fn spawn(
    manager: DownloadManager,
    store: DownloadStore,
    retention: RetentionSettings,
) -> JoinHandle<()> {
    let period = Duration::from_secs(retention.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let (records, files) = sweep_once(&manager, &store, &retention).await;
            if records > 0 || files > 0 {
                info!("Sweeper expired {} progress records and {} files", records, files);
            } else {
                debug!("Sweeper found nothing to expire");
            }
        }
    })
}
