//! Individual download task implementation

use crate::download::ProgressRegistry;
use crate::error::Error;
use crate::extractor::{FetchJob, MediaBackend, ProgressSink};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Everything a spawned download needs
pub struct DownloadContext {
    pub id: String,
    pub backend: Arc<dyn MediaBackend>,
    pub registry: Arc<ProgressRegistry>,
    pub semaphore: Arc<Semaphore>,
    pub cancel_rx: mpsc::Receiver<()>,
}

/// Run a download to completion and leave a terminal record behind
pub async fn run_download(job: FetchJob, mut ctx: DownloadContext) {
    // Wait for a slot; cancellation is honoured while queued too
    let semaphore = Arc::clone(&ctx.semaphore);
    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit.ok(),
        Some(()) = ctx.cancel_rx.recv() => None,
    };

    let Some(_permit) = permit else {
        info!("Download {} cancelled before it started", ctx.id);
        settle(&ctx, Err(Error::Cancelled));
        return;
    };

    info!("Starting download {}: {} -> {:?}", ctx.id, job.url, job.output_dir);

    let registry = Arc::clone(&ctx.registry);
    let id = ctx.id.clone();
    let progress: ProgressSink = Arc::new(move |sample| {
        if let Err(e) = registry.update(&id, sample) {
            debug!("Dropped progress sample: {}", e);
        }
    });

    let result = ctx
        .backend
        .fetch(&job, progress, &mut ctx.cancel_rx)
        .await
        .and_then(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| Error::Download("Downloaded path has no file name".into()))
        });

    settle(&ctx, result);
}

fn settle(ctx: &DownloadContext, result: Result<String, Error>) {
    let outcome = match &result {
        Ok(filename) => {
            info!("Download {} finished: {}", ctx.id, filename);
            ctx.registry.finish(&ctx.id, filename)
        }
        Err(Error::Cancelled) => {
            info!("Download {} cancelled", ctx.id);
            ctx.registry.cancel(&ctx.id)
        }
        Err(e) => {
            warn!("Download {} failed: {}", ctx.id, e);
            ctx.registry.fail(&ctx.id, &e.to_string())
        }
    };

    if let Err(e) = outcome {
        warn!("Could not finalize download {}: {}", ctx.id, e);
    }
}
