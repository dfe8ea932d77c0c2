//! Download manager: admission, bookkeeping and cancellation of download tasks

use crate::download::task::{self, DownloadContext};
use crate::download::{DownloadStore, ProgressRegistry, ProgressStatus};
use crate::error::{Error, Result};
use crate::extractor::{FetchJob, MediaBackend};
use crate::media::catalog::AUDIO_FORMAT_ID;
use crate::media::MediaLink;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::info;

/// Body of a download request
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub format_id: String,
    /// Quality label such as `1080p`
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub audio_only: bool,
}

/// Inner state that cannot be cloned directly
struct DownloadManagerInner {
    backend: Arc<dyn MediaBackend>,
    registry: Arc<ProgressRegistry>,
    store: DownloadStore,
    max_concurrent: usize,

    /// Active downloads (id -> cancel sender)
    active: RwLock<HashMap<String, mpsc::Sender<()>>>,
}

/// Download manager that starts, limits and cancels downloads
#[derive(Clone)]
pub struct DownloadManager {
    /// Semaphore to limit concurrent downloads
    semaphore: Arc<Semaphore>,

    /// Inner state wrapped in Arc
    inner: Arc<DownloadManagerInner>,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        registry: Arc<ProgressRegistry>,
        store: DownloadStore,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            inner: Arc::new(DownloadManagerInner {
                backend,
                registry,
                store,
                max_concurrent,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ProgressRegistry> {
        &self.inner.registry
    }

    /// Validate, register and spawn a download; returns its id immediately
    pub fn start(&self, request: DownloadRequest) -> Result<String> {
        let link = MediaLink::parse(&request.url)?;
        let format_id = validate_format_id(&request)?;
        let height = request.quality.as_deref().and_then(parse_height);

        let tier = match (request.audio_only, height) {
            (true, _) => "audio".to_string(),
            (false, Some(h)) => format!("{}p", h),
            (false, None) => "best".to_string(),
        };
        let id = format!("{}-{}-{}", link.video_id, tier, short_token());

        self.inner
            .registry
            .begin(&id)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let job = FetchJob {
            url: link.canonical_url,
            video_id: link.video_id,
            format_id,
            height,
            audio_only: request.audio_only,
            output_dir: self.inner.store.dir().to_path_buf(),
        };

        // Create cancel channel
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>(1);
        self.add_active(id.clone(), cancel_tx);

        let ctx = DownloadContext {
            id: id.clone(),
            backend: Arc::clone(&self.inner.backend),
            registry: Arc::clone(&self.inner.registry),
            semaphore: Arc::clone(&self.semaphore),
            cancel_rx,
        };

        let manager = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            task::run_download(job, ctx).await;
            // Remove from active set
            manager.remove_active(&task_id);
        });

        info!("Queued download {}", id);
        Ok(id)
    }

    /// Add a download to the active set
    fn add_active(&self, id: String, cancel_tx: mpsc::Sender<()>) {
        self.inner.active.write().insert(id, cancel_tx);
    }

    /// Remove a download from the active set
    fn remove_active(&self, id: &str) {
        self.inner.active.write().remove(id);
    }

    /// Cancel a download; false when it is unknown or already over
    pub fn cancel(&self, id: &str) -> bool {
        // Clone the sender so the lock is released before the registry is read
        let cancel_tx = self.inner.active.read().get(id).cloned();

        match cancel_tx {
            Some(tx) => {
                let still_running = self
                    .inner
                    .registry
                    .get(id)
                    .map(|r| r.status == ProgressStatus::Downloading)
                    .unwrap_or(false);
                still_running && tx.try_send(()).is_ok()
            }
            None => false,
        }
    }

    /// Get active download count
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// Get current statistics
    pub fn stats(&self) -> DownloadStats {
        DownloadStats {
            active: self.active_count(),
            tracked: self.inner.registry.len(),
            max_concurrent: self.inner.max_concurrent,
        }
    }
}

/// Download statistics
#[derive(Debug, Clone, Serialize)]
pub struct DownloadStats {
    pub active: usize,
    pub tracked: usize,
    pub max_concurrent: usize,
}

/// Parse a quality label like `1080p` into a height
pub fn parse_height(quality: &str) -> Option<u32> {
    quality
        .trim()
        .trim_end_matches(['p', 'P'])
        .parse::<u32>()
        .ok()
        .filter(|h| *h > 0)
}

fn validate_format_id(request: &DownloadRequest) -> Result<String> {
    let format_id = request.format_id.trim();

    if format_id.is_empty() {
        return if request.audio_only {
            Ok(AUDIO_FORMAT_ID.to_string())
        } else {
            Err(Error::Validation("format_id not provided".into()))
        };
    }

    if format_id.starts_with('-') || format_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::Validation(format!("Invalid format_id: {}", format_id)));
    }

    Ok(format_id.to_string())
}

fn short_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
