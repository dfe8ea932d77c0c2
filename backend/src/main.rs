//! Tubegrab - a self-hosted video downloader with a web UI
//!
//! Paste a video link in the browser, pick a quality, and the server fetches
//! and merges the streams with yt-dlp and ffmpeg, reporting progress as it goes.

mod config;
mod download;
mod error;
mod extractor;
mod media;
mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Settings};
use crate::download::{DownloadManager, DownloadStore, ProgressRegistry};
use crate::extractor::{MediaBackend, YtDlp};

/// Application state shared across all components
pub struct AppState {
    pub settings: Settings,
    pub backend: Arc<dyn MediaBackend>,
    pub store: DownloadStore,
    pub download_manager: DownloadManager,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        let backend: Arc<dyn MediaBackend> = Arc::new(YtDlp::new(&settings.tools));
        let store = DownloadStore::open(&settings.download_dir)?;
        let download_manager = DownloadManager::new(
            Arc::clone(&backend),
            Arc::new(ProgressRegistry::new()),
            store.clone(),
            settings.max_concurrent_downloads,
        );
        Ok(Self {
            settings,
            backend,
            store,
            download_manager,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tubegrab=info,tower_http=info")),
        )
        .with_target(false)
        .init();

    info!("Starting Tubegrab v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut settings = config::load_or_create_default(&config_path)?;
    cli.apply(&mut settings);
    info!("Configuration loaded from {:?}", config_path);

    // Create shared application state
    let state = Arc::new(AppState::new(settings)?);
    info!(
        "Downloads saved in {:?} using {}",
        state.store.dir(),
        state.backend.name()
    );

    let sweeper = download::sweeper::spawn(
        state.download_manager.clone(),
        state.store.clone(),
        state.settings.retention.clone(),
    );

    let result = server::run(Arc::clone(&state)).await;
    sweeper.abort();
    result
}
