//! The flat download directory

use crate::error::{Error, Result};
use crate::extractor::is_fragment;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Which files a cleanup pass may delete
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CleanupFilter {
    /// Only delete files last modified longer ago than this
    pub older_than_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DownloadStore {
    dir: PathBuf,
}

impl DownloadStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a client supplied file name onto a file inside the directory
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;

        let candidate = self.dir.join(filename);
        let metadata = match tokio::fs::metadata(&candidate).await {
            Ok(m) if m.is_file() => m,
            _ => return Err(Error::NotFound(format!("File not found: {}", filename))),
        };
        debug!("Resolved {} ({} bytes)", filename, metadata.len());

        // A symlink could still point outside the directory
        let root = tokio::fs::canonicalize(&self.dir).await?;
        let real = tokio::fs::canonicalize(&candidate).await?;
        if !real.starts_with(&root) {
            return Err(Error::Validation("Invalid file name".into()));
        }

        Ok(real)
    }

    /// Best-effort deletion; returns how many files were removed
    pub async fn cleanup(&self, filter: CleanupFilter, keep_in_flight: bool) -> usize {
        let min_age = filter.older_than_secs.map(Duration::from_secs);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read download directory {:?}: {}", self.dir, e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error while listing {:?}: {}", self.dir, e);
                    break;
                }
            };

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if keep_in_flight && is_fragment(&name) {
                continue;
            }

            if let Some(min_age) = min_age {
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age < min_age {
                    continue;
                }
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!("Removed {}", name);
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", name, e),
            }
        }

        removed
    }
}

/// Reject anything that is not a single plain file name
pub fn validate_filename(filename: &str) -> Result<()> {
    let invalid = filename.is_empty()
        || filename.len() > 255
        || filename == "."
        || filename.starts_with("..")
        || filename.contains(['/', '\\', ':', '\0']);

    if invalid {
        return Err(Error::Validation("Invalid file name".into()));
    }
    Ok(())
}
