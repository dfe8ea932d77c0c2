//! Keyed store of download progress snapshots

use crate::extractor::ProgressSample;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Download status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Error,
    Cancelled,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading)
    }
}

/// Snapshot of one download as seen by pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: String,
    pub status: ProgressStatus,
    /// 0.0 - 100.0, one decimal
    pub percent: f64,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub filename: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            status: ProgressStatus::Downloading,
            percent: 0.0,
            speed: None,
            eta: None,
            downloaded_bytes: 0,
            total_bytes: None,
            filename: None,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("download {0} is already tracked")]
    AlreadyExists(String),
    #[error("download {0} is not tracked")]
    NotFound(String),
    #[error("download {0} already ended as {1}")]
    Terminal(String, &'static str),
}

/// Progress records for every download the process knows about.
///
/// Each mutation builds a complete replacement record and swaps it in while
/// holding the write lock, so readers only ever clone whole records.
#[derive(Default)]
pub struct ProgressRegistry {
    records: RwLock<HashMap<String, ProgressRecord>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id` in `downloading` at 0%
    pub fn begin(&self, id: &str) -> Result<ProgressRecord, RegistryError> {
        let mut records = self.records.write();
        if records.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.to_string()));
        }
        let record = ProgressRecord::new(id);
        records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    /// Apply a progress sample; rejected once the record is terminal
    pub fn update(&self, id: &str, sample: ProgressSample) -> Result<(), RegistryError> {
        self.replace(id, |record| {
            if let Some(percent) = sample.percent() {
                record.percent = percent;
            }
            record.downloaded_bytes = sample.downloaded_bytes;
            record.total_bytes = sample.total_bytes.or(record.total_bytes);
            record.speed = sample.speed;
            record.eta = sample.eta;
        })
    }

    pub fn finish(&self, id: &str, filename: &str) -> Result<(), RegistryError> {
        self.replace(id, |record| {
            record.status = ProgressStatus::Finished;
            record.percent = 100.0;
            record.speed = None;
            record.eta = Some(0);
            record.filename = Some(filename.to_string());
        })
    }

    pub fn fail(&self, id: &str, message: &str) -> Result<(), RegistryError> {
        self.replace(id, |record| {
            record.status = ProgressStatus::Error;
            record.speed = None;
            record.eta = None;
            record.error = Some(message.to_string());
        })
    }

    pub fn cancel(&self, id: &str) -> Result<(), RegistryError> {
        self.replace(id, |record| {
            record.status = ProgressStatus::Cancelled;
            record.speed = None;
            record.eta = None;
            record.error = Some("Download cancelled".to_string());
        })
    }

    /// Current snapshot, `None` when the download has not been registered
    pub fn get(&self, id: &str) -> Option<ProgressRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Forget finished downloads whose file has been handed to a client
    pub fn release_file(&self, filename: &str) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| {
            !(r.status == ProgressStatus::Finished && r.filename.as_deref() == Some(filename))
        });
        before - records.len()
    }

    /// Drop terminal records idle for longer than `ttl`
    pub fn sweep(&self, ttl: chrono::Duration) -> usize {
        // A ttl reaching before the representable range keeps everything
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !(r.status.is_terminal() && r.updated_at < cutoff));
        before - records.len()
    }

    fn replace<F>(&self, id: &str, mutate: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut ProgressRecord),
    {
        let mut records = self.records.write();
        let current = records
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if current.status.is_terminal() {
            return Err(RegistryError::Terminal(id.to_string(), current.status.as_str()));
        }

        let mut next = current.clone();
        mutate(&mut next);
        next.updated_at = Utc::now();
        records.insert(id.to_string(), next);
        Ok(())
    }
}
