//! Download orchestration: progress tracking, task management and file storage

mod manager;
mod registry;
mod store;
pub mod sweeper;
mod task;

pub use manager::{DownloadManager, DownloadRequest, DownloadStats};
pub use registry::{ProgressRecord, ProgressRegistry, ProgressStatus};
pub use store::{CleanupFilter, DownloadStore};
