//! Domain error taxonomy shared by the backend, the orchestrator and the store

use thiserror::Error;

/// Errors surfaced to API callers
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported input (link, format id, file name)
    #[error("{0}")]
    Validation(String),

    /// The platform rejected the link or the content is unavailable
    #[error("{0}")]
    Extraction(String),

    /// Transfer, merge or disk failure while downloading
    #[error("{0}")]
    Download(String),

    /// Unknown download id or missing file
    #[error("{0}")]
    NotFound(String),

    #[error("download cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
