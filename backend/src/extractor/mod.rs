//! Seam to the external extraction/download tool
//!
//! The production backend drives the `yt-dlp` executable. Everything above
//! this module only sees [`MediaBackend`], so tests can substitute a fake.

mod ytdlp;

#[cfg(test)]
pub mod fake;

pub(crate) use ytdlp::is_fragment;
pub use ytdlp::YtDlp;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Raw metadata for one video as reported by the tool
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMedia {
    pub id: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub thumbnail: Option<String>,
    pub formats: Vec<RawFormat>,
}

/// One stream descriptor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    pub format_id: String,
    pub ext: Option<String>,
    pub height: Option<u32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    pub vbr: Option<f64>,
    pub tbr: Option<f64>,
    pub abr: Option<f64>,
}

impl RawFormat {
    pub fn has_video(&self) -> bool {
        codec_present(self.vcodec.as_deref())
    }

    pub fn has_audio(&self) -> bool {
        codec_present(self.acodec.as_deref())
    }

    /// Exact size when known, otherwise the tool's estimate
    pub fn size_estimate(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|s| *s > 0.0)
            .map(|s| s as u64)
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if !c.is_empty() && c != "none")
}

/// What to fetch and where to put it
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub url: String,
    pub video_id: String,
    pub format_id: String,
    /// Height cap used when the exact format is unavailable
    pub height: Option<u32>,
    pub audio_only: bool,
    pub output_dir: PathBuf,
}

/// One progress callback payload
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSample {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
}

impl ProgressSample {
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let pct = self.downloaded_bytes as f64 / total as f64 * 100.0;
                Some((pct.clamp(0.0, 100.0) * 10.0).round() / 10.0)
            }
            _ => None,
        }
    }
}

/// Progress callback invoked from inside a fetch
pub type ProgressSink = Arc<dyn Fn(ProgressSample) + Send + Sync>;

/// External extraction/download capability
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Query the stream catalog without downloading anything
    async fn probe(&self, url: &str) -> Result<RawMedia>;

    /// Download (and merge if needed) into `job.output_dir`, returning the final path.
    ///
    /// A message on `cancel_rx` aborts the transfer with [`crate::error::Error::Cancelled`].
    async fn fetch(
        &self,
        job: &FetchJob,
        progress: ProgressSink,
        cancel_rx: &mut mpsc::Receiver<()>,
    ) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_rounded_and_clamped() {
        let sample = ProgressSample {
            downloaded_bytes: 1,
            total_bytes: Some(3),
            ..Default::default()
        };
        assert_eq!(sample.percent(), Some(33.3));

        let over = ProgressSample {
            downloaded_bytes: 120,
            total_bytes: Some(100),
            ..Default::default()
        };
        assert_eq!(over.percent(), Some(100.0));
    }

    #[test]
    fn percent_unknown_without_total() {
        let sample = ProgressSample {
            downloaded_bytes: 1024,
            total_bytes: None,
            ..Default::default()
        };
        assert_eq!(sample.percent(), None);
        let zero = ProgressSample {
            total_bytes: Some(0),
            ..sample
        };
        assert_eq!(zero.percent(), None);
    }

    #[test]
    fn raw_media_tolerates_nulls_and_missing_fields() {
        let json = r#"{
            "id": "abc",
            "title": "Clip",
            "duration": 61.5,
            "channel": null,
            "formats": [
                {"format_id": "140", "vcodec": "none", "acodec": "mp4a.40.2", "filesize": null, "filesize_approx": 3400000.0},
                {"format_id": "sb0", "ext": "mhtml", "height": null}
            ]
        }"#;
        let media: RawMedia = serde_json::from_str(json).unwrap();
        assert_eq!(media.formats.len(), 2);
        assert!(!media.formats[0].has_video());
        assert!(media.formats[0].has_audio());
        assert_eq!(media.formats[0].size_estimate(), Some(3_400_000));
        assert!(!media.formats[1].has_audio());
        assert_eq!(media.view_count, None);
    }
}
