//! In-process backend used by orchestration and router tests

use super::{FetchJob, MediaBackend, ProgressSample, ProgressSink, RawFormat, RawMedia};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

pub const FAKE_TITLE: &str = "Fake Clip";
const TOTAL_BYTES: u64 = 1000;

pub struct FakeBackend {
    pub probe_error: Option<String>,
    pub fetch_error: Option<String>,
    pub step_delay: Duration,
    pub steps: u64,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            probe_error: None,
            fetch_error: None,
            step_delay: Duration::from_millis(5),
            steps: 4,
        }
    }
}

impl FakeBackend {
    pub fn slow() -> Self {
        Self {
            step_delay: Duration::from_secs(30),
            ..Default::default()
        }
    }

    pub fn failing_fetch(message: &str) -> Self {
        Self {
            fetch_error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

pub fn sample_media(id: &str) -> RawMedia {
    let stream = |format_id: &str, height: Option<u32>, ext: &str, vcodec: &str, acodec: &str| {
        RawFormat {
            format_id: format_id.into(),
            ext: Some(ext.into()),
            height,
            vcodec: Some(vcodec.into()),
            acodec: Some(acodec.into()),
            filesize: Some(1_000_000.0),
            ..Default::default()
        }
    };

    RawMedia {
        id: id.to_string(),
        title: Some(FAKE_TITLE.to_string()),
        channel: Some("Fake Channel".into()),
        duration: Some(95.0),
        view_count: Some(1234),
        thumbnail: Some("https://i.ytimg.com/vi/fake/hqdefault.jpg".into()),
        formats: vec![
            stream("137", Some(1080), "mp4", "avc1.640028", "none"),
            stream("248", Some(1080), "webm", "vp9", "none"),
            stream("22", Some(720), "mp4", "avc1.64001F", "mp4a.40.2"),
            stream("140", None, "m4a", "none", "mp4a.40.2"),
        ],
        ..Default::default()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn probe(&self, url: &str) -> Result<RawMedia> {
        if let Some(message) = &self.probe_error {
            return Err(Error::Extraction(message.clone()));
        }
        let id = url.rsplit("v=").next().unwrap_or("unknown");
        Ok(sample_media(id))
    }

    async fn fetch(
        &self,
        job: &FetchJob,
        progress: ProgressSink,
        cancel_rx: &mut mpsc::Receiver<()>,
    ) -> Result<PathBuf> {
        for step in 1..=self.steps {
            tokio::select! {
                Some(()) = cancel_rx.recv() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.step_delay) => {}
            }
            progress(ProgressSample {
                downloaded_bytes: TOTAL_BYTES * step / self.steps,
                total_bytes: Some(TOTAL_BYTES),
                speed: Some(2048.0),
                eta: Some(self.steps - step),
            });
        }

        if let Some(message) = &self.fetch_error {
            return Err(Error::Download(message.clone()));
        }

        let name = if job.audio_only {
            format!("{} [{}].mp3", FAKE_TITLE, job.video_id)
        } else {
            format!(
                "{} [{}] {}p.mp4",
                FAKE_TITLE,
                job.video_id,
                job.height.unwrap_or(0)
            )
        };

        tokio::fs::create_dir_all(&job.output_dir).await?;
        let path = job.output_dir.join(name);
        let body: &[u8] = if job.audio_only { b"ID3audio" } else { b"ftypvideo" };
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
