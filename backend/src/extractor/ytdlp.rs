//! `yt-dlp` subprocess backend

use super::{FetchJob, MediaBackend, ProgressSample, ProgressSink, RawMedia};
use crate::config::ToolSettings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const PROGRESS_PREFIX: &str = "[progress] ";
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";

const SAVED_PREFIX: &str = "[saved] ";
const SAVED_TEMPLATE: &str = "after_move:[saved] %(filepath)s";

const AUDIO_OUTPUT: &str = "%(title).150B [%(id)s].%(ext)s";
const VIDEO_OUTPUT: &str = "%(title).150B [%(id)s] %(height)sp.%(ext)s";

const FFMPEG_MISSING: &str =
    "ffmpeg is required to merge audio and video streams but was not found; install ffmpeg or set tools.ffmpeg_path";

const STDERR_TAIL_LINES: usize = 20;

/// Intermediate per-stream files left behind by an interrupted merge
static STREAM_FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.f[0-9A-Za-z-]+\.[A-Za-z0-9]+$").unwrap());

/// Backend that shells out to the `yt-dlp` executable
pub struct YtDlp {
    binary: PathBuf,
    ffmpeg: Option<PathBuf>,
    probe_timeout: Duration,
    ffmpeg_found: AtomicBool,
}

impl YtDlp {
    pub fn new(tools: &ToolSettings) -> Self {
        Self {
            binary: tools.ytdlp_path.clone(),
            ffmpeg: tools.ffmpeg_path.clone(),
            probe_timeout: Duration::from_secs(tools.probe_timeout_secs),
            ffmpeg_found: AtomicBool::new(false),
        }
    }

    /// Check that the muxer runs. Only a positive answer is cached, so
    /// installing ffmpeg while the server is up is picked up on the next try.
    async fn ffmpeg_available(&self) -> bool {
        if self.ffmpeg_found.load(Ordering::Relaxed) {
            return true;
        }

        let program = match &self.ffmpeg {
            Some(path) if path.is_dir() => path.join("ffmpeg"),
            Some(path) => path.clone(),
            None => PathBuf::from("ffmpeg"),
        };

        let found = Command::new(&program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);

        if found {
            self.ffmpeg_found.store(true, Ordering::Relaxed);
        } else {
            warn!("ffmpeg not runnable at {:?}", program);
        }
        found
    }
}

#[async_trait]
impl MediaBackend for YtDlp {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<RawMedia> {
        debug!("Probing {}", url);

        let mut cmd = Command::new(&self.binary);
        cmd.args(probe_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.probe_timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::Extraction(format!(
                    "Timed out after {}s while reading video information",
                    self.probe_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Extraction(spawn_failure(&self.binary, &e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp probe failed: {}", stderr.trim());
            return Err(Error::Extraction(describe_failure(&stderr)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Extraction(format!("yt-dlp returned invalid JSON: {}", e)))
    }

    async fn fetch(
        &self,
        job: &FetchJob,
        progress: ProgressSink,
        cancel_rx: &mut mpsc::Receiver<()>,
    ) -> Result<PathBuf> {
        // Both merging and mp3 extraction run through ffmpeg
        if !self.ffmpeg_available().await {
            return Err(Error::Download(FFMPEG_MISSING.into()));
        }

        tokio::fs::create_dir_all(&job.output_dir).await?;

        let args = fetch_args(job, self.ffmpeg.as_deref());
        info!("Starting yt-dlp for {} (format {})", job.url, job.format_id);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Download(spawn_failure(&self.binary, &e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Download("yt-dlp stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Download("yt-dlp stderr unavailable".into()))?;
        let stderr_task = tokio::spawn(collect_tail(stderr));

        let mut lines = BufReader::new(stdout).lines();
        let mut saved: Option<PathBuf> = None;

        loop {
            tokio::select! {
                Some(()) = cancel_rx.recv() => {
                    let _ = child.kill().await;
                    stderr_task.abort();
                    remove_fragments(&job.output_dir, &job.video_id).await;
                    return Err(Error::Cancelled);
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(sample) = parse_progress_line(&line) {
                            progress(sample);
                        } else if let Some(path) = line.strip_prefix(SAVED_PREFIX) {
                            saved = Some(PathBuf::from(path.trim_end()));
                        }
                    }
                    None => break,
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            remove_fragments(&job.output_dir, &job.video_id).await;
            return Err(describe_fetch_failure(&stderr));
        }

        let path = saved.ok_or_else(|| {
            Error::Download("yt-dlp finished without reporting an output file".into())
        })?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::Download(format!(
                "Downloaded file not found at {}",
                path.display()
            )));
        }

        Ok(path)
    }
}

fn probe_args(url: &str) -> Vec<String> {
    ["--dump-single-json", "--no-playlist", "--no-warnings", "--skip-download", "--", url]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Selector that prefers the exact stream the user picked and falls back to a height cap
pub(crate) fn format_selector(format_id: &str, height: Option<u32>) -> String {
    let capped = match height {
        Some(h) if h > 0 => format!(
            "bestvideo[height<={h}]+bestaudio/best[height<={h}]/best",
            h = h
        ),
        _ => "bestvideo+bestaudio/best".to_string(),
    };

    if format_id.is_empty() || format_id == "best" {
        capped
    } else {
        format!("{id}+bestaudio/{id}/{capped}", id = format_id, capped = capped)
    }
}

fn fetch_args(job: &FetchJob, ffmpeg: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-playlist",
        "--no-warnings",
        "--newline",
        "--progress",
        "--windows-filenames",
        "--progress-template",
        PROGRESS_TEMPLATE,
        "--print",
        SAVED_TEMPLATE,
    ]
    .into_iter()
    .map(String::from)
    .collect();

    if let Some(location) = ffmpeg {
        args.push("--ffmpeg-location".into());
        args.push(location.to_string_lossy().into_owned());
    }

    let template = if job.audio_only {
        args.extend(
            [
                "-f",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "320K",
            ]
            .into_iter()
            .map(String::from),
        );
        AUDIO_OUTPUT
    } else {
        args.push("-f".into());
        args.push(format_selector(&job.format_id, job.height));
        args.push("--merge-output-format".into());
        args.push("mp4".into());
        VIDEO_OUTPUT
    };

    args.push("-o".into());
    args.push(job.output_dir.join(template).to_string_lossy().into_owned());
    args.push("--".into());
    args.push(job.url.clone());
    args
}

fn parse_number(field: &str) -> Option<f64> {
    match field {
        "NA" | "None" | "" => None,
        value => value.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0),
    }
}

/// Parse one line emitted through [`PROGRESS_TEMPLATE`]
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressSample> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX.trim_end())?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let [downloaded, total, estimate, speed, eta] = fields.as_slice() else {
        return None;
    };

    Some(ProgressSample {
        downloaded_bytes: parse_number(downloaded)? as u64,
        total_bytes: parse_number(total)
            .or_else(|| parse_number(estimate))
            .map(|v| v as u64),
        speed: parse_number(speed),
        eta: parse_number(eta).map(|v| v as u64),
    })
}

async fn collect_tail<R: AsyncRead + Unpin>(stream: R) -> String {
    let mut lines = BufReader::new(stream).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        debug!("yt-dlp: {}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

fn spawn_failure(binary: &Path, err: &std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::NotFound {
        format!(
            "yt-dlp executable not found at {}; install yt-dlp or set tools.ytdlp_path",
            binary.display()
        )
    } else {
        format!("Failed to start yt-dlp: {}", err)
    }
}

/// Turn tool stderr into a message fit for the UI
pub(crate) fn describe_failure(stderr: &str) -> String {
    let lower = stderr.to_lowercase();

    if lower.contains("private video") {
        "This video is private".into()
    } else if lower.contains("sign in to confirm your age") || lower.contains("age-restricted") {
        "This video is age restricted and cannot be downloaded without signing in".into()
    } else if lower.contains("not available in your country") || lower.contains("geo restrict") {
        "This video is not available in the server's region".into()
    } else if lower.contains("drm") {
        "This video is DRM protected".into()
    } else if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("this video is not available")
    {
        "This video is unavailable or has been removed".into()
    } else if lower.contains("unsupported url") {
        "Unsupported URL".into()
    } else if lower.contains("unable to download webpage")
        || lower.contains("getaddrinfo")
        || lower.contains("timed out")
    {
        "Could not reach the video platform".into()
    } else {
        last_error_line(stderr).unwrap_or_else(|| "yt-dlp failed without an error message".into())
    }
}

pub(crate) fn describe_fetch_failure(stderr: &str) -> Error {
    let lower = stderr.to_lowercase();

    let message = if lower.contains("ffmpeg")
        && (lower.contains("not found") || lower.contains("not installed"))
    {
        FFMPEG_MISSING.to_string()
    } else if lower.contains("no space left on device") {
        "Disk full while writing the download".to_string()
    } else if lower.contains("requested format is not available") {
        "The selected format is not available for this video".to_string()
    } else {
        describe_failure(stderr)
    };

    Error::Download(message)
}

fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .find_map(|l| l.trim().strip_prefix("ERROR:"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

/// Drop `.part` files and unmerged streams of one video
async fn remove_fragments(dir: &Path, video_id: &str) {
    let marker = format!("[{}]", video_id);
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(&marker) || !is_fragment(&name) {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(entry.path()).await {
            warn!("Failed to remove fragment {}: {}", name, e);
        }
    }
}

pub(crate) fn is_fragment(name: &str) -> bool {
    name.ends_with(".part")
        || name.ends_with(".ytdl")
        || name.contains(".part-Frag")
        || STREAM_FRAGMENT_RE.is_match(name)
}
