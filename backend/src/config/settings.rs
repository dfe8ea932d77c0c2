//! Settings data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Flat directory holding finished downloads
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum number of concurrent downloads
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolSettings,

    /// Expiry of progress records and files
    #[serde(default)]
    pub retention: RetentionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            tools: ToolSettings::default(),
            retention: RetentionSettings::default(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tubegrab")
        .join("downloads")
}

fn default_max_concurrent() -> usize {
    3
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to (0.0.0.0 for LAN access)
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Where to find yt-dlp and ffmpeg
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// yt-dlp executable, looked up on PATH when bare
    pub ytdlp_path: PathBuf,

    /// ffmpeg binary or the directory containing it
    pub ffmpeg_path: Option<PathBuf>,

    /// Upper bound for a single info request
    pub probe_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: None,
            probe_timeout_secs: 60,
        }
    }
}

/// Retention policy for progress records and downloaded files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Finished, failed or cancelled records are dropped after this idle time
    pub progress_ttl_secs: u64,

    /// Files older than this are deleted by the sweeper
    pub file_ttl_secs: u64,

    pub sweep_interval_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            progress_ttl_secs: 60 * 60,
            file_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            download_dir = "/srv/tubegrab"

            [server]
            host = "127.0.0.1"
            port = 8080

            [tools]
            ffmpeg_path = "/opt/ffmpeg/bin"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.download_dir, PathBuf::from("/srv/tubegrab"));
        assert_eq!(settings.max_concurrent_downloads, 3);
        assert_eq!(settings.tools.ytdlp_path, PathBuf::from("yt-dlp"));
        assert_eq!(settings.tools.ffmpeg_path, Some(PathBuf::from("/opt/ffmpeg/bin")));
        assert_eq!(settings.retention.progress_ttl_secs, 3600);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&Settings::default()).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back.server.port, 5000);
        assert_eq!(back.retention.sweep_interval_secs, 300);
    }
}
