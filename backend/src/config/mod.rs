//! Configuration management for Tubegrab

mod settings;

pub use settings::*;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

/// Command line overrides for the configuration file
#[derive(Debug, Parser)]
#[command(name = "tubegrab", version, about)]
pub struct Cli {
    /// Configuration file (created with defaults when missing)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Directory for finished downloads
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
}

impl Cli {
    /// Apply command line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.download_dir {
            settings.download_dir = dir.clone();
        }
    }
}

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tubegrab")
}

/// Get the default configuration file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load configuration from file or create default
pub fn load_or_create_default(path: &Path) -> Result<Settings> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    } else {
        let settings = Settings::default();
        save(path, &settings)?;
        Ok(settings)
    }
}

/// Save configuration to file
pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    // Ensure config directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(settings)?;
    fs::write(path, content)?;

    Ok(())
}
