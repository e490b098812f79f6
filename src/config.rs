//! Read-only application settings.
//!
//! Looked up in `$YTFETCH_CONFIG` or `<config dir>/config.json`; a missing file
//! means defaults. `YTFETCH_YTDLP` and `YTFETCH_DOWNLOAD_DIR` override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::model::DownloadMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Explicit yt-dlp executable
    pub ytdlp_path: Option<PathBuf>,
    /// Initial destination; the working directory when absent
    pub download_folder: Option<PathBuf>,
    /// Mode selected at startup
    pub default_mode: DownloadMode,
    /// Upper bound for the thumbnail request
    pub thumbnail_timeout_secs: u64,
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_filter: String,
    pub dark_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            download_folder: None,
            default_mode: DownloadMode::VideoAudio,
            thumbnail_timeout_secs: 5,
            log_filter: "ytfetch=info".to_owned(),
            dark_mode: true,
        }
    }
}

impl AppConfig {
    /// Loads the config file and applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os("YTFETCH_CONFIG") {
            Some(p) => Some(PathBuf::from(p)),
            None => Self::default_path(),
        };
        let config = match path {
            Some(p) => Self::load_from(&p)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var_os(key).map(PathBuf::from)))
    }

    fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "ytfetch", "ytfetch").map(|d| d.config_dir().join("config.json"))
    }

    /// Parses `path`, or returns defaults when it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::info!("Loaded configuration from: {:?}", path);
        Ok(config)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        if let Some(p) = lookup("YTFETCH_YTDLP") {
            self.ytdlp_path = Some(p);
        }
        if let Some(p) = lookup("YTFETCH_DOWNLOAD_DIR") {
            self.download_folder = Some(p);
        }
        self
    }

    /// Configured folder, falling back to the working directory
    pub fn initial_folder(&self) -> Option<PathBuf> {
        self.download_folder
            .clone()
            .or_else(|| std::env::current_dir().ok())
    }
}
