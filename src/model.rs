use std::path::PathBuf;

use eframe::egui::ColorImage;
use serde::{Deserialize, Serialize};

/// Metadata resolved for one video URL
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoMetadata {
    /// Human-readable title
    pub title: String,
    /// Length of the video in whole seconds
    pub duration_secs: u64,
    /// Where the preview image lives
    pub thumbnail_url: String,
}

impl VideoMetadata {
    /// Duration rendered as `"{minutes}m {seconds}s"`
    pub fn duration_text(&self) -> String {
        format!("{}m {}s", self.duration_secs / 60, self.duration_secs % 60)
    }
}

/// One downloadable rendition of the video
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamDescriptor {
    /// Page the stream was resolved from
    pub source_url: String,
    /// Format reference handed back to the source to download this stream
    pub format_id: String,
    /// Container tag (e.g. `mp4`, `m4a`, `webm`)
    pub container: String,
    /// Resolution label such as `720p`, absent for audio-only streams
    pub resolution: Option<String>,
    /// Audio bitrate label such as `128kbps`
    pub bitrate: Option<String>,
    /// Size in bytes, 0 when the source doesn't know
    pub filesize: u64,
    /// Carries a video track
    pub has_video: bool,
    /// Carries an audio track
    pub has_audio: bool,
}

impl StreamDescriptor {
    /// Pixel height parsed from the resolution label (`"720p"` -> 720)
    pub fn height(&self) -> Option<u32> {
        self.resolution
            .as_deref()
            .and_then(|r| r.strip_suffix('p'))
            .and_then(|h| h.parse().ok())
    }

    /// Kilobits per second parsed from the bitrate label (`"128kbps"` -> 128.0)
    pub fn bitrate_kbps(&self) -> Option<f32> {
        self.bitrate
            .as_deref()
            .and_then(|b| b.strip_suffix("kbps"))
            .and_then(|b| b.parse().ok())
    }

    /// Resolution or bitrate, whichever describes this stream
    pub fn label(&self) -> &str {
        self.resolution
            .as_deref()
            .or(self.bitrate.as_deref())
            .unwrap_or("unknown")
    }
}

/// Everything the source reports for a URL
#[derive(Debug, Clone, Default)]
pub struct ResolvedVideo {
    pub metadata: VideoMetadata,
    pub streams: Vec<StreamDescriptor>,
}

/// Which kind of file the user wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Progressive stream with both tracks
    #[default]
    VideoAudio,
    /// Audio track only
    AudioOnly,
}

/// Where the session is in the fetch/download workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Nothing fetched yet
    #[default]
    Idle,
    /// Metadata retrieval is running
    Fetching,
    /// Metadata and streams are available
    Fetched,
    /// A transfer is running
    Downloading,
    /// Last transfer finished; behaves like `Fetched`
    Complete,
    /// Last operation failed; input is enabled again
    Failed,
}

impl SessionStatus {
    /// A worker is active and every triggering control must stay disabled
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Fetching | Self::Downloading)
    }
}

/// Preview image for the fetched video
#[derive(Clone, Default)]
pub enum Thumbnail {
    /// Nothing requested yet
    #[default]
    Empty,
    /// Retrieval in progress
    Loading,
    /// Decoded, downscaled bitmap
    Ready(ColorImage),
    /// Retrieval or decoding failed; the UI shows placeholder text
    Unavailable,
}

impl Thumbnail {
    /// Text shown instead of an image
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Empty => "Thumbnail will appear here",
            Self::Loading => "Loading thumbnail...",
            Self::Ready(_) => "",
            Self::Unavailable => "No thumbnail",
        }
    }
}

impl std::fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready(img) => write!(f, "Ready({}x{})", img.size[0], img.size[1]),
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// Severity of a blocking notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Message the UI surface shows as a blocking dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Transient state of one fetch-to-download workflow
#[derive(Debug, Clone)]
pub struct Session {
    /// Metadata of the last successful fetch
    pub metadata: Option<VideoMetadata>,
    /// Preview image for `metadata`
    pub thumbnail: Thumbnail,
    /// Every stream the source reported
    pub streams: Vec<StreamDescriptor>,
    /// Streams eligible for `mode`, ranked best first
    pub candidates: Vec<StreamDescriptor>,
    /// Current mode
    pub mode: DownloadMode,
    /// Resolution label picked in video mode
    pub resolution: Option<String>,
    /// Stream that Download would fetch
    pub selection: Option<StreamDescriptor>,
    /// Destination folder
    pub folder: Option<PathBuf>,
    /// Transfer progress (0.0 to 1.0)
    pub progress: f32,
    /// Workflow state
    pub status: SessionStatus,
    /// One-line status message
    pub status_text: String,
    /// Path of the last completed download
    pub last_download: Option<PathBuf>,
}

impl Session {
    pub fn new(mode: DownloadMode, folder: Option<PathBuf>) -> Self {
        Self {
            metadata: None,
            thumbnail: Thumbnail::Empty,
            streams: Vec::new(),
            candidates: Vec::new(),
            mode,
            resolution: None,
            selection: None,
            folder,
            progress: 0.0,
            status: SessionStatus::Idle,
            status_text: "Enter a URL and click 'Fetch Info'".to_owned(),
            last_download: None,
        }
    }

    /// Folder holding the last downloaded file, else the destination folder
    pub fn download_location(&self) -> Option<PathBuf> {
        self.last_download
            .as_deref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .or_else(|| self.folder.clone())
    }

    /// Size of the selected stream, or `N/A`
    pub fn size_text(&self) -> String {
        match &self.selection {
            Some(stream) => format_size(stream.filesize),
            None => "N/A".to_owned(),
        }
    }
}

/// Bytes rendered as mebibytes with two decimals
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
