use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
    sync::mpsc::UnboundedSender,
};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::model::{ResolvedVideo, StreamDescriptor, VideoMetadata};
use crate::progress::{
    FILE_PREFIX, PROGRESS_PREFIX, TransferProgress, parse_final_path, parse_progress_line,
};

/// Resolves video pages and transfers their streams.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Metadata plus every stream the page offers
    async fn resolve(&self, url: &str) -> Result<ResolvedVideo, SourceError>;

    /// Downloads `stream` into `folder`, reporting byte counters on `progress`.
    /// Returns the path of the written file.
    async fn download(
        &self,
        stream: &StreamDescriptor,
        folder: &Path,
        progress: UnboundedSender<TransferProgress>,
    ) -> Result<PathBuf, SourceError>;
}

/// Optional yt-dlp build shipped inside the binary
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

/// [`VideoSource`] backed by the yt-dlp executable
pub struct YtDlpSource {
    binary: PathBuf,
}

impl YtDlpSource {
    /// Uses `configured` when given, else a bundled build, else `yt-dlp` on `PATH`.
    pub fn new(configured: Option<PathBuf>) -> Self {
        let binary = configured
            .or_else(|| match extract_bundled() {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "Could not unpack bundled yt-dlp");
                    None
                }
            })
            .unwrap_or_else(|| PathBuf::from(binary_name()));
        info!(binary = %binary.display(), "Using yt-dlp");
        Self { binary }
    }
}

fn binary_name() -> &'static str {
    if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" }
}

/// Writes the embedded binary to the temp dir once; `None` when nothing is bundled.
fn extract_bundled() -> std::io::Result<Option<PathBuf>> {
    let bin = binary_name();
    let Some(data) = Asset::get(bin) else {
        return Ok(None);
    };
    let tmp = std::env::temp_dir().join(bin);
    if !tmp.exists() {
        let mut f = File::create(&tmp)?;
        f.write_all(&data.data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
    }
    Ok(Some(tmp))
}

#[async_trait]
impl VideoSource for YtDlpSource {
    async fn resolve(&self, url: &str) -> Result<ResolvedVideo, SourceError> {
        info!(%url, "Resolving video");
        let output = Command::new(&self.binary)
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "--encoding",
                "utf-8",
                url,
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(%stderr, "yt-dlp resolve failed");
            return Err(SourceError::classify(&stderr));
        }
        parse_info(&output.stdout, url)
    }

    async fn download(
        &self,
        stream: &StreamDescriptor,
        folder: &Path,
        progress: UnboundedSender<TransferProgress>,
    ) -> Result<PathBuf, SourceError> {
        info!(format = %stream.format_id, folder = %folder.display(), "Starting download");
        let args = vec![
            "-f".to_owned(),
            stream.format_id.clone(),
            "--no-playlist".to_owned(),
            "--encoding".to_owned(),
            "utf-8".to_owned(),
            "--newline".to_owned(),
            "--progress".to_owned(),
            "--no-simulate".to_owned(),
            "--progress-template".to_owned(),
            format!(
                "download:{PROGRESS_PREFIX}%(progress.downloaded_bytes)s/%(progress.total_bytes,progress.total_bytes_estimate)s"
            ),
            "--print".to_owned(),
            format!("after_move:{FILE_PREFIX}%(filepath)s"),
            "-o".to_owned(),
            folder.join("%(title)s.%(ext)s").to_string_lossy().into_owned(),
            stream.source_url.clone(),
        ];

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let out = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Unexpected("yt-dlp stdout was not captured".into()))?;
        let mut err = child
            .stderr
            .take()
            .ok_or_else(|| SourceError::Unexpected("yt-dlp stderr was not captured".into()))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        // titles may arrive in a legacy codepage despite --encoding; decode lossily
        let mut final_path = None;
        let mut lines = BufReader::new(out).split(b'\n');
        while let Some(raw) = lines.next_segment().await? {
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches('\r');
            debug!(%line, "yt-dlp");
            if let Some(p) = parse_progress_line(line) {
                // receiver gone means the session moved on; keep draining output
                let _ = progress.send(p);
            } else if let Some(path) = parse_final_path(line) {
                final_path = Some(path);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(SourceError::classify(&stderr));
        }

        Ok(final_path.unwrap_or_else(|| {
            warn!("yt-dlp did not report the output file");
            folder.to_path_buf()
        }))
    }
}

#[derive(Deserialize)]
struct InfoJson {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Deserialize)]
struct FormatJson {
    format_id: String,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| !c.is_empty() && c != "none")
}

/// Maps `--dump-single-json` output onto our model.
fn parse_info(stdout: &[u8], url: &str) -> Result<ResolvedVideo, SourceError> {
    let info: InfoJson = serde_json::from_slice(stdout)
        .map_err(|e| SourceError::SourceProtocol(format!("Failed to parse yt-dlp JSON: {e}")))?;

    let metadata = VideoMetadata {
        title: info.title.unwrap_or_else(|| "Unknown".to_owned()),
        duration_secs: info.duration.filter(|d| *d > 0.0).unwrap_or(0.0) as u64,
        thumbnail_url: info.thumbnail.unwrap_or_default(),
    };

    let streams = info
        .formats
        .into_iter()
        .map(|f| {
            let has_video = has_codec(&f.vcodec);
            let has_audio = has_codec(&f.acodec);
            let size = f.filesize.or(f.filesize_approx).filter(|s| *s > 0.0);
            StreamDescriptor {
                source_url: url.to_owned(),
                format_id: f.format_id,
                container: f.ext.unwrap_or_default(),
                resolution: f.height.filter(|_| has_video).map(|h| format!("{h}p")),
                bitrate: f
                    .abr
                    .filter(|a| has_audio && *a > 0.0)
                    .map(|a| format!("{}kbps", a.round() as u32)),
                filesize: size.unwrap_or(0.0) as u64,
                has_video,
                has_audio,
            }
        })
        .collect();

    Ok(ResolvedVideo { metadata, streams })
}
