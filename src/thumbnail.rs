use std::time::Duration;

use eframe::egui::ColorImage;
use tracing::warn;

use crate::model::Thumbnail;

/// Preview box the thumbnail is scaled into
pub const PREVIEW_WIDTH: u32 = 160;
pub const PREVIEW_HEIGHT: u32 = 90;

/// Anything that can turn a thumbnail URL into a preview.
///
/// Implementations never fail: every problem becomes [`Thumbnail::Unavailable`].
pub trait ThumbnailSource: Send + Sync {
    fn fetch(&self, url: &str) -> Thumbnail;
}

/// Blocking HTTP fetcher with a bounded timeout
pub struct HttpThumbnails {
    timeout: Duration,
}

impl HttpThumbnails {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn try_fetch(&self, url: &str) -> Result<ColorImage, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| e.to_string())?;
        let bytes = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(|e| e.to_string())?;
        decode_preview(&bytes).ok_or_else(|| "payload is not a decodable image".to_owned())
    }
}

impl ThumbnailSource for HttpThumbnails {
    fn fetch(&self, url: &str) -> Thumbnail {
        if url.is_empty() {
            return Thumbnail::Unavailable;
        }
        match self.try_fetch(url) {
            Ok(img) => Thumbnail::Ready(img),
            Err(e) => {
                warn!(%url, error = %e, "Error loading thumbnail");
                Thumbnail::Unavailable
            }
        }
    }
}

/// Decodes image bytes and shrinks them into the preview box, keeping the
/// aspect ratio. Images already smaller than the box are left alone.
pub fn decode_preview(bytes: &[u8]) -> Option<ColorImage> {
    let img = image::load_from_memory(bytes).ok()?;
    let img = if img.width() > PREVIEW_WIDTH || img.height() > PREVIEW_HEIGHT {
        img.thumbnail(PREVIEW_WIDTH, PREVIEW_HEIGHT)
    } else {
        img
    };
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &rgba))
}
