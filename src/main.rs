//! Main application for the YouTube Downloader GUI

// Data models for the session and its streams
mod model;
// Stream filtering and ranking
mod selector;
// Error taxonomy for fetch and download failures
mod error;
// Progress line parsing
mod progress;
// Thumbnail fetching and decoding
mod thumbnail;
// yt-dlp backed video source
mod source;
// Fetch/select/download workflow
mod orchestrator;
// Read-only settings
mod config;
// Tracing setup
mod logging;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
use egui::{TextureHandle, TextureOptions, Visuals};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// Folder picker and blocking message boxes
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use config::AppConfig;
use model::{DownloadMode, Notification, NotificationLevel, Session, SessionStatus, Thumbnail};
use orchestrator::Orchestrator;
use source::YtDlpSource;
use thumbnail::HttpThumbnails;

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: initializes runtime and launches GUI
fn main() -> anyhow::Result<()> {
    let config = match AppConfig::load() {
        Ok(config) => {
            logging::init_tracing(&config.log_filter);
            config
        }
        Err(e) => {
            let config = AppConfig::default();
            logging::init_tracing(&config.log_filter);
            warn!("Ignoring configuration: {e:#}");
            config
        }
    };

    let rt = Arc::new(Runtime::new().context("Failed to start the tokio runtime")?);
    let handle = RUNTIME.get_or_init(|| rt).handle().clone();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([650.0, 550.0])
            .with_resizable(false),
        ..Default::default()
    };

    info!("Starting YouTube Video Downloader");
    eframe::run_native(
        "YouTube Video Downloader",
        options,
        Box::new(move |cc| {
            let visuals = if config.dark_mode { Visuals::dark() } else { Visuals::light() };
            cc.egui_ctx.set_visuals(visuals);

            let ctx = cc.egui_ctx.clone();
            let orchestrator = Orchestrator::new(
                Session::new(config.default_mode, config.initial_folder()),
                Arc::new(YtDlpSource::new(config.ytdlp_path.clone())),
                Arc::new(HttpThumbnails::new(Duration::from_secs(
                    config.thumbnail_timeout_secs,
                ))),
                handle,
                Arc::new(move || ctx.request_repaint()),
            );
            Box::new(DownloaderApp::new(orchestrator))
        }),
    )
    .map_err(|e| anyhow::anyhow!("GUI event loop failed: {e}"))
}

/// Application state for the GUI
struct DownloaderApp {
    /// Input field for the video URL
    url_input: String,
    /// Owns the session and talks to the workers
    orchestrator: Orchestrator,
    /// Texture for the current thumbnail, rebuilt when the session's changes
    thumbnail: Option<TextureHandle>,
    /// Whether `thumbnail` reflects the session's image
    thumbnail_stale: bool,
}

impl DownloaderApp {
    fn new(orchestrator: Orchestrator) -> Self {
        Self {
            url_input: String::new(),
            orchestrator,
            thumbnail: None,
            thumbnail_stale: true,
        }
    }

    fn sync_thumbnail(&mut self, ctx: &egui::Context) {
        if !self.thumbnail_stale {
            return;
        }
        self.thumbnail = match &self.orchestrator.session().thumbnail {
            Thumbnail::Ready(img) => {
                Some(ctx.load_texture("thumbnail", img.clone(), TextureOptions::default()))
            }
            _ => None,
        };
        self.thumbnail_stale = false;
    }

    fn show_notifications(&mut self) {
        while let Some(Notification { level, title, body }) = self.orchestrator.take_notification() {
            let level = match level {
                NotificationLevel::Info => MessageLevel::Info,
                NotificationLevel::Error => MessageLevel::Error,
            };
            let _ = MessageDialog::new()
                .set_level(level)
                .set_title(title.as_str())
                .set_description(body.as_str())
                .set_buttons(MessageButtons::Ok)
                .show();
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Apply whatever the workers sent since the last frame
        let was_fetching = self.orchestrator.session().status == SessionStatus::Fetching;
        if self.orchestrator.pump() && was_fetching {
            self.thumbnail_stale = true;
        }
        self.sync_thumbnail(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            let enabled = self.orchestrator.controls_enabled();

            ui.horizontal(|ui| {
                ui.label("YouTube URL:");
                ui.add_enabled(
                    enabled,
                    egui::TextEdit::singleline(&mut self.url_input).desired_width(420.0),
                );
                if ui.add_enabled(enabled, egui::Button::new("Fetch Info")).clicked() {
                    self.orchestrator.fetch(&self.url_input);
                    self.thumbnail_stale = true;
                }
            });

            ui.separator();
            ui.label("Video Information");
            ui.group(|ui| {
                ui.horizontal(|ui| {
                    let session = self.orchestrator.session();
                    let (w, h) = (thumbnail::PREVIEW_WIDTH as f32, thumbnail::PREVIEW_HEIGHT as f32);
                    match &self.thumbnail {
                        Some(tex) => {
                            ui.add(egui::Image::new(tex).max_size(egui::vec2(w, h)));
                        }
                        None => {
                            ui.add_sized([w, h], egui::Label::new(session.thumbnail.placeholder()));
                        }
                    }
                    egui::Grid::new("info").num_columns(2).show(ui, |ui| {
                        let (title, duration) = match &session.metadata {
                            Some(m) => (m.title.clone(), m.duration_text()),
                            None => ("N/A".to_owned(), "N/A".to_owned()),
                        };
                        ui.label("Title:");
                        ui.add(egui::Label::new(title).wrap(true));
                        ui.end_row();
                        ui.label("Duration:");
                        ui.label(duration);
                        ui.end_row();
                        ui.label("Size:");
                        ui.label(session.size_text());
                        ui.end_row();
                    });
                });
            });

            ui.separator();
            ui.label("Download Options");
            ui.group(|ui| {
                let mut mode = self.orchestrator.session().mode;
                ui.add_enabled_ui(enabled, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Download Type:");
                        ui.radio_value(&mut mode, DownloadMode::VideoAudio, "Video + Audio");
                        ui.radio_value(&mut mode, DownloadMode::AudioOnly, "Audio Only");
                    });
                });
                if mode != self.orchestrator.session().mode {
                    self.orchestrator.set_mode(mode);
                }

                let labels = self.orchestrator.resolution_labels();
                let current = self.orchestrator.session().resolution.clone().unwrap_or_default();
                let mut picked = current.clone();
                ui.horizontal(|ui| {
                    ui.label("Resolution (Video):");
                    ui.add_enabled_ui(self.orchestrator.resolution_enabled(), |ui| {
                        egui::ComboBox::from_id_source("resolution")
                            .selected_text(picked.clone())
                            .width(140.0)
                            .show_ui(ui, |ui| {
                                for label in &labels {
                                    ui.selectable_value(&mut picked, label.clone(), label);
                                }
                            });
                    });
                });
                if picked != current {
                    self.orchestrator.set_resolution(&picked);
                }
            });

            ui.horizontal(|ui| {
                ui.label("Download Folder:");
                let folder = self
                    .orchestrator
                    .session()
                    .folder
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                ui.add_sized([420.0, 18.0], egui::Label::new(folder).truncate(true));
                if ui.add_enabled(enabled, egui::Button::new("Browse")).clicked() {
                    let mut dialog = FileDialog::new();
                    if let Some(current) = &self.orchestrator.session().folder {
                        dialog = dialog.set_directory(current);
                    }
                    if let Some(folder) = dialog.pick_folder() {
                        self.orchestrator.set_folder(folder);
                    }
                }
            });

            ui.vertical_centered(|ui| {
                let can_download = self.orchestrator.can_download();
                if ui.add_enabled(can_download, egui::Button::new("Download")).clicked() {
                    self.orchestrator.download();
                }
            });

            let session = self.orchestrator.session();
            ui.add(egui::ProgressBar::new(session.progress).show_percentage());
            ui.vertical_centered(|ui| {
                ui.label(&session.status_text);
            });

            // When done, offer to open the destination
            if session.status == SessionStatus::Complete {
                if let Some(folder) = session.download_location() {
                    ui.vertical_centered(|ui| {
                        if ui.button("Open Folder").clicked() {
                            open_folder(folder);
                        }
                    });
                }
            }
        });

        self.show_notifications();

        // Keep polling while a worker may be sending
        if !self.orchestrator.controls_enabled() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

/// Opens `folder` in the platform file manager
fn open_folder(folder: PathBuf) {
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(all(unix, not(target_os = "macos")))]
        let opener = "xdg-open";

        if let Err(e) = std::process::Command::new(opener).arg(&folder).spawn() {
            error!(folder = %folder.display(), error = %e, "Could not open folder");
        }
    });
}
