//! Fetch → select → download workflow.
//!
//! The orchestrator lives on the UI thread and owns the [`Session`]. Workers run
//! on the tokio runtime and only ever talk back through a channel; the UI loop
//! calls [`Orchestrator::pump`] each frame to apply what they sent. Each fetch or
//! download gets a generation number so results from an older one are dropped.

use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::model::{
    DownloadMode, Notification, ResolvedVideo, Session, SessionStatus, Thumbnail,
};
use crate::progress::TransferProgress;
use crate::selector;
use crate::source::VideoSource;
use crate::thumbnail::ThumbnailSource;

const FETCHED_STATUS: &str = "Video info fetched. Select options and download.";

/// Hook workers call after sending, so the UI wakes up to pump
pub type Repaint = Arc<dyn Fn() + Send + Sync>;

/// Messages from workers to the UI thread
#[derive(Debug)]
pub enum WorkerEvent {
    Fetched {
        generation: u64,
        result: Result<(ResolvedVideo, Thumbnail), SourceError>,
    },
    Progress {
        generation: u64,
        progress: TransferProgress,
    },
    Downloaded {
        generation: u64,
        result: Result<PathBuf, SourceError>,
    },
}

pub struct Orchestrator {
    session: Session,
    source: Arc<dyn VideoSource>,
    thumbnails: Arc<dyn ThumbnailSource>,
    runtime: Handle,
    tx: UnboundedSender<WorkerEvent>,
    rx: UnboundedReceiver<WorkerEvent>,
    generation: u64,
    notifications: VecDeque<Notification>,
    repaint: Repaint,
}

impl Orchestrator {
    pub fn new(
        session: Session,
        source: Arc<dyn VideoSource>,
        thumbnails: Arc<dyn ThumbnailSource>,
        runtime: Handle,
        repaint: Repaint,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            session,
            source,
            thumbnails,
            runtime,
            tx,
            rx,
            generation: 0,
            notifications: VecDeque::new(),
            repaint,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Inputs are usable: no worker is running
    pub fn controls_enabled(&self) -> bool {
        !self.session.status.is_busy()
    }

    /// Download is allowed: idle, something selected and a folder set
    pub fn can_download(&self) -> bool {
        self.controls_enabled()
            && self.session.metadata.is_some()
            && self.session.selection.is_some()
            && self.session.folder.is_some()
    }

    /// Resolution picker is usable
    pub fn resolution_enabled(&self) -> bool {
        self.controls_enabled()
            && self.session.mode == DownloadMode::VideoAudio
            && !self.session.candidates.is_empty()
    }

    pub fn resolution_labels(&self) -> Vec<String> {
        match self.session.mode {
            DownloadMode::VideoAudio => selector::resolution_labels(&self.session.candidates),
            DownloadMode::AudioOnly => Vec::new(),
        }
    }

    /// Next dialog the UI should show
    pub fn take_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front()
    }

    /// Starts resolving `url`. An empty URL only raises a validation error.
    pub fn fetch(&mut self, url: &str) {
        let url = url.trim().to_owned();
        if url.is_empty() {
            self.notifications
                .push_back(Notification::error("Error", "Please enter a YouTube URL."));
            return;
        }
        if !self.controls_enabled() {
            debug!("fetch ignored while busy");
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let s = &mut self.session;
        s.metadata = None;
        s.streams.clear();
        s.candidates.clear();
        s.resolution = None;
        s.selection = None;
        s.thumbnail = Thumbnail::Loading;
        s.progress = 0.0;
        s.status = SessionStatus::Fetching;
        s.status_text = "Fetching video information...".to_owned();
        info!(%url, generation, "Fetching video information");

        let source = Arc::clone(&self.source);
        let thumbnails = Arc::clone(&self.thumbnails);
        let tx = self.tx.clone();
        let repaint = Arc::clone(&self.repaint);
        self.runtime.spawn(async move {
            let result = match source.resolve(&url).await {
                Ok(video) => {
                    let thumb_url = video.metadata.thumbnail_url.clone();
                    let thumbnail =
                        tokio::task::spawn_blocking(move || thumbnails.fetch(&thumb_url))
                            .await
                            .unwrap_or(Thumbnail::Unavailable);
                    Ok((video, thumbnail))
                }
                Err(e) => Err(e),
            };
            let _ = tx.send(WorkerEvent::Fetched { generation, result });
            repaint();
        });
    }

    /// Switches between video and audio; the selection is always rebuilt.
    pub fn set_mode(&mut self, mode: DownloadMode) {
        if !self.controls_enabled() {
            return;
        }
        self.session.mode = mode;
        self.session.selection = None;
        self.recompute_selection();
    }

    /// Picks a resolution in video mode; an unknown label clears the selection.
    pub fn set_resolution(&mut self, label: &str) {
        if !self.controls_enabled() || self.session.mode != DownloadMode::VideoAudio {
            return;
        }
        self.session.resolution = Some(label.to_owned());
        self.session.selection = selector::reselect_by_resolution(&self.session.candidates, label);
    }

    pub fn set_folder(&mut self, folder: PathBuf) {
        if !self.controls_enabled() {
            return;
        }
        self.session.folder = Some(folder);
    }

    /// Starts transferring the selected stream into the chosen folder.
    pub fn download(&mut self) {
        if !self.controls_enabled() {
            debug!("download ignored while busy");
            return;
        }
        let (Some(meta), Some(stream)) = (&self.session.metadata, &self.session.selection) else {
            self.notifications.push_back(Notification::error(
                "Error",
                "No video fetched or stream selected.",
            ));
            return;
        };
        let Some(folder) = self.session.folder.clone() else {
            self.notifications
                .push_back(Notification::error("Error", "Please select a download folder."));
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        let stream = stream.clone();
        self.session.status_text = format!("Downloading: {}...", meta.title);
        self.session.status = SessionStatus::Downloading;
        self.session.progress = 0.0;
        info!(format = %stream.format_id, label = stream.label(), generation, "Starting download");

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let repaint = Arc::clone(&self.repaint);
        self.runtime.spawn(async move {
            let (ptx, mut prx) = unbounded_channel();
            let transfer = source.download(&stream, &folder, ptx);
            tokio::pin!(transfer);
            let result = loop {
                tokio::select! {
                    Some(progress) = prx.recv() => {
                        let _ = tx.send(WorkerEvent::Progress { generation, progress });
                        repaint();
                    }
                    r = &mut transfer => break r,
                }
            };
            while let Ok(progress) = prx.try_recv() {
                let _ = tx.send(WorkerEvent::Progress { generation, progress });
            }
            let _ = tx.send(WorkerEvent::Downloaded { generation, result });
            repaint();
        });
    }

    /// Applies everything workers sent since the last call. Returns whether
    /// anything changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
            changed = true;
        }
        changed
    }

    fn apply(&mut self, event: WorkerEvent) {
        let generation = match &event {
            WorkerEvent::Fetched { generation, .. }
            | WorkerEvent::Progress { generation, .. }
            | WorkerEvent::Downloaded { generation, .. } => *generation,
        };
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale worker event");
            return;
        }

        match event {
            WorkerEvent::Fetched { result, .. } => self.on_fetched(result),
            WorkerEvent::Progress { progress, .. } => self.on_progress(progress),
            WorkerEvent::Downloaded { result, .. } => self.on_downloaded(result),
        }
    }

    fn on_fetched(&mut self, result: Result<(ResolvedVideo, Thumbnail), SourceError>) {
        match result {
            Ok((video, thumbnail)) => {
                info!(title = %video.metadata.title, streams = video.streams.len(), "Video info fetched");
                let s = &mut self.session;
                s.metadata = Some(video.metadata);
                s.streams = video.streams;
                s.thumbnail = thumbnail;
                s.status = SessionStatus::Fetched;
                self.recompute_selection();
            }
            Err(e) => {
                warn!(error = %e, "Fetch failed");
                let s = &mut self.session;
                s.metadata = None;
                s.streams.clear();
                s.candidates.clear();
                s.resolution = None;
                s.selection = None;
                s.thumbnail = Thumbnail::Empty;
                s.status = SessionStatus::Failed;
                s.status_text = format!("Fetch Error: {}", e.status_line());
                self.notifications
                    .push_back(Notification::error("Fetch Error", e.user_message()));
            }
        }
    }

    fn on_progress(&mut self, progress: TransferProgress) {
        if self.session.status != SessionStatus::Downloading {
            return;
        }
        let fallback = self.session.selection.as_ref().map_or(0, |s| s.filesize);
        let fraction = progress.fraction(fallback);
        if fraction > self.session.progress {
            self.session.progress = fraction;
            self.session.status_text =
                format!("Downloading... {:.2}%", self.session.progress * 100.0);
        }
    }

    fn on_downloaded(&mut self, result: Result<PathBuf, SourceError>) {
        self.session.progress = 0.0;
        match result {
            Ok(path) => {
                info!(path = %path.display(), "Download complete");
                self.session.status = SessionStatus::Complete;
                self.session.status_text =
                    format!("Download Complete! Saved to: {}", path.display());
                self.notifications.push_back(Notification::info(
                    "Success",
                    format!("Download complete!\nSaved to: {}", path.display()),
                ));
                self.session.last_download = Some(path);
            }
            Err(e) => {
                warn!(error = %e, "Download failed");
                self.session.status = SessionStatus::Failed;
                self.session.status_text = format!("Error during download: {}", e.status_line());
                self.notifications.push_back(Notification::error(
                    "Download Error",
                    format!("Failed to download: {}", e.user_message()),
                ));
            }
        }
    }

    /// Rebuilds candidates and selection for the current mode.
    fn recompute_selection(&mut self) {
        let s = &mut self.session;
        s.selection = None;
        s.resolution = None;
        if s.metadata.is_none() {
            s.candidates.clear();
            return;
        }

        s.candidates = selector::select_streams(&s.streams, s.mode);
        match s.mode {
            DownloadMode::VideoAudio => {
                s.resolution = selector::default_selection(&s.candidates, s.mode)
                    .and_then(|d| d.resolution);
                if let Some(label) = s.resolution.as_deref() {
                    s.selection = selector::reselect_by_resolution(&s.candidates, label);
                }
            }
            DownloadMode::AudioOnly => {
                s.selection = selector::default_selection(&s.candidates, s.mode);
            }
        }
        s.status_text = if s.candidates.is_empty() {
            selector::no_eligible_streams(s.mode).to_owned()
        } else {
            FETCHED_STATUS.to_owned()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationLevel, StreamDescriptor, VideoMetadata};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    struct FakeSource {
        resolved: Result<ResolvedVideo, SourceError>,
        transfer: Vec<TransferProgress>,
        outcome: Result<PathBuf, SourceError>,
    }

    #[async_trait]
    impl VideoSource for FakeSource {
        async fn resolve(&self, _url: &str) -> Result<ResolvedVideo, SourceError> {
            self.resolved.clone()
        }

        async fn download(
            &self,
            _stream: &StreamDescriptor,
            _folder: &Path,
            progress: UnboundedSender<TransferProgress>,
        ) -> Result<PathBuf, SourceError> {
            for p in &self.transfer {
                let _ = progress.send(*p);
            }
            self.outcome.clone()
        }
    }

    struct NoThumbnail;

    impl ThumbnailSource for NoThumbnail {
        fn fetch(&self, _url: &str) -> Thumbnail {
            Thumbnail::Unavailable
        }
    }

    fn progressive(res: &str) -> StreamDescriptor {
        StreamDescriptor {
            source_url: "https://youtu.be/abc".into(),
            format_id: format!("fmt-{res}"),
            container: "mp4".into(),
            resolution: Some(res.into()),
            filesize: 2 * 1024 * 1024,
            has_video: true,
            has_audio: true,
            ..Default::default()
        }
    }

    fn audio(kbps: u32) -> StreamDescriptor {
        StreamDescriptor {
            format_id: format!("aud-{kbps}"),
            container: "m4a".into(),
            bitrate: Some(format!("{kbps}kbps")),
            filesize: 1024 * 1024,
            has_audio: true,
            ..Default::default()
        }
    }

    fn video(streams: Vec<StreamDescriptor>) -> ResolvedVideo {
        ResolvedVideo {
            metadata: VideoMetadata {
                title: "Clip".into(),
                duration_secs: 61,
                thumbnail_url: "https://i.ytimg.com/x.jpg".into(),
            },
            streams,
        }
    }

    fn source(resolved: Result<ResolvedVideo, SourceError>) -> FakeSource {
        FakeSource {
            resolved,
            transfer: Vec::new(),
            outcome: Ok(PathBuf::from("/downloads/Clip.mp4")),
        }
    }

    fn orchestrator(source: FakeSource) -> Orchestrator {
        Orchestrator::new(
            Session::new(DownloadMode::VideoAudio, Some(PathBuf::from("/downloads"))),
            Arc::new(source),
            Arc::new(NoThumbnail),
            Handle::current(),
            Arc::new(|| {}),
        )
    }

    /// Applies worker events until nothing is running; returns the progress
    /// values seen along the way.
    async fn settle(orch: &mut Orchestrator) -> Vec<f32> {
        let mut seen = Vec::new();
        while orch.session.status.is_busy() {
            let event = tokio::time::timeout(Duration::from_secs(5), orch.rx.recv())
                .await
                .expect("worker did not report back")
                .expect("channel closed");
            orch.apply(event);
            seen.push(orch.session.progress);
        }
        seen
    }

    fn four_streams() -> Vec<StreamDescriptor> {
        vec![
            progressive("1080p"),
            progressive("1080p"),
            progressive("720p"),
            progressive("480p"),
        ]
    }

    #[tokio::test]
    async fn empty_url_is_rejected_without_state_change() {
        let mut orch = orchestrator(source(Ok(video(four_streams()))));
        orch.fetch("   ");
        assert_eq!(orch.session().status, SessionStatus::Idle);
        let n = orch.take_notification().unwrap();
        assert_eq!(n.level, NotificationLevel::Error);
        assert!(n.body.contains("enter"));
    }

    #[tokio::test]
    async fn fetch_populates_and_selects_the_best_resolution() {
        let mut orch = orchestrator(source(Ok(video(four_streams()))));
        orch.fetch("https://youtu.be/abc");
        assert_eq!(orch.session().status, SessionStatus::Fetching);
        assert!(!orch.controls_enabled());
        assert!(!orch.can_download());

        settle(&mut orch).await;
        let s = orch.session();
        assert_eq!(s.status, SessionStatus::Fetched);
        assert_eq!(s.metadata.as_ref().unwrap().duration_text(), "1m 1s");
        assert_eq!(orch.resolution_labels(), ["1080p", "720p", "480p"]);
        assert_eq!(s.resolution.as_deref(), Some("1080p"));
        assert_eq!(s.selection.as_ref().unwrap().label(), "1080p");
        assert_eq!(s.size_text(), "2.00 MB");
        assert!(orch.can_download());
        assert!(orch.resolution_enabled());
    }

    #[tokio::test]
    async fn no_eligible_streams_keeps_download_disabled() {
        let mut adaptive = progressive("1080p");
        adaptive.has_audio = false;
        let mut orch = orchestrator(source(Ok(video(vec![adaptive]))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;

        assert_eq!(orch.session().selection, None);
        assert!(!orch.can_download());
        assert!(orch.session().status_text.contains("No eligible streams"));

        orch.set_mode(DownloadMode::AudioOnly);
        assert_eq!(orch.session().selection, None);
        assert!(orch.session().status_text.contains("No eligible streams"));
        assert!(orch.take_notification().is_none());
    }

    #[tokio::test]
    async fn unknown_resolution_clears_selection() {
        let mut orch = orchestrator(source(Ok(video(four_streams()))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;

        orch.set_resolution("720p");
        assert_eq!(orch.session().selection.as_ref().unwrap().label(), "720p");

        orch.set_resolution("144p");
        assert_eq!(orch.session().selection, None);
        assert_eq!(orch.session().size_text(), "N/A");
        assert!(!orch.can_download());
    }

    #[tokio::test]
    async fn mode_switch_rebuilds_selection() {
        let mut streams = four_streams();
        streams.push(audio(48));
        streams.push(audio(128));
        let mut orch = orchestrator(source(Ok(video(streams))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;
        orch.set_resolution("480p");

        orch.set_mode(DownloadMode::AudioOnly);
        assert_eq!(orch.session().selection.as_ref().unwrap().label(), "128kbps");
        assert!(orch.resolution_labels().is_empty());
        assert!(!orch.resolution_enabled());

        orch.set_mode(DownloadMode::VideoAudio);
        assert_eq!(orch.session().selection.as_ref().unwrap().label(), "1080p");
    }

    #[tokio::test]
    async fn switching_to_a_mode_with_streams_clears_no_eligible_status() {
        let mut adaptive = progressive("1080p");
        adaptive.has_audio = false;
        let mut orch = orchestrator(source(Ok(video(vec![adaptive, audio(128)]))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;
        assert!(orch.session().status_text.contains("No eligible streams"));

        orch.set_mode(DownloadMode::AudioOnly);
        assert_eq!(orch.session().selection.as_ref().unwrap().label(), "128kbps");
        assert_eq!(orch.session().status_text, FETCHED_STATUS);
    }

    #[tokio::test]
    async fn fetch_failure_resets_and_reenables() {
        let mut orch = orchestrator(source(Err(SourceError::ResourceUnavailable(
            "Private video".into(),
        ))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;

        let s = orch.session();
        assert_eq!(s.status, SessionStatus::Failed);
        assert!(s.metadata.is_none());
        assert!(s.candidates.is_empty());
        assert!(orch.controls_enabled());
        assert!(!orch.can_download());
        let n = orch.take_notification().unwrap();
        assert_eq!(n.title, "Fetch Error");
        assert!(n.body.contains("unavailable"));
    }

    #[tokio::test]
    async fn missing_thumbnail_does_not_interrupt_fetch() {
        let mut orch = orchestrator(source(Ok(video(four_streams()))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;

        assert!(matches!(orch.session().thumbnail, Thumbnail::Unavailable));
        assert_eq!(orch.session().thumbnail.placeholder(), "No thumbnail");
        assert_eq!(orch.session().status, SessionStatus::Fetched);
        assert!(orch.take_notification().is_none());
    }

    #[tokio::test]
    async fn download_reports_monotonic_progress_and_completes() {
        let mut src = source(Ok(video(four_streams())));
        let total = Some(100);
        src.transfer = vec![
            TransferProgress { done: 10, total },
            TransferProgress { done: 50, total },
            TransferProgress { done: 30, total },
            TransferProgress { done: 250, total },
        ];
        let mut orch = orchestrator(src);
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;

        orch.download();
        assert_eq!(orch.session().status, SessionStatus::Downloading);
        assert!(!orch.controls_enabled());
        orch.set_mode(DownloadMode::AudioOnly);
        assert_eq!(orch.session().mode, DownloadMode::VideoAudio);

        let seen = settle(&mut orch).await;
        let during = &seen[..seen.len() - 1];
        assert_eq!(during, [0.1, 0.5, 0.5, 1.0]);
        assert!(during.windows(2).all(|w| w[0] <= w[1]));

        let s = orch.session();
        assert_eq!(s.status, SessionStatus::Complete);
        assert_eq!(s.progress, 0.0);
        assert_eq!(s.last_download, Some(PathBuf::from("/downloads/Clip.mp4")));
        assert_eq!(s.download_location(), Some(PathBuf::from("/downloads")));
        assert_eq!(s.selection.as_ref().unwrap().label(), "1080p");
        assert!(orch.can_download());
        let n = orch.take_notification().unwrap();
        assert_eq!(n.level, NotificationLevel::Info);
        assert!(n.body.contains("/downloads/Clip.mp4"));
    }

    #[tokio::test]
    async fn open_folder_follows_the_file_not_a_later_browse() {
        let mut orch = orchestrator(source(Ok(video(four_streams()))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;
        orch.download();
        settle(&mut orch).await;

        orch.set_folder(PathBuf::from("/elsewhere"));
        assert_eq!(orch.session().folder, Some(PathBuf::from("/elsewhere")));
        assert_eq!(orch.session().download_location(), Some(PathBuf::from("/downloads")));
    }

    #[tokio::test]
    async fn download_failure_keeps_fetched_state() {
        let mut src = source(Ok(video(four_streams())));
        src.transfer = vec![TransferProgress { done: 40, total: None }];
        src.outcome = Err(SourceError::Network("connection reset".into()));
        let mut orch = orchestrator(src);
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;
        orch.set_resolution("720p");

        orch.download();
        settle(&mut orch).await;

        let s = orch.session();
        assert_eq!(s.status, SessionStatus::Failed);
        assert!(s.status_text.starts_with("Error during download"));
        assert_eq!(s.metadata.as_ref().unwrap().title, "Clip");
        assert_eq!(s.selection.as_ref().unwrap().label(), "720p");
        assert!(orch.controls_enabled());
        assert!(orch.can_download());
        assert_eq!(orch.take_notification().unwrap().title, "Download Error");
    }

    #[tokio::test]
    async fn download_without_selection_is_refused() {
        let mut orch = orchestrator(source(Ok(video(four_streams()))));
        orch.download();
        assert_eq!(orch.session().status, SessionStatus::Idle);
        assert!(orch.take_notification().unwrap().body.contains("No video fetched"));
    }

    #[tokio::test]
    async fn stale_events_are_dropped() {
        let mut orch = orchestrator(source(Ok(video(four_streams()))));
        orch.fetch("https://youtu.be/abc");
        settle(&mut orch).await;
        orch.fetch("https://youtu.be/def");

        orch.apply(WorkerEvent::Fetched {
            generation: 1,
            result: Err(SourceError::Unexpected("late".into())),
        });
        assert_eq!(orch.session().status, SessionStatus::Fetching);
        assert!(orch.take_notification().is_none());

        settle(&mut orch).await;
        assert_eq!(orch.session().status, SessionStatus::Fetched);
    }
}
