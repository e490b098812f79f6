//! Filters and ranks the streams a source reports for the chosen mode.

use std::collections::HashSet;

use crate::model::{DownloadMode, StreamDescriptor};

/// Containers a progressive stream may come in
const VIDEO_CONTAINERS: &[&str] = &["mp4"];
/// Containers an audio-only stream may come in
const AUDIO_CONTAINERS: &[&str] = &["m4a", "mp4"];

/// Keeps the streams usable for `mode`, best first.
///
/// Video mode keeps progressive streams in a playable container, ordered by
/// resolution and reduced to one stream per resolution label. Audio mode keeps
/// audio-only streams ordered by bitrate.
pub fn select_streams(all: &[StreamDescriptor], mode: DownloadMode) -> Vec<StreamDescriptor> {
    match mode {
        DownloadMode::VideoAudio => {
            let mut streams: Vec<StreamDescriptor> = all
                .iter()
                .filter(|s| s.has_video && s.has_audio)
                .filter(|s| VIDEO_CONTAINERS.contains(&s.container.as_str()))
                .filter(|s| s.height().is_some())
                .cloned()
                .collect();
            // stable: the first stream reported for a resolution wins the dedup
            streams.sort_by(|a, b| b.height().cmp(&a.height()));
            let mut seen = HashSet::new();
            streams.retain(|s| seen.insert(s.resolution.clone()));
            streams
        }
        DownloadMode::AudioOnly => {
            let mut streams: Vec<StreamDescriptor> = all
                .iter()
                .filter(|s| s.has_audio && !s.has_video)
                .filter(|s| AUDIO_CONTAINERS.contains(&s.container.as_str()))
                .cloned()
                .collect();
            streams.sort_by(|a, b| {
                let a = a.bitrate_kbps().unwrap_or(0.0);
                let b = b.bitrate_kbps().unwrap_or(0.0);
                b.total_cmp(&a)
            });
            streams
        }
    }
}

/// Highest-ranked candidate, `None` when nothing is eligible.
///
/// In video mode this is only the default resolution; the UI confirms it
/// through [`reselect_by_resolution`] whenever the user picks another one.
pub fn default_selection(
    candidates: &[StreamDescriptor],
    _mode: DownloadMode,
) -> Option<StreamDescriptor> {
    candidates.first().cloned()
}

/// Candidate whose resolution label is exactly `label`
pub fn reselect_by_resolution(
    candidates: &[StreamDescriptor],
    label: &str,
) -> Option<StreamDescriptor> {
    candidates
        .iter()
        .find(|s| s.resolution.as_deref() == Some(label))
        .cloned()
}

/// Resolution labels offered in the resolution picker
pub fn resolution_labels(candidates: &[StreamDescriptor]) -> Vec<String> {
    candidates
        .iter()
        .filter_map(|s| s.resolution.clone())
        .collect()
}

/// Status line shown when a mode has no candidates
pub fn no_eligible_streams(mode: DownloadMode) -> &'static str {
    match mode {
        DownloadMode::VideoAudio => "No eligible streams: no progressive MP4 streams found for video.",
        DownloadMode::AudioOnly => "No eligible streams: no audio MP4 streams found.",
    }
}
