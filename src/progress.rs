use std::path::PathBuf;

/// Prefix of the lines produced by our `--progress-template`
pub const PROGRESS_PREFIX: &str = "ytfetch-progress:";
/// Prefix of the line printed once the file reached its final name
pub const FILE_PREFIX: &str = "ytfetch-file:";

/// Byte counters for a running transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub done: u64,
    /// `None` when the source can't tell yet
    pub total: Option<u64>,
}

impl TransferProgress {
    /// `done / total` clamped to [0, 1]; `fallback_total` covers sources that
    /// don't report a total. Unknown or zero totals give 0.
    pub fn fraction(&self, fallback_total: u64) -> f32 {
        let total = self.total.filter(|t| *t > 0).unwrap_or(fallback_total);
        if total == 0 {
            return 0.0;
        }
        (self.done as f64 / total as f64).clamp(0.0, 1.0) as f32
    }
}

/// Reads `ytfetch-progress:<downloaded>/<total>`, where either side may be `NA`.
pub fn parse_progress_line(line: &str) -> Option<TransferProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let (done, total) = rest.split_once('/')?;
    let done = parse_count(done)?;
    Some(TransferProgress {
        done,
        total: parse_count(total),
    })
}

/// Reads `ytfetch-file:<path>`
pub fn parse_final_path(line: &str) -> Option<PathBuf> {
    let path = line.trim_end_matches(['\r', '\n']).strip_prefix(FILE_PREFIX)?;
    if path.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

// yt-dlp prints estimates as floats ("1048576.0")
fn parse_count(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<u64>() {
        return Some(v);
    }
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counters() {
        assert_eq!(
            parse_progress_line("ytfetch-progress:512/2048"),
            Some(TransferProgress { done: 512, total: Some(2048) })
        );
        assert_eq!(
            parse_progress_line("ytfetch-progress:512/NA"),
            Some(TransferProgress { done: 512, total: None })
        );
        assert_eq!(
            parse_progress_line("ytfetch-progress:10/4096.0"),
            Some(TransferProgress { done: 10, total: Some(4096) })
        );
        assert_eq!(parse_progress_line("ytfetch-progress:NA/NA"), None);
        assert_eq!(parse_progress_line("[download] 50.0% of 1MiB"), None);
    }

    #[test]
    fn fraction_is_clamped() {
        let p = TransferProgress { done: 300, total: Some(200) };
        assert_eq!(p.fraction(0), 1.0);
        let p = TransferProgress { done: 50, total: None };
        assert_eq!(p.fraction(200), 0.25);
        assert_eq!(p.fraction(0), 0.0);
        let p = TransferProgress { done: 50, total: Some(0) };
        assert_eq!(p.fraction(100), 0.5);
    }

    #[test]
    fn final_path_keeps_spaces() {
        assert_eq!(
            parse_final_path("ytfetch-file:/tmp/My Video.mp4\n"),
            Some(PathBuf::from("/tmp/My Video.mp4"))
        );
        assert_eq!(parse_final_path("ytfetch-file:"), None);
        assert_eq!(parse_final_path("/tmp/x.mp4"), None);
    }
}
