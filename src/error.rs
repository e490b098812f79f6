use thiserror::Error;

/// Failures reported by a video source while resolving or downloading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Malformed URL or one no extractor matches
    #[error("Invalid or unsupported URL: {0}")]
    UrlInvalid(String),

    /// Private, deleted or region-blocked content
    #[error("Video is unavailable (private, deleted, etc.): {0}")]
    ResourceUnavailable(String),

    /// The extractor no longer understands the site
    #[error("The extractor could not process the site response: {0}")]
    SourceProtocol(String),

    /// I/O failure talking to the network
    #[error("Network error: {0}")]
    Network(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl SourceError {
    /// Sorts yt-dlp diagnostics into the error taxonomy.
    pub fn classify(stderr: &str) -> Self {
        let detail = stderr
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with("ERROR:"))
            .or_else(|| stderr.lines().map(str::trim).find(|l| !l.is_empty()))
            .unwrap_or("no diagnostic output")
            .trim_start_matches("ERROR:")
            .trim()
            .to_owned();
        let s = stderr.to_lowercase();

        if s.contains("unsupported url")
            || s.contains("is not a valid url")
            || s.contains("invalid url")
            || s.contains("incomplete youtube id")
        {
            return Self::UrlInvalid(detail);
        }

        if s.contains("video unavailable")
            || s.contains("private video")
            || s.contains("has been removed")
            || s.contains("not available in your country")
            || s.contains("members-only")
            || s.contains("sign in to confirm your age")
        {
            return Self::ResourceUnavailable(detail);
        }

        if s.contains("timed out")
            || s.contains("timeout")
            || s.contains("connection reset")
            || s.contains("connection refused")
            || s.contains("name or service not known")
            || s.contains("temporary failure in name resolution")
            || s.contains("network is unreachable")
        {
            return Self::Network(detail);
        }

        if s.contains("unable to extract")
            || s.contains("http error 400")
            || s.contains("http error 403")
            || s.contains("http error 410")
            || s.contains("please report this issue")
            || s.contains("nsig extraction failed")
        {
            return Self::SourceProtocol(detail);
        }

        Self::Unexpected(detail)
    }

    /// Body of the blocking error dialog
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceProtocol(_) => format!(
                "{self}\n\nTry updating yt-dlp: yt-dlp -U (or pip install --upgrade yt-dlp)"
            ),
            _ => self.to_string(),
        }
    }

    /// First line of the message, for the status label
    pub fn status_line(&self) -> String {
        self.to_string().lines().next().unwrap_or_default().to_owned()
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::Unexpected(format!("yt-dlp executable not found ({e})"))
        } else {
            Self::Network(e.to_string())
        }
    }
}
