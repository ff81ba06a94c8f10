use crate::lyrics::TrackId;

/// Result alias that carries the custom [`LyricVideoError`] type.
pub type Result<T> = std::result::Result<T, LyricVideoError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LyricVideoError {
    /// The lyric alignment service failed or produced nothing usable. Retrying
    /// is the expected recovery.
    #[error("lyric alignment failed: {0}")]
    Alignment(String),
    /// Screen capture was denied, cancelled, or is unsupported.
    #[error("screen capture unavailable: {0}")]
    CapturePermission(String),
    /// The audio graph or recorder could not be built. Fatal to the current
    /// export attempt.
    #[error("media pipeline error: {0}")]
    MediaPipeline(String),
    /// Audio playback could not be started, usually because of an autoplay
    /// policy.
    #[error("playback error: {0}")]
    Playback(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("unknown track {0}")]
    UnknownTrack(TrackId),
    #[error("lyric line {index} does not exist ({len} lines)")]
    LineOutOfRange { index: usize, len: usize },
    /// A write would leave the lyric lines out of ascending order.
    #[error("line {index} at {time:.2}s would break ascending lyric order")]
    LyricOrder { index: usize, time: f64 },
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by the UI to decide how to present an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Alignment,
    CapturePermission,
    MediaPipeline,
    Playback,
    Other,
}

impl LyricVideoError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn alignment<T: Into<String>>(msg: T) -> Self {
        Self::Alignment(msg.into())
    }

    pub fn capture<T: Into<String>>(msg: T) -> Self {
        Self::CapturePermission(msg.into())
    }

    pub fn pipeline<T: Into<String>>(msg: T) -> Self {
        Self::MediaPipeline(msg.into())
    }

    pub fn playback<T: Into<String>>(msg: T) -> Self {
        Self::Playback(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Alignment(_) => ErrorKind::Alignment,
            Self::CapturePermission(_) => ErrorKind::CapturePermission,
            Self::MediaPipeline(_) => ErrorKind::MediaPipeline,
            Self::Playback(_) => ErrorKind::Playback,
            _ => ErrorKind::Other,
        }
    }

    /// Whether the error aborts the export attempt it occurred in.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::MediaPipeline
    }
}

impl From<&str> for LyricVideoError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LyricVideoError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(LyricVideoError::alignment("x")
            .to_string()
            .starts_with("lyric alignment failed:"));
        assert!(LyricVideoError::capture("x")
            .to_string()
            .starts_with("screen capture unavailable:"));
        assert!(LyricVideoError::pipeline("x")
            .to_string()
            .starts_with("media pipeline error:"));
        assert!(LyricVideoError::playback("x")
            .to_string()
            .starts_with("playback error:"));
    }

    #[test]
    fn only_pipeline_errors_are_fatal() {
        assert!(LyricVideoError::pipeline("recorder").is_fatal());
        assert!(!LyricVideoError::capture("denied").is_fatal());
        assert!(!LyricVideoError::playback("autoplay").is_fatal());
        assert!(!LyricVideoError::from("other").is_fatal());
        assert_eq!(LyricVideoError::from("other").kind(), ErrorKind::Other);
    }
}
