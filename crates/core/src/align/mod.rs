//! Boundary to the AI lyric alignment service.
//!
//! The service itself is opaque: it receives raw lyric text plus the audio
//! and answers with a JSON array of timed lines. Everything coming back is
//! validated here before it can replace a track's lyrics.

use std::path::PathBuf;

use tracing::info;

use crate::{
    config::AlignmentConfig, lyric_text_lines, state::PlayerState, LyricLine, LyricVideoError,
    Result, TrackId,
};

/// Input for one alignment call.
#[derive(Debug, Clone)]
pub struct AlignmentRequest {
    pub raw_text: String,
    pub duration: f64,
    pub audio: Vec<u8>,
    pub mime_type: String,
}

impl AlignmentRequest {
    pub fn new(
        raw_text: impl Into<String>,
        duration: f64,
        audio: Vec<u8>,
        mime_type: impl Into<String>,
        config: &AlignmentConfig,
    ) -> Result<Self> {
        let raw_text = raw_text.into();
        if lyric_text_lines(&raw_text).next().is_none() {
            return Err(LyricVideoError::alignment("there are no lyrics to align"));
        }
        if !(duration.is_finite() && duration > 0.0) {
            return Err(LyricVideoError::alignment("track duration is unknown"));
        }
        if audio.is_empty() {
            return Err(LyricVideoError::alignment("audio data is missing"));
        }
        if audio.len() > config.max_upload_bytes {
            return Err(LyricVideoError::alignment(format!(
                "audio is too large ({:.1}MB, limit {:.1}MB)",
                megabytes(audio.len()),
                megabytes(config.max_upload_bytes)
            )));
        }

        Ok(Self {
            raw_text,
            duration,
            audio,
            mime_type: mime_type.into(),
        })
    }
}

fn megabytes(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// An alignment service. Returns the raw JSON body of the answer.
pub trait LyricAligner {
    fn align(&self, request: &AlignmentRequest) -> Result<String>;
}

/// Parses a service answer: drops lines timed outside
/// `[0, duration + tolerance]` and sorts the rest by start time.
pub fn parse_alignment_response(
    body: &str,
    duration: f64,
    tolerance: f64,
) -> Result<Vec<LyricLine>> {
    let lines: Vec<LyricLine> = serde_json::from_str(body)
        .map_err(|e| LyricVideoError::alignment(format!("malformed response: {e}")))?;

    let limit = duration + tolerance;
    let mut lines: Vec<LyricLine> = lines
        .into_iter()
        .filter(|line| line.time.is_finite() && line.time >= 0.0 && line.time <= limit)
        .collect();
    lines.sort_by(|a, b| a.time.total_cmp(&b.time));

    if lines.is_empty() {
        return Err(LyricVideoError::alignment(
            "the service returned no usable lyric lines",
        ));
    }
    Ok(lines)
}

/// Calls `aligner` and validates its answer. Every failure comes back as an
/// [`LyricVideoError::Alignment`].
pub fn align_lyrics(
    aligner: &dyn LyricAligner,
    request: &AlignmentRequest,
    config: &AlignmentConfig,
) -> Result<Vec<LyricLine>> {
    let body = aligner.align(request).map_err(|e| match e {
        LyricVideoError::Alignment(_) => e,
        other => LyricVideoError::alignment(other.to_string()),
    })?;
    parse_alignment_response(&body, request.duration, config.overflow_tolerance)
}

/// Re-aligns a track's current lyric text against its audio and replaces
/// the lines. On failure the existing lyrics are left as they were.
pub fn resync_track(
    state: &mut PlayerState,
    track_id: TrackId,
    aligner: &dyn LyricAligner,
    audio: Vec<u8>,
    mime_type: &str,
    config: &AlignmentConfig,
) -> Result<usize> {
    let track = state
        .track(track_id)
        .ok_or(LyricVideoError::UnknownTrack(track_id))?;
    let request = AlignmentRequest::new(
        track.raw_lyrics(),
        track.duration,
        audio,
        mime_type,
        config,
    )?;

    let lines = align_lyrics(aligner, &request, config)?;
    let count = lines.len();
    state.replace_lyrics(track_id, lines)?;
    info!(track = %track_id, lines = count, "lyrics re-aligned");
    Ok(count)
}

/// Aligner that answers with the contents of a saved response file.
#[derive(Debug, Clone)]
pub struct ResponseFileAligner {
    path: PathBuf,
}

impl ResponseFileAligner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LyricAligner for ResponseFileAligner {
    fn align(&self, _request: &AlignmentRequest) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            LyricVideoError::alignment(format!(
                "could not read response `{}`: {e}",
                self.path.display()
            ))
        })
    }
}
