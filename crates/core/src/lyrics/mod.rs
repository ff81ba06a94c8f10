//! Track and lyric line data model.

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LyricVideoError, Result};

/// Opaque identifier of a track in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single timed lyric line. `time` is the start of the line in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub time: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl LyricLine {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
            translation: None,
        }
    }

    pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
        self.translation = Some(translation.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub cover_url: String,
    pub audio_url: String,
    pub duration: f64,
    pub lyrics: Vec<LyricLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_color: Option<String>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        audio_url: impl Into<String>,
        duration: f64,
        lyrics: Vec<LyricLine>,
    ) -> Result<Self> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(LyricVideoError::InvalidInput(
                "track duration must be a positive number of seconds",
            ));
        }
        if !is_ascending(&lyrics) {
            return Err(LyricVideoError::InvalidInput(
                "lyric lines must be sorted by start time",
            ));
        }

        Ok(Self {
            id: TrackId::new(),
            title: title.into(),
            artist: artist.into(),
            cover_url: String::new(),
            audio_url: audio_url.into(),
            duration,
            lyrics,
            dominant_color: None,
        })
    }

    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = cover_url.into();
        self
    }

    pub fn with_dominant_color(mut self, color: impl Into<String>) -> Self {
        self.dominant_color = Some(color.into());
        self
    }

    /// Rebuilds the plain lyric text, one line per row, for re-alignment.
    pub fn raw_lyrics(&self) -> String {
        self.lyrics
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Returns the non-empty, trimmed lines of a raw lyric text.
pub fn lyric_text_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Whether every line starts no earlier than the one before it.
pub fn is_ascending(lines: &[LyricLine]) -> bool {
    lines.windows(2).all(|pair| pair[0].time <= pair[1].time)
}

/// Loads a JSON array of lyric lines from disk.
pub fn load_lines(path: impl AsRef<Path>) -> Result<Vec<LyricLine>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let lines: Vec<LyricLine> = serde_json::from_str(&raw)?;
    if !is_ascending(&lines) {
        return Err(LyricVideoError::msg(format!(
            "lyric lines in `{}` are not sorted by start time",
            path.as_ref().display()
        )));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_lyrics_joins_line_texts() {
        let track = Track::new(
            "Song",
            "Band",
            "song.mp3",
            30.0,
            vec![LyricLine::new(0.0, "one"), LyricLine::new(2.0, "two")],
        )
        .unwrap();

        assert_eq!(track.raw_lyrics(), "one\ntwo");
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(Track::new("Song", "Band", "song.mp3", 0.0, Vec::new()).is_err());
        assert!(Track::new("Song", "Band", "song.mp3", f64::NAN, Vec::new()).is_err());
    }

    #[test]
    fn text_lines_skip_blank_rows() {
        let lines: Vec<_> = lyric_text_lines("  first \n\n second\n   \n").collect();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let track = Track::new("Song", "Band", "blob:audio", 10.0, Vec::new())
            .unwrap()
            .with_dominant_color("rgb(1, 2, 3)");
        let json = serde_json::to_value(&track).unwrap();

        assert_eq!(json["audioUrl"], "blob:audio");
        assert_eq!(json["dominantColor"], "rgb(1, 2, 3)");
    }

    #[test]
    fn ascending_allows_equal_neighbours() {
        let lines = vec![
            LyricLine::new(1.0, "a"),
            LyricLine::new(1.0, "b"),
            LyricLine::new(0.5, "c"),
        ];
        assert!(is_ascending(&lines[..2]));
        assert!(!is_ascending(&lines));
    }
}
