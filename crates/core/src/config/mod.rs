use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{cursor::RenderStyle, LyricVideoError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderStyle,
    pub sync: SyncConfig,
    pub export: ExportConfig,
    pub alignment: AlignmentConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        if self.export.mime_preferences.is_empty() {
            return Err(LyricVideoError::InvalidInput(
                "at least one recording encoding must be configured",
            ));
        }
        if self.export.frame_rate == 0 {
            return Err(LyricVideoError::InvalidInput(
                "capture frame rate must be non-zero",
            ));
        }
        if self.sync.offset_step <= 0.0 || self.sync.line_step <= 0.0 {
            return Err(LyricVideoError::InvalidInput(
                "offset and line steps must be positive",
            ));
        }
        Ok(())
    }
}

/// Step sizes used by the timing editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Global offset change per step, in seconds.
    pub offset_step: f64,
    /// Per-line start time nudge, in seconds.
    pub line_step: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            offset_step: 0.5,
            line_step: 0.1,
        }
    }
}

/// Configuration options for the capture and recording subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub frame_rate: u32,
    pub video_bits_per_second: u32,
    /// Delay between entering clean mode and starting the recorder.
    pub settle_delay_ms: u64,
    /// Recorder encodings in order of preference.
    pub mime_preferences: Vec<String>,
}

impl ExportConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            video_bits_per_second: 8_000_000,
            settle_delay_ms: 800,
            mime_preferences: vec![
                "video/webm;codecs=vp9,opus".to_string(),
                "video/webm;codecs=vp8,opus".to_string(),
                "video/webm".to_string(),
            ],
        }
    }
}

/// Limits applied around the lyric alignment service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Lines timed later than `duration + overflow_tolerance` are discarded.
    pub overflow_tolerance: f64,
    pub max_upload_bytes: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            overflow_tolerance: 20.0,
            max_upload_bytes: 18 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "export": { "settle_delay_ms": 250 } }"#).unwrap();

        assert_eq!(config.export.settle_delay(), Duration::from_millis(250));
        assert_eq!(config.export.frame_rate, 60);
        assert_eq!(config.export.mime_preferences.len(), 3);
        assert_eq!(config.sync.offset_step, 0.5);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_empty_encoding_list() {
        let mut config = AppConfig::default();
        config.export.mime_preferences.clear();

        assert!(matches!(
            config.validate(),
            Err(LyricVideoError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_render_style_that_breaks_line_ordering() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "render": { "active_scale": 0.9, "blur_per_line": -1.0 } }"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(LyricVideoError::InvalidInput(_))
        ));

        let cases: [fn(&mut RenderStyle); 6] = [
            |style| style.active_scale = 1.0,
            |style| style.blur_per_line = -0.5,
            |style| style.scale_step = -0.05,
            |style| style.opacity_step = -0.1,
            |style| style.min_scale = 1.2,
            |style| style.min_opacity = 0.9,
        ];
        for tweak in cases {
            let mut config = AppConfig::default();
            tweak(&mut config.render);
            assert!(config.validate().is_err(), "{:?}", config.render);
        }
    }

    #[test]
    fn accepted_render_style_keeps_active_line_on_top() {
        let config = AppConfig::default();
        config.validate().unwrap();

        let style = &config.render;
        let active = style.params(0, true);
        let mut previous = style.params(1, false);
        assert!(active.scale > previous.scale);
        for distance in 2..12 {
            let next = style.params(distance, false);
            assert!(next.blur >= previous.blur);
            assert!(next.scale <= previous.scale);
            assert!(next.opacity <= previous.opacity);
            previous = next;
        }
    }
}
