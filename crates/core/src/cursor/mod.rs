//! Maps a playback position onto the lyric line being sung and the visual
//! parameters of every line around it.
//!
//! Evaluation is a pure function of its inputs and is meant to be re-run on
//! every clock tick.

use serde::{Deserialize, Serialize};

use crate::{LyricLine, LyricVideoError, Result};

/// Tuning for how lines fade out with their distance from the active line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    pub blur_per_line: f32,
    pub max_blur: f32,
    pub scale_step: f32,
    pub min_scale: f32,
    pub base_opacity: f32,
    pub opacity_step: f32,
    pub min_opacity: f32,
    pub active_scale: f32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            blur_per_line: 1.5,
            max_blur: 8.0,
            scale_step: 0.05,
            min_scale: 0.85,
            base_opacity: 0.6,
            opacity_step: 0.15,
            min_opacity: 0.1,
            active_scale: 1.1,
        }
    }
}

/// Visual parameters for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineParams {
    /// Blur radius in pixels.
    pub blur: f32,
    pub scale: f32,
    pub opacity: f32,
}

impl RenderStyle {
    /// Checks that the active line stands out and that blur grows while
    /// scale and opacity shrink with distance.
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.blur_per_line,
            self.max_blur,
            self.scale_step,
            self.min_scale,
            self.base_opacity,
            self.opacity_step,
            self.min_opacity,
            self.active_scale,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            return Err(LyricVideoError::InvalidInput(
                "render style values must be finite",
            ));
        }
        if self.blur_per_line < 0.0 || self.max_blur < 0.0 {
            return Err(LyricVideoError::InvalidInput(
                "blur must not decrease with distance",
            ));
        }
        if self.scale_step < 0.0 || self.min_scale > 1.0 {
            return Err(LyricVideoError::InvalidInput(
                "scale must not increase with distance",
            ));
        }
        if self.opacity_step < 0.0
            || self.min_opacity > self.base_opacity
            || self.base_opacity > 1.0
        {
            return Err(LyricVideoError::InvalidInput(
                "opacity must not increase with distance",
            ));
        }
        if self.active_scale <= 1.0 {
            return Err(LyricVideoError::InvalidInput(
                "the active line must be scaled above every other line",
            ));
        }
        Ok(())
    }

    /// Parameters for a line `distance` rows away from the active one.
    pub fn params(&self, distance: usize, active: bool) -> LineParams {
        if active {
            return LineParams {
                blur: 0.0,
                scale: self.active_scale,
                opacity: 1.0,
            };
        }

        let d = distance as f32;
        LineParams {
            blur: (d * self.blur_per_line).min(self.max_blur),
            scale: (1.0 - d * self.scale_step).max(self.min_scale),
            opacity: (self.base_opacity - d * self.opacity_step).max(self.min_opacity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineRender {
    pub index: usize,
    pub distance: usize,
    pub active: bool,
    pub params: LineParams,
}

/// Output of one evaluation of the cursor engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorFrame {
    /// `None` before the first line, for empty lyrics, or for a non-finite
    /// time.
    pub active: Option<usize>,
    pub effective_time: f64,
    pub lines: Vec<LineRender>,
}

impl CursorFrame {
    /// Whether there is nothing to show and the surface should fall back to
    /// its instrumental state.
    pub fn is_instrumental(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Index of the last line whose start time is at or before `time`.
///
/// Lines are expected in ascending order. For out-of-order input the result
/// is some index in range or `None`, never a panic.
pub fn active_index(lines: &[LyricLine], time: f64) -> Option<usize> {
    if !time.is_finite() {
        return None;
    }
    lines
        .partition_point(|line| line.time <= time)
        .checked_sub(1)
}

/// Evaluates the engine at `current_time + offset`.
pub fn evaluate(
    lines: &[LyricLine],
    current_time: f64,
    offset: f64,
    style: &RenderStyle,
) -> CursorFrame {
    let effective_time = current_time + offset;
    let active = active_index(lines, effective_time);

    let lines = (0..lines.len())
        .map(|index| {
            let is_active = active == Some(index);
            // With no active line, distances count from a virtual row above
            // the first line.
            let distance = match active {
                Some(active) => index.abs_diff(active),
                None => index + 1,
            };
            LineRender {
                index,
                distance,
                active: is_active,
                params: style.params(distance, is_active),
            }
        })
        .collect();

    CursorFrame {
        active,
        effective_time,
        lines,
    }
}

/// Fires a scroll-into-view request only when the active line changes.
#[derive(Debug, Default, Clone)]
pub struct ScrollTracker {
    last: Option<usize>,
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the line to scroll to, or `None` if nothing changed.
    pub fn update(&mut self, active: Option<usize>) -> Option<usize> {
        let index = active?;
        if self.last == Some(index) {
            return None;
        }
        self.last = Some(index);
        Some(index)
    }

    /// Forgets the last target so the next update scrolls again, e.g. after
    /// the lyric surface was hidden and shown.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn abc() -> Vec<LyricLine> {
        vec![
            LyricLine::new(0.0, "A"),
            LyricLine::new(2.0, "B"),
            LyricLine::new(5.0, "C"),
        ]
    }

    #[test]
    fn picks_line_containing_time() {
        let lines = abc();
        assert_eq!(active_index(&lines, 1.0), Some(0));
        assert_eq!(active_index(&lines, 2.0), Some(1));
        assert_eq!(active_index(&lines, 4.999), Some(1));
        assert_eq!(active_index(&lines, 5.0), Some(2));
        assert_eq!(active_index(&lines, 500.0), Some(2));
    }

    #[test]
    fn nothing_active_before_first_line() {
        let lines = vec![LyricLine::new(1.0, "late")];
        assert_eq!(active_index(&lines, 0.5), None);
        assert_eq!(active_index(&lines, f64::NAN), None);
        assert_eq!(active_index(&[], 3.0), None);
    }

    #[test]
    fn negative_offset_shifts_evaluation_time() {
        let lines = abc();
        let style = RenderStyle::default();

        let frame = evaluate(&lines, 1.0, -1.0, &style);
        assert_eq!(frame.active, Some(0));
        assert_relative_eq!(frame.effective_time, 0.0);

        assert_eq!(evaluate(&lines, 3.0, -1.0, &style).active, Some(1));
    }

    #[test]
    fn offset_matches_shifted_time() {
        let lines = abc();
        let style = RenderStyle::default();
        for step in 0..80 {
            let t = step as f64 * 0.1 - 1.0;
            for delta in [-1.5, -0.5, 0.0, 0.5, 2.0] {
                assert_eq!(
                    active_index(&lines, t + delta),
                    evaluate(&lines, t, delta, &style).active
                );
            }
        }
    }

    #[test]
    fn equal_start_times_resolve_to_last() {
        let lines = vec![
            LyricLine::new(0.0, "a"),
            LyricLine::new(2.0, "b"),
            LyricLine::new(2.0, "c"),
        ];
        assert_eq!(active_index(&lines, 2.0), Some(2));
    }

    #[test]
    fn empty_lyrics_render_instrumental() {
        let frame = evaluate(&[], 12.0, 0.0, &RenderStyle::default());
        assert_eq!(frame.active, None);
        assert!(frame.is_instrumental());
    }

    #[test]
    fn params_are_monotonic_in_distance() {
        let style = RenderStyle::default();
        for near in 1..12 {
            let a = style.params(near, false);
            let b = style.params(near + 1, false);
            assert!(a.blur <= b.blur);
            assert!(a.scale >= b.scale);
            assert!(a.opacity >= b.opacity);
        }

        let far = style.params(100, false);
        assert_relative_eq!(far.blur, 8.0);
        assert_relative_eq!(far.scale, 0.85);
        assert_relative_eq!(far.opacity, 0.1);
    }

    #[test]
    fn active_line_pops_out() {
        let frame = evaluate(&abc(), 2.5, 0.0, &RenderStyle::default());
        let active = frame.lines[1];
        assert!(active.active);
        assert_eq!(active.params.blur, 0.0);
        for line in frame.lines.iter().filter(|line| !line.active) {
            assert!(active.params.scale > line.params.scale);
        }
    }

    #[test]
    fn distances_count_from_virtual_row_when_inactive() {
        let lines = vec![LyricLine::new(3.0, "x"), LyricLine::new(4.0, "y")];
        let frame = evaluate(&lines, 0.0, 0.0, &RenderStyle::default());
        let distances: Vec<_> = frame.lines.iter().map(|line| line.distance).collect();
        assert_eq!(distances, vec![1, 2]);
        assert!(frame.lines.iter().all(|line| !line.active));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let lines = abc();
        let style = RenderStyle::default();
        assert_eq!(
            evaluate(&lines, 2.2, 0.3, &style),
            evaluate(&lines, 2.2, 0.3, &style)
        );
    }

    #[test]
    fn scroll_tracker_fires_once_per_change() {
        let mut tracker = ScrollTracker::new();
        assert_eq!(tracker.update(None), None);
        assert_eq!(tracker.update(Some(0)), Some(0));
        assert_eq!(tracker.update(Some(0)), None);
        assert_eq!(tracker.update(Some(1)), Some(1));

        tracker.reset();
        assert_eq!(tracker.update(Some(1)), Some(1));
    }
}
