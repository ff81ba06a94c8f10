//! Library, now-playing reference, global offset and the single path by
//! which playback time reaches the lyric surface.

use tracing::{debug, warn};

use crate::{
    cursor::{evaluate, CursorFrame, RenderStyle},
    lyrics::{LyricLine, Track, TrackId},
    record::ExportHost,
    timeline::{ClockEvent, PlaybackClock},
    LyricVideoError, Result,
};

/// Which audio element a time update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// The visible player.
    Player,
    /// The export's own audio element.
    Recording,
}

/// What the lyric surface should draw right now.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderView {
    pub visible: bool,
    pub frame: CursorFrame,
}

impl RenderView {
    pub fn is_instrumental(&self) -> bool {
        self.frame.is_instrumental()
    }
}

#[derive(Debug)]
pub struct PlayerState {
    tracks: Vec<Track>,
    now_playing: Option<TrackId>,
    offset: f64,
    current_time: f64,
    duration: f64,
    playing: bool,
    volume: f32,
    show_lyrics: bool,
    clean_mode: bool,
    notices: Vec<String>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerState {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            now_playing: None,
            offset: 0.0,
            current_time: 0.0,
            duration: 0.0,
            playing: false,
            volume: 1.0,
            show_lyrics: false,
            clean_mode: false,
            notices: Vec::new(),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.and_then(|id| self.track(id))
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Playback time with the global offset applied.
    pub fn effective_time(&self) -> f64 {
        self.current_time + self.offset
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn clean_mode(&self) -> bool {
        self.clean_mode
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn add_track(&mut self, track: Track) -> TrackId {
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Loads and plays `id`, or toggles play/pause if it is already loaded.
    /// Switching tracks resets the global offset.
    pub fn select_track(&mut self, id: TrackId, clock: &mut dyn PlaybackClock) -> Result<()> {
        if self.now_playing == Some(id) {
            return self.toggle_playback(clock);
        }
        let audio_url = self
            .track(id)
            .ok_or(LyricVideoError::UnknownTrack(id))?
            .audio_url
            .clone();

        self.now_playing = Some(id);
        self.offset = 0.0;
        self.current_time = 0.0;
        self.duration = 0.0;
        self.playing = false;

        clock.load(&audio_url);
        clock.set_volume(self.volume);
        clock.play()?;
        self.playing = true;
        Ok(())
    }

    pub fn toggle_playback(&mut self, clock: &mut dyn PlaybackClock) -> Result<()> {
        if self.now_playing.is_none() {
            return Ok(());
        }
        if self.playing {
            clock.pause();
            self.playing = false;
        } else {
            clock.play()?;
            self.playing = true;
        }
        Ok(())
    }

    pub fn seek(&mut self, clock: &mut dyn PlaybackClock, time: f64) {
        let mut time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        if self.duration > 0.0 {
            time = time.min(self.duration);
        }
        clock.seek(time);
        self.current_time = time;
    }

    pub fn set_volume(&mut self, clock: &mut dyn PlaybackClock, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        clock.set_volume(self.volume);
    }

    /// Sets the global offset to an absolute value. Stored line times are
    /// never touched.
    pub fn set_offset(&mut self, offset: f64) -> Result<()> {
        if !offset.is_finite() {
            return Err(LyricVideoError::InvalidInput("offset must be a finite number"));
        }
        self.offset = offset;
        Ok(())
    }

    /// Moves the offset by `steps` increments of `step` seconds, rounded to
    /// a tenth of a second.
    pub fn step_offset(&mut self, steps: i32, step: f64) -> Result<f64> {
        let offset = round_to(self.offset + f64::from(steps) * step, 1);
        self.set_offset(offset)?;
        Ok(self.offset)
    }

    pub fn reset_offset(&mut self) {
        self.offset = 0.0;
    }

    /// Sets the start time of one line, clamped to zero. The edit is
    /// rejected if it would put the line before its predecessor or after its
    /// successor.
    pub fn correct_line_time(&mut self, track_id: TrackId, index: usize, time: f64) -> Result<()> {
        if !time.is_finite() {
            return Err(LyricVideoError::InvalidInput("line time must be a finite number"));
        }
        let time = time.max(0.0);
        let track = self
            .tracks
            .iter_mut()
            .find(|track| track.id == track_id)
            .ok_or(LyricVideoError::UnknownTrack(track_id))?;

        let len = track.lyrics.len();
        if index >= len {
            return Err(LyricVideoError::LineOutOfRange { index, len });
        }
        let after_previous = index == 0 || track.lyrics[index - 1].time <= time;
        let before_next = index + 1 == len || time <= track.lyrics[index + 1].time;
        if !(after_previous && before_next) {
            return Err(LyricVideoError::LyricOrder { index, time });
        }

        track.lyrics[index].time = time;
        debug!(track = %track_id, index, time, "lyric line retimed");
        Ok(())
    }

    /// Shifts one line by `delta` seconds, rounded to hundredths.
    pub fn nudge_line(&mut self, track_id: TrackId, index: usize, delta: f64) -> Result<()> {
        let current = self
            .track(track_id)
            .ok_or(LyricVideoError::UnknownTrack(track_id))?
            .lyrics
            .get(index)
            .map(|line| line.time);
        let Some(current) = current else {
            let len = self.track(track_id).map_or(0, |track| track.lyrics.len());
            return Err(LyricVideoError::LineOutOfRange { index, len });
        };
        self.correct_line_time(track_id, index, round_to(current + delta, 2))
    }

    /// Swaps in a freshly aligned set of lines.
    pub fn replace_lyrics(&mut self, track_id: TrackId, lines: Vec<LyricLine>) -> Result<()> {
        if let Some(index) = lines.windows(2).position(|pair| pair[0].time > pair[1].time) {
            return Err(LyricVideoError::LyricOrder {
                index: index + 1,
                time: lines[index + 1].time,
            });
        }
        let track = self
            .tracks
            .iter_mut()
            .find(|track| track.id == track_id)
            .ok_or(LyricVideoError::UnknownTrack(track_id))?;
        debug!(track = %track_id, lines = lines.len(), "lyrics replaced");
        track.lyrics = lines;
        Ok(())
    }

    pub fn toggle_lyrics(&mut self) -> bool {
        self.show_lyrics = !self.show_lyrics;
        self.show_lyrics
    }

    /// Pauses the visible player ahead of an export and returns the track to
    /// record.
    pub fn prepare_export(&mut self, clock: &mut dyn PlaybackClock) -> Result<Track> {
        let track = self
            .now_playing()
            .cloned()
            .ok_or(LyricVideoError::InvalidInput("select a track before exporting"))?;
        clock.pause();
        self.playing = false;
        Ok(track)
    }

    /// The one place playback time enters the state. While clean mode is on
    /// only the recording's audio element is listened to.
    pub fn on_clock_event(&mut self, source: TimeSource, event: ClockEvent) {
        let accepted = match source {
            TimeSource::Player => !self.clean_mode,
            TimeSource::Recording => self.clean_mode,
        };
        if !accepted {
            return;
        }

        match event {
            ClockEvent::TimeUpdate(time) => self.current_time = time,
            ClockEvent::DurationChanged(duration) => self.duration = duration,
            ClockEvent::Ended => {
                if source == TimeSource::Player {
                    self.playing = false;
                }
            }
        }
    }

    /// Evaluates the lyric cursor for the now-playing track.
    pub fn render_view(&self, style: &RenderStyle) -> Option<RenderView> {
        let track = self.now_playing()?;
        Some(RenderView {
            visible: self.show_lyrics || self.clean_mode,
            frame: evaluate(&track.lyrics, self.current_time, self.offset, style),
        })
    }
}

impl ExportHost for PlayerState {
    fn enter_clean_mode(&mut self) {
        self.clean_mode = true;
    }

    fn leave_clean_mode(&mut self) {
        self.clean_mode = false;
    }

    fn playback_time(&mut self, seconds: f64) {
        self.on_clock_event(TimeSource::Recording, ClockEvent::TimeUpdate(seconds));
    }

    fn report(&mut self, error: &LyricVideoError) {
        warn!(kind = ?error.kind(), "{error}");
        self.notices.push(error.to_string());
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::timeline::SimulatedClock;

    fn track(title: &str) -> Track {
        Track::new(
            title,
            "Band",
            format!("blob:{title}"),
            10.0,
            vec![
                LyricLine::new(0.0, "A").with_translation("a"),
                LyricLine::new(2.0, "B"),
                LyricLine::new(5.0, "C"),
            ],
        )
        .unwrap()
    }

    fn loaded() -> (PlayerState, SimulatedClock, TrackId) {
        let mut state = PlayerState::new();
        let mut clock = SimulatedClock::new(10.0);
        let id = state.add_track(track("one"));
        state.select_track(id, &mut clock).unwrap();
        (state, clock, id)
    }

    #[test]
    fn selecting_new_track_loads_and_resets_offset() {
        let (mut state, mut clock, _) = loaded();
        state.set_offset(1.5).unwrap();
        let other = state.add_track(track("two"));

        state.select_track(other, &mut clock).unwrap();

        assert_eq!(state.offset(), 0.0);
        assert_eq!(clock.source(), Some("blob:two"));
        assert!(clock.is_playing());
        assert_eq!(state.now_playing().unwrap().title, "two");
    }

    #[test]
    fn reselecting_toggles_playback() {
        let (mut state, mut clock, id) = loaded();
        state.set_offset(-0.5).unwrap();

        state.select_track(id, &mut clock).unwrap();
        assert!(!state.is_playing());
        assert!(!clock.is_playing());
        assert_eq!(state.offset(), -0.5);

        state.select_track(id, &mut clock).unwrap();
        assert!(state.is_playing());
    }

    #[test]
    fn unknown_track_is_rejected() {
        let mut state = PlayerState::new();
        let mut clock = SimulatedClock::new(1.0);
        let missing = TrackId::new();
        assert!(matches!(
            state.select_track(missing, &mut clock),
            Err(LyricVideoError::UnknownTrack(_))
        ));
    }

    #[test]
    fn offset_steps_round_to_tenths() {
        let mut state = PlayerState::new();
        for _ in 0..3 {
            state.step_offset(1, 0.5).unwrap();
        }
        assert_relative_eq!(state.step_offset(-1, 0.1).unwrap(), 1.4);
        assert_relative_eq!(state.offset(), 1.4);

        state.reset_offset();
        assert_eq!(state.offset(), 0.0);
        assert!(state.set_offset(f64::INFINITY).is_err());
    }

    #[test]
    fn non_finite_offset_step_leaves_offset_unchanged() {
        let mut state = PlayerState::new();
        state.step_offset(2, 0.5).unwrap();

        for step in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                state.step_offset(1, step),
                Err(LyricVideoError::InvalidInput(_))
            ));
        }
        assert_eq!(state.offset(), 1.0);
    }

    #[test]
    fn correction_is_visible_through_now_playing() {
        let (mut state, _, id) = loaded();
        state.correct_line_time(id, 1, 2.5).unwrap();

        let line = &state.now_playing().unwrap().lyrics[1];
        assert_eq!(line.time, 2.5);
        assert_eq!(line.text, "B");
        assert_eq!(state.track(id).unwrap().lyrics[1].time, 2.5);
    }

    #[test]
    fn correction_is_idempotent() {
        let (mut state, _, id) = loaded();
        state.correct_line_time(id, 2, 4.0).unwrap();
        let once = state.track(id).unwrap().clone();
        state.correct_line_time(id, 2, 4.0).unwrap();
        assert_eq!(state.track(id).unwrap(), &once);
    }

    #[test]
    fn correction_clamps_to_zero_and_keeps_other_fields() {
        let (mut state, _, id) = loaded();
        state.correct_line_time(id, 0, -3.0).unwrap();
        let line = &state.track(id).unwrap().lyrics[0];
        assert_eq!(line.time, 0.0);
        assert_eq!(line.translation.as_deref(), Some("a"));
    }

    #[test]
    fn correction_that_breaks_order_is_rejected() {
        let (mut state, _, id) = loaded();
        let before = state.track(id).unwrap().clone();

        assert!(matches!(
            state.correct_line_time(id, 1, 6.0),
            Err(LyricVideoError::LyricOrder { index: 1, .. })
        ));
        assert!(matches!(
            state.correct_line_time(id, 9, 1.0),
            Err(LyricVideoError::LineOutOfRange { index: 9, len: 3 })
        ));
        assert_eq!(state.track(id).unwrap(), &before);

        state.correct_line_time(id, 1, 5.0).unwrap();
    }

    #[test]
    fn nudges_round_to_hundredths() {
        let (mut state, _, id) = loaded();
        state.nudge_line(id, 1, 0.1).unwrap();
        state.nudge_line(id, 1, 0.1).unwrap();
        state.nudge_line(id, 1, 0.1).unwrap();
        assert_eq!(state.track(id).unwrap().lyrics[1].time, 2.3);
    }

    #[test]
    fn replace_lyrics_requires_ascending_lines() {
        let (mut state, _, id) = loaded();
        let unsorted = vec![LyricLine::new(3.0, "x"), LyricLine::new(1.0, "y")];
        assert!(state.replace_lyrics(id, unsorted).is_err());
        assert_eq!(state.track(id).unwrap().lyrics.len(), 3);

        state
            .replace_lyrics(id, vec![LyricLine::new(1.0, "only")])
            .unwrap();
        assert_eq!(state.now_playing().unwrap().lyrics.len(), 1);
    }

    #[test]
    fn recording_time_wins_while_in_clean_mode() {
        let (mut state, _, _) = loaded();
        state.on_clock_event(TimeSource::Player, ClockEvent::TimeUpdate(4.0));
        assert_eq!(state.current_time(), 4.0);

        state.enter_clean_mode();
        state.on_clock_event(TimeSource::Player, ClockEvent::TimeUpdate(9.0));
        state.playback_time(2.5);
        assert_eq!(state.current_time(), 2.5);

        state.leave_clean_mode();
        state.playback_time(7.0);
        assert_eq!(state.current_time(), 2.5);
    }

    #[test]
    fn render_view_is_forced_visible_in_clean_mode() {
        let (mut state, _, _) = loaded();
        let style = RenderStyle::default();
        assert!(!state.render_view(&style).unwrap().visible);

        state.enter_clean_mode();
        state.playback_time(2.0);
        let view = state.render_view(&style).unwrap();
        assert!(view.visible);
        assert_eq!(view.frame.active, Some(1));
    }

    #[test]
    fn offset_is_applied_to_render_view() {
        let (mut state, _, _) = loaded();
        state.on_clock_event(TimeSource::Player, ClockEvent::TimeUpdate(3.0));
        state.set_offset(-1.0).unwrap();
        let view = state.render_view(&RenderStyle::default()).unwrap();
        assert_eq!(view.frame.active, Some(1));
        assert_relative_eq!(state.effective_time(), 2.0);
    }

    #[test]
    fn empty_lyrics_render_instrumental() {
        let mut state = PlayerState::new();
        let mut clock = SimulatedClock::new(5.0);
        let id = state.add_track(Track::new("Inst", "Band", "blob:i", 5.0, Vec::new()).unwrap());
        state.select_track(id, &mut clock).unwrap();

        let view = state.render_view(&RenderStyle::default()).unwrap();
        assert!(view.is_instrumental());
        assert_eq!(view.frame.active, None);
    }

    #[test]
    fn player_end_stops_playback_flag() {
        let (mut state, mut clock, _) = loaded();
        clock.seek(9.5);
        for event in clock.advance(1.0) {
            state.on_clock_event(TimeSource::Player, event);
        }
        assert!(!state.is_playing());
        assert_eq!(state.duration(), 10.0);
        assert_eq!(state.current_time(), 10.0);
    }

    #[test]
    fn prepare_export_pauses_visible_player() {
        let (mut state, mut clock, _) = loaded();
        let track = state.prepare_export(&mut clock).unwrap();
        assert_eq!(track.title, "one");
        assert!(!clock.is_playing());
        assert!(!state.is_playing());
    }
}
