use crate::{LyricVideoError, Result};

/// Change notifications emitted by a [`PlaybackClock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    TimeUpdate(f64),
    /// Media metadata has loaded and the duration is known.
    DurationChanged(f64),
    Ended,
}

/// The audio element that drives playback. Implementations own the current
/// time; everything else only reads it or receives [`ClockEvent`]s.
pub trait PlaybackClock {
    fn current_time(&self) -> f64;
    fn duration(&self) -> Option<f64>;
    fn is_playing(&self) -> bool;
    /// Replaces the media source and rewinds to the start.
    fn load(&mut self, source: &str);
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn seek(&mut self, time: f64);
    fn set_volume(&mut self, volume: f32);
}

/// Deterministic clock that only moves when [`SimulatedClock::advance`] is
/// called. Used by the command line tools and tests.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    source: Option<String>,
    time_seconds: f64,
    media_duration: f64,
    duration: Option<f64>,
    metadata_pending: bool,
    playing: bool,
    volume: f32,
    block_autoplay: bool,
}

impl SimulatedClock {
    /// Creates a clock whose loaded media will report `media_duration`.
    pub fn new(media_duration: f64) -> Self {
        Self {
            source: None,
            time_seconds: 0.0,
            media_duration: media_duration.max(0.0),
            duration: None,
            metadata_pending: false,
            playing: false,
            volume: 1.0,
            block_autoplay: false,
        }
    }

    /// Makes every `play()` call fail as if blocked by an autoplay policy.
    pub fn blocking_autoplay(mut self) -> Self {
        self.block_autoplay = true;
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    /// Moves playback forward and returns the notifications a real media
    /// element would emit for that span.
    pub fn advance(&mut self, delta: f64) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        if self.metadata_pending {
            self.metadata_pending = false;
            self.duration = Some(self.media_duration);
            events.push(ClockEvent::DurationChanged(self.media_duration));
        }
        if !self.playing {
            return events;
        }

        self.time_seconds = (self.time_seconds + delta.max(0.0)).min(self.media_duration);
        events.push(ClockEvent::TimeUpdate(self.time_seconds));
        if self.time_seconds >= self.media_duration {
            self.playing = false;
            events.push(ClockEvent::Ended);
        }
        events
    }
}

impl PlaybackClock for SimulatedClock {
    fn current_time(&self) -> f64 {
        self.time_seconds
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn load(&mut self, source: &str) {
        self.source = Some(source.to_string());
        self.playing = false;
        self.duration = None;
        self.metadata_pending = true;
        self.reset();
    }

    fn play(&mut self) -> Result<()> {
        if self.source.is_none() {
            return Err(LyricVideoError::playback("no media source loaded"));
        }
        if self.block_autoplay {
            return Err(LyricVideoError::playback(
                "playback was blocked until the user interacts with the page",
            ));
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, time: f64) {
        self.time_seconds = time.clamp(0.0, self.media_duration);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}

/// Formats seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "0:00".to_string();
    }
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
