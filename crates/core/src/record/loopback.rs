use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use super::{
    orchestrator::{ExportHost, ExportOrchestrator, ExportStatus},
    platform::{
        Artifact, AudioPath, CapturePlatform, CaptureRequest, CaptureStream, EventSink,
        ExportEvent, MediaRecorder, MediaTrack, MixedStream, PlatformError, RecorderOptions,
        RecorderState, TrackKind,
    },
};
use crate::{LyricVideoError, Result, Track};

/// How many platform resources were opened and released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub captures_opened: usize,
    pub captures_stopped: usize,
    pub audio_opened: usize,
    pub audio_closed: usize,
    pub recorders_opened: usize,
    pub recorders_released: usize,
    pub recorder_starts: usize,
    pub recorder_stops: usize,
}

impl ResourceCounts {
    /// Resources opened and not yet released.
    pub fn live(&self) -> usize {
        self.captures_opened.saturating_sub(self.captures_stopped)
            + self.audio_opened.saturating_sub(self.audio_closed)
            + self.recorders_opened.saturating_sub(self.recorders_released)
    }

    /// Audio graphs and recorders ever created.
    pub fn allocated(&self) -> usize {
        self.audio_opened + self.recorders_opened
    }
}

#[derive(Debug)]
struct Shared {
    counts: ResourceCounts,
    capture_sink: Option<EventSink>,
    capture_live: bool,
    audio_sink: Option<EventSink>,
    audio_playing: bool,
    position: f64,
    recorder_sink: Option<EventSink>,
    recorder_state: RecorderState,
    mime_type: String,
    chunk_index: usize,
    settle_sink: Option<EventSink>,
    settle_delays: Vec<Duration>,
    artifacts: Vec<Artifact>,
}

impl Shared {
    fn new() -> Self {
        Self {
            counts: ResourceCounts::default(),
            capture_sink: None,
            capture_live: false,
            audio_sink: None,
            audio_playing: false,
            position: 0.0,
            recorder_sink: None,
            recorder_state: RecorderState::Inactive,
            mime_type: String::new(),
            chunk_index: 0,
            settle_sink: None,
            settle_delays: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    fn next_chunk(&mut self, label: &str) -> Vec<u8> {
        self.chunk_index += 1;
        format!("<{} {} #{}>", self.mime_type, label, self.chunk_index).into_bytes()
    }
}

type SharedHandle = Arc<Mutex<Shared>>;

/// Longest simulation [`run_export`] will step through.
const MAX_SIMULATED_STEPS: f64 = 10_000_000.0;

fn lock(shared: &SharedHandle) -> Result<MutexGuard<'_, Shared>> {
    shared
        .lock()
        .map_err(|_| LyricVideoError::msg("loopback platform state has been poisoned"))
}

fn lock_platform(
    shared: &SharedHandle,
) -> std::result::Result<MutexGuard<'_, Shared>, PlatformError> {
    lock(shared).map_err(|e| PlatformError::new(e.to_string()))
}

/// In-process capture platform on a simulated timeline.
///
/// Capture requests resolve on the next [`ExportOrchestrator::pump`], time
/// only moves through [`LoopbackPlatform::advance`], and the recorder emits
/// one synthetic chunk per step.
#[derive(Debug)]
pub struct LoopbackPlatform {
    shared: SharedHandle,
    duration: f64,
    deny: Option<String>,
    block_autoplay: bool,
    fail_audio_graph: bool,
    manual_settle: bool,
    supported: Option<Vec<String>>,
}

impl LoopbackPlatform {
    /// Creates a platform whose audio source lasts `duration` seconds.
    pub fn new(duration: f64) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::new())),
            duration: duration.max(0.0),
            deny: None,
            block_autoplay: false,
            fail_audio_graph: false,
            manual_settle: false,
            supported: None,
        }
    }

    /// Answers every capture request with a denial.
    pub fn deny_capture(mut self, reason: impl Into<String>) -> Self {
        self.deny = Some(reason.into());
        self
    }

    pub fn block_autoplay(mut self) -> Self {
        self.block_autoplay = true;
        self
    }

    pub fn failing_audio_graph(mut self) -> Self {
        self.fail_audio_graph = true;
        self
    }

    /// Limits the recorder to the given encodings.
    pub fn supporting<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported = Some(mime_types.into_iter().map(Into::into).collect());
        self
    }

    /// Holds the settle delay until [`LoopbackPlatform::elapse_settle`].
    pub fn manual_settle(mut self) -> Self {
        self.manual_settle = true;
        self
    }

    pub fn counts(&self) -> Result<ResourceCounts> {
        Ok(lock(&self.shared)?.counts.clone())
    }

    pub fn artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(lock(&self.shared)?.artifacts.clone())
    }

    pub fn settle_delays(&self) -> Result<Vec<Duration>> {
        Ok(lock(&self.shared)?.settle_delays.clone())
    }

    /// Moves the simulated timeline forward by `delta` seconds.
    pub fn advance(&mut self, delta: f64) -> Result<()> {
        let duration = self.duration;
        let mut shared = lock(&self.shared)?;

        if shared.recorder_state == RecorderState::Recording {
            let chunk = shared.next_chunk("chunk");
            if let Some(sink) = &shared.recorder_sink {
                sink.post(ExportEvent::RecorderData(chunk));
            }
        }

        if shared.audio_playing {
            shared.position = (shared.position + delta.max(0.0)).min(duration);
            let position = shared.position;
            if let Some(sink) = shared.audio_sink.clone() {
                sink.post(ExportEvent::AudioTime(position));
                if position >= duration {
                    shared.audio_playing = false;
                    sink.post(ExportEvent::AudioEnded);
                }
            }
        }
        Ok(())
    }

    /// Simulates the operator pressing the platform's "stop sharing" button.
    pub fn stop_sharing(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared)?;
        if !shared.capture_live {
            return Ok(());
        }
        shared.capture_live = false;
        if let Some(sink) = &shared.capture_sink {
            sink.post(ExportEvent::VideoTrackEnded);
        }
        Ok(())
    }

    /// Fires a settle delay held back by [`LoopbackPlatform::manual_settle`].
    pub fn elapse_settle(&mut self) -> Result<()> {
        if let Some(sink) = lock(&self.shared)?.settle_sink.take() {
            sink.post(ExportEvent::SettleElapsed);
        }
        Ok(())
    }
}

impl CapturePlatform for LoopbackPlatform {
    fn request_capture(&mut self, request: &CaptureRequest, events: EventSink) {
        if let Some(reason) = &self.deny {
            events.post(ExportEvent::CaptureDenied(reason.clone()));
            return;
        }

        tracing::debug!(frame_rate = request.frame_rate, "loopback capture granted");
        {
            let mut shared = match lock(&self.shared) {
                Ok(shared) => shared,
                Err(e) => {
                    events.post(ExportEvent::CaptureDenied(e.to_string()));
                    return;
                }
            };
            shared.counts.captures_opened += 1;
            shared.capture_live = true;
            shared.capture_sink = Some(events.clone());
        }
        events.post(ExportEvent::CaptureGranted(Box::new(LoopbackCapture {
            shared: self.shared.clone(),
        })));
    }

    fn build_audio_path(
        &mut self,
        audio_url: &str,
        events: EventSink,
    ) -> std::result::Result<Box<dyn AudioPath>, PlatformError> {
        if self.fail_audio_graph {
            return Err(PlatformError::new(format!(
                "cannot create a media element source for `{audio_url}`"
            )));
        }

        let mut shared = lock_platform(&self.shared)?;
        shared.counts.audio_opened += 1;
        shared.audio_sink = Some(events);
        shared.audio_playing = false;
        shared.position = 0.0;
        Ok(Box::new(LoopbackAudio {
            shared: self.shared.clone(),
            block_autoplay: self.block_autoplay,
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        match &self.supported {
            Some(supported) => supported.iter().any(|mime| mime == mime_type),
            None => true,
        }
    }

    fn create_recorder(
        &mut self,
        _stream: MixedStream,
        options: &RecorderOptions,
        events: EventSink,
    ) -> std::result::Result<Box<dyn MediaRecorder>, PlatformError> {
        if !self.is_type_supported(&options.mime_type) {
            return Err(PlatformError::new(format!(
                "`{}` is not supported",
                options.mime_type
            )));
        }

        let mut shared = lock_platform(&self.shared)?;
        shared.counts.recorders_opened += 1;
        shared.recorder_sink = Some(events);
        shared.recorder_state = RecorderState::Inactive;
        shared.mime_type = options.mime_type.clone();
        shared.chunk_index = 0;
        Ok(Box::new(LoopbackRecorder {
            shared: self.shared.clone(),
        }))
    }

    fn schedule_settle(&mut self, delay: Duration, events: EventSink) {
        if let Ok(mut shared) = lock(&self.shared) {
            shared.settle_delays.push(delay);
            if self.manual_settle {
                shared.settle_sink = Some(events);
                return;
            }
        }
        events.post(ExportEvent::SettleElapsed);
    }

    fn deliver(&mut self, artifact: Artifact) -> std::result::Result<(), PlatformError> {
        lock_platform(&self.shared)?.artifacts.push(artifact);
        Ok(())
    }
}

struct LoopbackCapture {
    shared: SharedHandle,
}

impl CaptureStream for LoopbackCapture {
    fn video_track(&self) -> Option<MediaTrack> {
        let live = lock(&self.shared).ok()?.capture_live;
        Some(MediaTrack {
            id: "loopback-video".to_string(),
            kind: TrackKind::Video,
            live,
        })
    }

    fn stop(&mut self) {
        if let Ok(mut shared) = lock(&self.shared) {
            shared.capture_live = false;
            shared.counts.captures_stopped += 1;
        }
    }
}

struct LoopbackAudio {
    shared: SharedHandle,
    block_autoplay: bool,
}

impl AudioPath for LoopbackAudio {
    fn output_track(&self) -> Option<MediaTrack> {
        Some(MediaTrack::live("loopback-audio", TrackKind::Audio))
    }

    fn play(&mut self) -> std::result::Result<(), PlatformError> {
        if self.block_autoplay {
            return Err(PlatformError::new(
                "play() failed because the user didn't interact with the document first",
            ));
        }
        lock_platform(&self.shared)?.audio_playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        if let Ok(mut shared) = lock(&self.shared) {
            shared.audio_playing = false;
        }
    }

    fn close(&mut self) {
        if let Ok(mut shared) = lock(&self.shared) {
            shared.audio_playing = false;
            shared.audio_sink = None;
            shared.counts.audio_closed += 1;
        }
    }
}

struct LoopbackRecorder {
    shared: SharedHandle,
}

impl MediaRecorder for LoopbackRecorder {
    fn state(&self) -> RecorderState {
        lock(&self.shared).map_or(RecorderState::Inactive, |shared| shared.recorder_state)
    }

    fn start(&mut self) -> std::result::Result<(), PlatformError> {
        let mut shared = lock_platform(&self.shared)?;
        if shared.recorder_state != RecorderState::Inactive {
            return Err(PlatformError::new("recorder is already running"));
        }
        shared.recorder_state = RecorderState::Recording;
        shared.counts.recorder_starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let Ok(mut shared) = lock(&self.shared) else {
            return;
        };
        shared.counts.recorder_stops += 1;
        if shared.recorder_state == RecorderState::Inactive {
            return;
        }
        shared.recorder_state = RecorderState::Inactive;
        let last = shared.next_chunk("final");
        if let Some(sink) = &shared.recorder_sink {
            sink.post(ExportEvent::RecorderData(last));
            sink.post(ExportEvent::RecorderStopped);
        }
    }
}

impl Drop for LoopbackRecorder {
    fn drop(&mut self) {
        if let Ok(mut shared) = lock(&self.shared) {
            shared.counts.recorders_released += 1;
            shared.recorder_sink = None;
        }
    }
}

/// Runs one export of `track` on the loopback platform, stepping the
/// simulated timeline by `step` seconds until the orchestrator is idle
/// again. If playback never finishes on its own, sharing is stopped once
/// the track's duration has elapsed.
pub fn run_export(
    orchestrator: &mut ExportOrchestrator,
    platform: &mut LoopbackPlatform,
    track: &Track,
    host: &mut dyn ExportHost,
    step: f64,
) -> Result<Artifact> {
    if !(step.is_finite() && step > 0.0) {
        return Err(LyricVideoError::InvalidInput("simulation step must be positive"));
    }

    let budget = (track.duration / step).ceil();
    if !(budget < MAX_SIMULATED_STEPS) {
        return Err(LyricVideoError::InvalidInput(
            "track is too long to simulate at this step size",
        ));
    }
    let max_steps = budget as usize + 1;

    let delivered = platform.artifacts()?.len();
    orchestrator.start(track, platform)?;

    let mut steps = 0;
    loop {
        orchestrator.pump(platform, host);
        if orchestrator.status() == ExportStatus::Idle {
            break;
        }
        if steps == max_steps {
            tracing::info!("track time elapsed, stopping capture");
            platform.stop_sharing()?;
        } else if steps > max_steps + 1 {
            return Err(LyricVideoError::msg("export did not finish"));
        }
        platform.advance(step)?;
        steps += 1;
    }

    match platform.artifacts()?.into_iter().nth(delivered) {
        Some(artifact) => Ok(artifact),
        None => Err(orchestrator
            .take_error()
            .unwrap_or_else(|| LyricVideoError::msg("export finished without a recording"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ExportConfig, state::PlayerState, LyricLine};

    fn track() -> Track {
        Track::new(
            "Song",
            "Band",
            "blob:song",
            2.0,
            vec![LyricLine::new(0.0, "A"), LyricLine::new(1.0, "B")],
        )
        .unwrap()
    }

    #[test]
    fn run_export_feeds_recording_time_into_player_state() {
        let mut state = PlayerState::new();
        state.add_track(track());

        let mut orchestrator = ExportOrchestrator::new(ExportConfig::default());
        let mut platform = LoopbackPlatform::new(2.0);
        let artifact =
            run_export(&mut orchestrator, &mut platform, &track(), &mut state, 0.5).unwrap();

        assert!(artifact.has_audio);
        assert_eq!(state.current_time(), 2.0);
        assert!(!state.clean_mode());
        assert_eq!(platform.counts().unwrap().live(), 0);
    }

    #[test]
    fn run_export_reports_denial() {
        let mut state = PlayerState::new();
        let mut orchestrator = ExportOrchestrator::new(ExportConfig::default());
        let mut platform = LoopbackPlatform::new(2.0).deny_capture("Permission denied");

        let err = run_export(&mut orchestrator, &mut platform, &track(), &mut state, 0.5)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CapturePermission);
        assert_eq!(state.notices().len(), 1);
    }

    #[test]
    fn run_export_stops_silent_recordings_after_track_time() {
        let mut state = PlayerState::new();
        let mut orchestrator = ExportOrchestrator::new(ExportConfig::default());
        let mut platform = LoopbackPlatform::new(2.0).block_autoplay();

        let artifact =
            run_export(&mut orchestrator, &mut platform, &track(), &mut state, 0.5).unwrap();
        assert!(!artifact.has_audio);
        assert_eq!(platform.counts().unwrap().live(), 0);
    }

    #[test]
    fn run_export_rejects_tracks_too_long_to_simulate() {
        let mut state = PlayerState::new();
        let mut orchestrator = ExportOrchestrator::new(ExportConfig::default());
        let long = Track::new("Song", "Band", "blob:song", 1e300, Vec::new()).unwrap();
        let mut platform = LoopbackPlatform::new(long.duration);

        let err = run_export(&mut orchestrator, &mut platform, &long, &mut state, 1.0 / 60.0)
            .unwrap_err();

        assert!(matches!(err, LyricVideoError::InvalidInput(_)));
        assert_eq!(orchestrator.status(), ExportStatus::Idle);
        assert_eq!(platform.counts().unwrap().captures_opened, 0);
    }

    #[test]
    fn poisoned_state_is_reported_as_an_error() {
        let mut platform = LoopbackPlatform::new(2.0);
        let shared = platform.shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("poison the loopback state");
        })
        .join();

        assert!(platform.counts().is_err());
        assert!(platform.advance(1.0).is_err());

        let mut state = PlayerState::new();
        let mut orchestrator = ExportOrchestrator::new(ExportConfig::default());
        assert!(run_export(&mut orchestrator, &mut platform, &track(), &mut state, 0.5).is_err());
    }
}
