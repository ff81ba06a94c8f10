use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info, warn};

use super::{
    format::{artifact_file_name, negotiate_mime},
    platform::{
        Artifact, CapturePlatform, CaptureRequest, CaptureStream, EventSink, ExportEvent,
        MixedStream, PlatformError, RecorderOptions, RecorderState, SessionId,
    },
    session::SessionResources,
};
use crate::{config::ExportConfig, LyricVideoError, Result, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Idle,
    AwaitingCapturePermission,
    Recording,
    Finalizing,
}

/// The UI side of an export: clean mode, time feedback and error display.
pub trait ExportHost {
    /// Hide all chrome and force the lyric surface visible.
    fn enter_clean_mode(&mut self);
    fn leave_clean_mode(&mut self);
    /// Current time of the recording's audio, fed back so lyrics keep
    /// scrolling while the visible player is paused.
    fn playback_time(&mut self, seconds: f64);
    fn report(&mut self, error: &LyricVideoError);
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    artist: String,
    title: String,
    audio_url: String,
    mime_type: Option<String>,
    resources: SessionResources,
    chunks: Vec<Vec<u8>>,
    clean_mode: bool,
    recorder_started: bool,
    audio_started: bool,
}

impl ActiveSession {
    fn new(id: SessionId, track: &Track) -> Self {
        Self {
            id,
            artist: track.artist.clone(),
            title: track.title.clone(),
            audio_url: track.audio_url.clone(),
            mime_type: None,
            resources: SessionResources::new(),
            chunks: Vec::new(),
            clean_mode: false,
            recorder_started: false,
            audio_started: false,
        }
    }

    /// Builds the audio path, pairs it with the captured video and creates
    /// the recorder. Anything acquired is stored in `resources` so a failure
    /// part way through is still released.
    fn build_pipeline(
        &mut self,
        config: &ExportConfig,
        platform: &mut dyn CapturePlatform,
        sink: &EventSink,
    ) -> Result<()> {
        let audio = platform
            .build_audio_path(&self.audio_url, sink.clone())
            .map_err(|e| LyricVideoError::pipeline(format!("could not build the audio graph: {e}")))?;
        let audio_track = audio.output_track();
        self.resources.audio = Some(audio);

        let video_track = self
            .resources
            .capture
            .as_ref()
            .and_then(|capture| capture.video_track());
        let (Some(video), Some(audio)) = (video_track, audio_track) else {
            return Err(LyricVideoError::pipeline(
                "capture video and recording audio must both be available",
            ));
        };
        let stream = MixedStream::new(video, audio)
            .map_err(|e| LyricVideoError::pipeline(format!("could not combine streams: {e}")))?;

        let mime_type = negotiate_mime(&config.mime_preferences, |mime| {
            platform.is_type_supported(mime)
        })
        .ok_or_else(|| LyricVideoError::pipeline("no supported recording format is available"))?
        .to_string();

        let options = RecorderOptions {
            mime_type: mime_type.clone(),
            video_bits_per_second: config.video_bits_per_second,
        };
        let recorder = platform
            .create_recorder(stream, &options, sink.clone())
            .map_err(|e| LyricVideoError::pipeline(format!("could not create the recorder: {e}")))?;
        self.resources.recorder = Some(recorder);

        debug!(session = %self.id, %mime_type, "recording pipeline ready");
        self.mime_type = Some(mime_type);
        Ok(())
    }
}

/// Drives one export at a time through
/// `Idle -> AwaitingCapturePermission -> Recording -> Finalizing -> Idle`.
///
/// Platform callbacks arrive as [`ExportEvent`]s on a single queue and are
/// applied one by one through [`ExportOrchestrator::pump`]. Every exit edge
/// funnels through the same teardown, which runs once per session.
pub struct ExportOrchestrator {
    config: ExportConfig,
    status: ExportStatus,
    session: Option<ActiveSession>,
    next_id: u64,
    tx: Sender<(SessionId, ExportEvent)>,
    rx: Receiver<(SessionId, ExportEvent)>,
    last_error: Option<LyricVideoError>,
    completed: usize,
}

impl ExportOrchestrator {
    pub fn new(config: ExportConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            config,
            status: ExportStatus::Idle,
            session: None,
            next_id: 1,
            tx,
            rx,
            last_error: None,
            completed: 0,
        }
    }

    pub fn status(&self) -> ExportStatus {
        self.status
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn last_error(&self) -> Option<&LyricVideoError> {
        self.last_error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<LyricVideoError> {
        self.last_error.take()
    }

    /// Number of artifacts delivered so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Starts an export of `track` by asking the platform for a capture
    /// stream.
    pub fn start(&mut self, track: &Track, platform: &mut dyn CapturePlatform) -> Result<SessionId> {
        if self.status != ExportStatus::Idle {
            return Err(LyricVideoError::InvalidInput("an export is already in progress"));
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.last_error = None;
        self.session = Some(ActiveSession::new(id, track));
        self.status = ExportStatus::AwaitingCapturePermission;

        info!(session = %id, title = %track.title, "requesting screen capture");
        let request = CaptureRequest::current_tab(self.config.frame_rate);
        platform.request_capture(&request, self.sink(id));
        Ok(id)
    }

    /// Abandons an export that is still waiting for capture permission.
    /// Returns false in any other state: a running recording can only be
    /// ended by the platform.
    pub fn cancel(&mut self, host: &mut dyn ExportHost) -> bool {
        if self.status != ExportStatus::AwaitingCapturePermission {
            return false;
        }
        info!(session = ?self.session_id(), "export cancelled before capture started");
        self.finish_session(host);
        true
    }

    /// Applies every queued event and returns how many were handled.
    pub fn pump(&mut self, platform: &mut dyn CapturePlatform, host: &mut dyn ExportHost) -> usize {
        let mut handled = 0;
        while let Ok((session, event)) = self.rx.try_recv() {
            self.handle(session, event, platform, host);
            handled += 1;
        }
        handled
    }

    pub fn handle(
        &mut self,
        session: SessionId,
        event: ExportEvent,
        platform: &mut dyn CapturePlatform,
        host: &mut dyn ExportHost,
    ) {
        if self.session_id() != Some(session) {
            debug!(%session, ?event, "dropping event for a closed session");
            if let ExportEvent::CaptureGranted(mut stream) = event {
                stream.stop();
            }
            return;
        }

        match (self.status, event) {
            (ExportStatus::AwaitingCapturePermission, ExportEvent::CaptureGranted(stream)) => {
                self.on_capture_granted(stream, platform, host)
            }
            (ExportStatus::AwaitingCapturePermission, ExportEvent::CaptureDenied(reason)) => {
                self.abort(LyricVideoError::capture(reason), host)
            }
            (ExportStatus::Recording, ExportEvent::SettleElapsed) => self.on_settled(host),
            (
                ExportStatus::Recording | ExportStatus::Finalizing,
                ExportEvent::AudioTime(seconds),
            ) => host.playback_time(seconds),
            (ExportStatus::Recording, ExportEvent::AudioEnded) => {
                self.begin_finalizing("audio ended", host)
            }
            (ExportStatus::Recording, ExportEvent::VideoTrackEnded) => {
                if let Some(audio) = self
                    .session
                    .as_mut()
                    .and_then(|session| session.resources.audio.as_mut())
                {
                    audio.pause();
                }
                self.begin_finalizing("screen sharing stopped", host)
            }
            (
                ExportStatus::Recording | ExportStatus::Finalizing,
                ExportEvent::RecorderData(bytes),
            ) => {
                if let Some(session) = self.session.as_mut() {
                    if !bytes.is_empty() {
                        session.chunks.push(bytes);
                    }
                }
            }
            (ExportStatus::Recording | ExportStatus::Finalizing, ExportEvent::RecorderStopped) => {
                self.finalize(platform, host)
            }
            (_, ExportEvent::CaptureGranted(mut stream)) => stream.stop(),
            (status, event) => debug!(?status, ?event, "ignoring event"),
        }
    }

    fn sink(&self, id: SessionId) -> EventSink {
        EventSink::new(id, self.tx.clone())
    }

    fn on_capture_granted(
        &mut self,
        stream: Box<dyn CaptureStream>,
        platform: &mut dyn CapturePlatform,
        host: &mut dyn ExportHost,
    ) {
        let Some(id) = self.session_id() else {
            return;
        };
        let sink = self.sink(id);
        let built = match self.session.as_mut() {
            Some(session) => {
                session.resources.capture = Some(stream);
                session.build_pipeline(&self.config, platform, &sink)
            }
            None => return,
        };
        if let Err(err) = built {
            self.abort(err, host);
            return;
        }

        host.enter_clean_mode();
        if let Some(session) = self.session.as_mut() {
            session.clean_mode = true;
        }
        self.status = ExportStatus::Recording;
        info!(session = %id, delay_ms = self.config.settle_delay_ms, "clean mode on, waiting to settle");
        platform.schedule_settle(self.config.settle_delay(), sink);
    }

    fn on_settled(&mut self, host: &mut dyn ExportHost) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.recorder_started {
            return;
        }

        let started = match session.resources.recorder.as_mut() {
            Some(recorder) => recorder.start(),
            None => Err(PlatformError::new("recorder is missing")),
        };
        if let Err(e) = started {
            self.abort(
                LyricVideoError::pipeline(format!("recorder failed to start: {e}")),
                host,
            );
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.recorder_started = true;
        info!(session = %session.id, "recording started");

        match session.resources.audio.as_mut().map(|audio| audio.play()) {
            Some(Ok(())) => session.audio_started = true,
            Some(Err(e)) => {
                let err = LyricVideoError::playback(format!(
                    "audio did not start, recording continues without it: {e}"
                ));
                warn!(session = %session.id, "{err}");
                host.report(&err);
                self.last_error = Some(err);
            }
            None => {}
        }
    }

    fn begin_finalizing(&mut self, reason: &str, host: &mut dyn ExportHost) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.recorder_started {
            self.abort(
                LyricVideoError::capture(format!("{reason} before recording started")),
                host,
            );
            return;
        }

        if let Some(recorder) = session.resources.recorder.as_mut() {
            if recorder.state() != RecorderState::Inactive {
                recorder.stop();
            }
        }
        info!(session = %session.id, reason, "finalizing recording");
        self.status = ExportStatus::Finalizing;
    }

    fn finalize(&mut self, platform: &mut dyn CapturePlatform, host: &mut dyn ExportHost) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        let mime_type = session
            .mime_type
            .clone()
            .unwrap_or_else(|| "video/webm".to_string());
        let has_audio = session.audio_started;
        let artifact = Artifact {
            file_name: artifact_file_name(&session.artist, &session.title, &mime_type),
            mime_type,
            bytes: std::mem::take(&mut session.chunks).concat(),
            has_audio,
        };
        info!(
            session = %session.id,
            file = %artifact.file_name,
            bytes = artifact.bytes.len(),
            "recording finished"
        );

        let delivered = platform.deliver(artifact);
        self.close(session, host);

        match delivered {
            Ok(()) => {
                self.completed += 1;
                if !has_audio {
                    let err = LyricVideoError::playback(
                        "the recording has no audio because playback never started",
                    );
                    host.report(&err);
                    self.last_error = Some(err);
                }
            }
            Err(e) => {
                let err =
                    LyricVideoError::pipeline(format!("could not save the recording: {e}"));
                warn!("{err}");
                host.report(&err);
                self.last_error = Some(err);
            }
        }
    }

    fn abort(&mut self, err: LyricVideoError, host: &mut dyn ExportHost) {
        warn!(session = ?self.session_id(), status = ?self.status, "export aborted: {err}");
        host.report(&err);
        self.last_error = Some(err);
        self.finish_session(host);
    }

    fn finish_session(&mut self, host: &mut dyn ExportHost) {
        if let Some(session) = self.session.take() {
            self.close(session, host);
        }
        self.status = ExportStatus::Idle;
    }

    fn close(&mut self, mut session: ActiveSession, host: &mut dyn ExportHost) {
        let released = session.resources.release();
        debug!(session = %session.id, released, "session resources released");
        if session.clean_mode {
            host.leave_clean_mode();
        }
        self.status = ExportStatus::Idle;
    }
}

impl std::fmt::Debug for ExportOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOrchestrator")
            .field("status", &self.status)
            .field("session", &self.session_id())
            .field("completed", &self.completed)
            .finish()
    }
}
