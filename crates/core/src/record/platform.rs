use std::{fmt, sync::mpsc::Sender, time::Duration};

use serde::{Deserialize, Serialize};

/// Raw failure reported by a capture platform. The orchestrator maps these
/// into [`crate::LyricVideoError`] kinds before they reach the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PlatformError(String);

impl PlatformError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Identifies one export attempt. Events tagged with an older session are
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "export-{}", self.0)
    }
}

/// Asynchronous platform notification delivered to the orchestrator.
pub enum ExportEvent {
    CaptureGranted(Box<dyn CaptureStream>),
    /// The operator denied or cancelled the share dialog, or capture is not
    /// supported.
    CaptureDenied(String),
    /// The clean-mode settle delay has elapsed.
    SettleElapsed,
    /// Current time of the recording's own audio element.
    AudioTime(f64),
    AudioEnded,
    /// The captured video track ended from outside, e.g. "stop sharing".
    VideoTrackEnded,
    RecorderData(Vec<u8>),
    /// Final flush from the recorder; no more data follows.
    RecorderStopped,
}

impl fmt::Debug for ExportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureGranted(_) => f.write_str("CaptureGranted"),
            Self::CaptureDenied(reason) => f.debug_tuple("CaptureDenied").field(reason).finish(),
            Self::SettleElapsed => f.write_str("SettleElapsed"),
            Self::AudioTime(time) => f.debug_tuple("AudioTime").field(time).finish(),
            Self::AudioEnded => f.write_str("AudioEnded"),
            Self::VideoTrackEnded => f.write_str("VideoTrackEnded"),
            Self::RecorderData(bytes) => f.debug_tuple("RecorderData").field(&bytes.len()).finish(),
            Self::RecorderStopped => f.write_str("RecorderStopped"),
        }
    }
}

/// Handle given to platform resources so they can post events for their
/// session into the orchestrator's queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: Sender<(SessionId, ExportEvent)>,
}

impl EventSink {
    pub(crate) fn new(session: SessionId, tx: Sender<(SessionId, ExportEvent)>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queues an event. Events posted after the orchestrator is gone are
    /// dropped.
    pub fn post(&self, event: ExportEvent) {
        let _ = self.tx.send((self.session, event));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySurface {
    Browser,
    Window,
    Monitor,
}

/// Parameters for the screen capture prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub frame_rate: u32,
    pub surface: DisplaySurface,
    pub prefer_current_tab: bool,
    /// Always false: audio comes from a separate pipeline.
    pub system_audio: bool,
}

impl CaptureRequest {
    pub fn current_tab(frame_rate: u32) -> Self {
        Self {
            frame_rate,
            surface: DisplaySurface::Browser,
            prefer_current_tab: true,
            system_audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
    pub live: bool,
}

impl MediaTrack {
    pub fn live(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            live: true,
        }
    }
}

/// The recordable stream: captured video paired with the separately produced
/// audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedStream {
    pub video: MediaTrack,
    pub audio: MediaTrack,
}

impl MixedStream {
    /// Pairs the two tracks. Both must be live and of the right kind.
    pub fn new(video: MediaTrack, audio: MediaTrack) -> Result<Self, PlatformError> {
        if video.kind != TrackKind::Video || audio.kind != TrackKind::Audio {
            return Err(PlatformError::new("mixed stream needs one video and one audio track"));
        }
        if !video.live {
            return Err(PlatformError::new(format!("video track `{}` has ended", video.id)));
        }
        if !audio.live {
            return Err(PlatformError::new(format!("audio track `{}` has ended", audio.id)));
        }
        Ok(Self { video, audio })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderOptions {
    pub mime_type: String,
    pub video_bits_per_second: u32,
}

/// The finished recording handed to the download sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// False when audio playback never started during the recording.
    pub has_audio: bool,
}

/// A live screen/window capture.
pub trait CaptureStream: Send {
    fn video_track(&self) -> Option<MediaTrack>;
    /// Stops every track of the capture.
    fn stop(&mut self);
}

/// The recording's own audio element, routed both to the speakers and to a
/// stream destination.
pub trait AudioPath: Send {
    fn output_track(&self) -> Option<MediaTrack>;
    fn play(&mut self) -> Result<(), PlatformError>;
    fn pause(&mut self);
    /// Detaches listeners and closes the audio graph.
    fn close(&mut self);
}

pub trait MediaRecorder: Send {
    fn state(&self) -> RecorderState;
    fn start(&mut self) -> Result<(), PlatformError>;
    /// Requests a stop. The recorder answers with its remaining data and a
    /// [`ExportEvent::RecorderStopped`].
    fn stop(&mut self);
}

/// Host media primitives the orchestrator drives.
pub trait CapturePlatform {
    /// Opens the share prompt. The outcome arrives later as
    /// [`ExportEvent::CaptureGranted`] or [`ExportEvent::CaptureDenied`].
    fn request_capture(&mut self, request: &CaptureRequest, events: EventSink);

    fn build_audio_path(
        &mut self,
        audio_url: &str,
        events: EventSink,
    ) -> Result<Box<dyn AudioPath>, PlatformError>;

    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create_recorder(
        &mut self,
        stream: MixedStream,
        options: &RecorderOptions,
        events: EventSink,
    ) -> Result<Box<dyn MediaRecorder>, PlatformError>;

    /// Posts [`ExportEvent::SettleElapsed`] once `delay` has passed.
    fn schedule_settle(&mut self, delay: Duration, events: EventSink);

    /// Offers the finished recording to the operator.
    fn deliver(&mut self, artifact: Artifact) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_stream_needs_live_tracks() {
        let video = MediaTrack::live("v", TrackKind::Video);
        let audio = MediaTrack::live("a", TrackKind::Audio);
        assert!(MixedStream::new(video.clone(), audio.clone()).is_ok());

        let ended = MediaTrack {
            live: false,
            ..video.clone()
        };
        assert!(MixedStream::new(ended, audio.clone()).is_err());
        assert!(MixedStream::new(audio, video).is_err());
    }

    #[test]
    fn capture_request_never_asks_for_system_audio() {
        let request = CaptureRequest::current_tab(60);
        assert!(!request.system_audio);
        assert!(request.prefer_current_tab);
        assert_eq!(request.surface, DisplaySurface::Browser);
    }
}
