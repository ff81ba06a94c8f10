//! Screen capture and lyrics video recording.
//!
//! The [`ExportOrchestrator`] pairs a screen capture with a separately
//! produced audio signal, drives the platform recorder and hands the
//! finished file to the download sink. Platform media primitives sit behind
//! the traits in [`platform`]; [`LoopbackPlatform`] is an in-process
//! implementation on a simulated timeline.

mod format;
mod loopback;
mod orchestrator;
pub mod platform;
mod session;

pub use format::{artifact_file_name, container_extension, negotiate_mime};
pub use loopback::{run_export, LoopbackPlatform, ResourceCounts};
pub use orchestrator::{ExportHost, ExportOrchestrator, ExportStatus};
pub use platform::{
    Artifact, AudioPath, CapturePlatform, CaptureRequest, CaptureStream, EventSink, ExportEvent,
    MediaRecorder, PlatformError, RecorderState, SessionId,
};
pub use session::SessionResources;
