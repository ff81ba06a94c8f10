//! Core library for the lyric video player.
//!
//! Each module owns one subsystem: the lyric cursor that turns playback time
//! into per-line render parameters, the player state that owns the library
//! and the global sync offset, the playback clock, the lyric alignment
//! boundary and the export orchestrator that drives screen capture and
//! recording through a platform abstraction.

pub mod align;
pub mod config;
pub mod cursor;
pub mod error;
pub mod lyrics;
pub mod record;
pub mod state;
pub mod timeline;

pub use align::{
    align_lyrics, parse_alignment_response, resync_track, AlignmentRequest, LyricAligner,
    ResponseFileAligner,
};
pub use config::{AlignmentConfig, AppConfig, ExportConfig, SyncConfig};
pub use cursor::{
    active_index, evaluate, CursorFrame, LineParams, LineRender, RenderStyle, ScrollTracker,
};
pub use error::{ErrorKind, LyricVideoError, Result};
pub use lyrics::{is_ascending, load_lines, lyric_text_lines, LyricLine, Track, TrackId};
pub use record::{
    run_export, Artifact, ExportHost, ExportOrchestrator, ExportStatus, LoopbackPlatform,
    ResourceCounts, SessionId,
};
pub use state::{PlayerState, RenderView, TimeSource};
pub use timeline::{format_time, ClockEvent, PlaybackClock, SimulatedClock};
