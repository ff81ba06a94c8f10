use std::fmt;

use super::platform::{AudioPath, CaptureStream, MediaRecorder, RecorderState};

/// Platform resources held by one export attempt.
///
/// [`SessionResources::release`] may be called any number of times; each
/// resource is released at most once. Dropping the value releases whatever
/// is still held.
#[derive(Default)]
pub struct SessionResources {
    pub(crate) capture: Option<Box<dyn CaptureStream>>,
    pub(crate) audio: Option<Box<dyn AudioPath>>,
    pub(crate) recorder: Option<Box<dyn MediaRecorder>>,
}

impl SessionResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.capture.is_none() && self.audio.is_none() && self.recorder.is_none()
    }

    /// Releases everything still held and returns how many resources that
    /// was.
    pub fn release(&mut self) -> usize {
        let mut released = 0;
        if let Some(mut recorder) = self.recorder.take() {
            if recorder.state() != RecorderState::Inactive {
                recorder.stop();
            }
            released += 1;
        }
        if let Some(mut audio) = self.audio.take() {
            audio.pause();
            audio.close();
            released += 1;
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            released += 1;
        }
        released
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SessionResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionResources")
            .field("capture", &self.capture.is_some())
            .field("audio", &self.audio.is_some())
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}
