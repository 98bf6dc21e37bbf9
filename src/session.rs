use std::fmt;
use thiserror::Error;

/// Errors raised by the capture lifecycle. All of them are recoverable: the
/// session is left in (or returned to) a state the user can continue from.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not access the microphone: {0}")]
    Permission(String),

    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: CaptureState,
    },

    #[error("could not assemble the recording: {0}")]
    Encode(String),

    #[error("recorder is no longer running")]
    ChannelClosed,
}

/// Where the capture session currently is.
///
/// `Discarded` is an idle-equivalent resting state: it behaves exactly like
/// `Idle` for every operation but remembers that a previous take was thrown
/// away, which the shell uses for its "record again" hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Ready,
    Discarded,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Recording => "recording",
            CaptureState::Ready => "ready",
            CaptureState::Discarded => "discarded",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The finalized recording, encoded into an audio container and ready for
/// submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One microphone take: state, buffered fragments, elapsed seconds and the
/// assembled artifact.
///
/// The session itself is a pure state machine. Hardware acquisition, the
/// ticker and artifact encoding live in the recorder service; the session
/// only enforces which operations are legal when, and keeps fragments in
/// arrival order.
#[derive(Debug)]
pub struct RecordingSession {
    state: CaptureState,
    elapsed_secs: u64,
    chunks: Vec<Vec<f32>>,
    artifact: Option<Artifact>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            elapsed_secs: 0,
            chunks: Vec::new(),
            artifact: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn chunks(&self) -> &[Vec<f32>] {
        &self.chunks
    }

    /// Start a new take. Valid from every state except `Recording`; starting
    /// over a `Ready` session is how "restart" drops the previous artifact.
    pub fn begin(&mut self) -> Result<(), CaptureError> {
        if self.state == CaptureState::Recording {
            return Err(CaptureError::InvalidState {
                op: "start",
                state: self.state,
            });
        }

        self.chunks.clear();
        self.elapsed_secs = 0;
        self.artifact = None;
        self.state = CaptureState::Recording;
        Ok(())
    }

    /// Append one captured fragment. Fragments only accumulate while
    /// recording; anything arriving after the take ended is dropped.
    pub fn push_chunk(&mut self, chunk: Vec<f32>) {
        if self.state == CaptureState::Recording {
            self.chunks.push(chunk);
        }
    }

    /// One ticker beat. Only advances the clock mid-recording, so a tick
    /// that was already queued when the take stopped changes nothing.
    pub fn tick(&mut self) {
        if self.state == CaptureState::Recording {
            self.elapsed_secs += 1;
        }
    }

    /// Finish the take with its assembled artifact: `Recording -> Ready`.
    /// The fragment buffer is consumed; the artifact carries the audio now.
    pub fn complete(&mut self, artifact: Artifact) -> Result<(), CaptureError> {
        if self.state != CaptureState::Recording {
            return Err(CaptureError::InvalidState {
                op: "stop",
                state: self.state,
            });
        }

        self.chunks.clear();
        self.artifact = Some(artifact);
        self.state = CaptureState::Ready;
        Ok(())
    }

    /// Throw the finished take away: `Ready -> Discarded`. Rejected from any
    /// other state, with the session left untouched.
    pub fn discard(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Ready {
            return Err(CaptureError::InvalidState {
                op: "discard",
                state: self.state,
            });
        }

        self.chunks.clear();
        self.elapsed_secs = 0;
        self.artifact = None;
        self.state = CaptureState::Discarded;
        Ok(())
    }

    /// Drop everything and return to `Idle`. Recovery path for a take that
    /// failed mid-assembly.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.elapsed_secs = 0;
        self.artifact = None;
        self.state = CaptureState::Idle;
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Render elapsed seconds as `minutes:seconds`, seconds zero-padded.
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
