use crate::session::{Artifact, CaptureError, CaptureState};
use tokio::sync::oneshot;

/// Commands for the Recorder service
pub enum RecorderCommand {
    Start(oneshot::Sender<Result<(), CaptureError>>),
    Stop(oneshot::Sender<Result<Artifact, CaptureError>>),
    Discard(oneshot::Sender<Result<(), CaptureError>>),
    Status(oneshot::Sender<CaptureStatus>),
    Artifact(oneshot::Sender<Option<Artifact>>),
}

/// Snapshot of the capture session, for the status line.
#[derive(Debug, Clone)]
pub struct CaptureStatus {
    pub state: CaptureState,
    pub elapsed_secs: u64,
    pub artifact_bytes: usize,
}
