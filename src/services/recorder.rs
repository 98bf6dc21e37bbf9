use crate::audio::encoder;
use crate::audio::{AudioFormat, CaptureDriver, StreamHandle};
use crate::messages::{CaptureStatus, RecorderCommand};
use crate::session::{Artifact, CaptureError, CaptureState, RecordingSession};
use tokio::sync::mpsc;
use tokio::time::{Duration, Interval, MissedTickBehavior};

/// Coordinates audio capture, the elapsed-time ticker and artifact assembly
///
/// This service:
/// - Owns the capture stream lifecycle through the CaptureDriver seam
/// - Receives audio fragments via channel and buffers them in the session
/// - Advances the elapsed clock once per second while recording
/// - Handles start/stop/discard/status commands
///
/// Note: This service holds the capture stream which is !Send, so it must be
/// spawned on a LocalSet using tokio::task::spawn_local.
pub struct Recorder {
    format: AudioFormat,
    driver: Box<dyn CaptureDriver>,
    cmd_rx: mpsc::Receiver<RecorderCommand>,
    chunk_rx: mpsc::Receiver<Vec<f32>>,
    chunk_tx: mpsc::Sender<Vec<f32>>,
    stream: Option<Box<dyn StreamHandle>>,
    session: RecordingSession,
    ticker: Interval,
}

impl Recorder {
    pub fn new(
        format: AudioFormat,
        driver: Box<dyn CaptureDriver>,
        cmd_rx: mpsc::Receiver<RecorderCommand>,
        chunk_rx: mpsc::Receiver<Vec<f32>>,
        chunk_tx: mpsc::Sender<Vec<f32>>,
    ) -> Self {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            format,
            driver,
            cmd_rx,
            chunk_rx,
            chunk_tx,
            stream: None,
            session: RecordingSession::new(),
            ticker,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                // Handle commands from the shell
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }

                // Buffer audio fragments (only while recording)
                Some(chunk) = self.chunk_rx.recv(), if self.session.is_recording() => {
                    self.session.push_chunk(chunk);
                }

                // Elapsed clock (only while recording)
                _ = self.ticker.tick(), if self.session.is_recording() => {
                    self.session.tick();
                    tracing::debug!(elapsed_secs = self.session.elapsed_secs(), "recording");
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: RecorderCommand) {
        match cmd {
            RecorderCommand::Start(reply) => {
                let _ = reply.send(self.start());
            }
            RecorderCommand::Stop(reply) => {
                let _ = reply.send(self.stop().await);
            }
            RecorderCommand::Discard(reply) => {
                let _ = reply.send(self.session.discard());
            }
            RecorderCommand::Status(reply) => {
                let _ = reply.send(CaptureStatus {
                    state: self.session.state(),
                    elapsed_secs: self.session.elapsed_secs(),
                    artifact_bytes: self.session.artifact().map(Artifact::len).unwrap_or(0),
                });
            }
            RecorderCommand::Artifact(reply) => {
                let _ = reply.send(self.session.artifact().cloned());
            }
        }
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.session.is_recording() {
            return Err(CaptureError::InvalidState {
                op: "start",
                state: self.session.state(),
            });
        }

        // Acquire the device first; a denial leaves the session untouched
        let stream = self.driver.acquire(self.format, self.chunk_tx.clone())?;
        self.session.begin()?;
        self.stream = Some(stream);
        self.ticker.reset();

        tracing::info!("Recording started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<Artifact, CaptureError> {
        match self.session.state() {
            CaptureState::Recording => {}
            // Repeated stop hands back the finished take without touching
            // hardware
            CaptureState::Ready => {
                return self
                    .session
                    .artifact()
                    .cloned()
                    .ok_or(CaptureError::InvalidState {
                        op: "stop",
                        state: CaptureState::Ready,
                    });
            }
            state => {
                return Err(CaptureError::InvalidState { op: "stop", state });
            }
        }

        // Drop the stream to stop audio capture
        self.stream = None;

        // Drain any remaining audio fragments from the channel
        while let Ok(chunk) = self.chunk_rx.try_recv() {
            self.session.push_chunk(chunk);
        }

        // Replace the audio channel with a fresh one for the next recording.
        // This drops the old receiver, which causes the bridge task's
        // tx.send() to fail and signals it to exit cleanly
        let (new_chunk_tx, new_chunk_rx) = mpsc::channel(100);
        self.chunk_tx = new_chunk_tx;
        self.chunk_rx = new_chunk_rx;

        // Give the bridge task a moment to receive the Err from its send and
        // exit
        tokio::time::sleep(Duration::from_millis(50)).await;

        let artifact = match encoder::encode_wav(self.session.chunks(), self.format) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.session.reset();
                return Err(CaptureError::Encode(e.to_string()));
            }
        };

        self.session.complete(artifact.clone())?;

        tracing::info!(bytes = artifact.len(), "Recording stopped");
        Ok(artifact)
    }
}

/// Handle for communicating with the Recorder
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderCommand>,
}

impl RecorderHandle {
    pub fn new(tx: mpsc::Sender<RecorderCommand>) -> Self {
        Self { tx }
    }

    pub async fn start(&self) -> Result<(), CaptureError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RecorderCommand::Start(reply))
            .await
            .map_err(|_| CaptureError::ChannelClosed)?;
        rx.await.map_err(|_| CaptureError::ChannelClosed)?
    }

    pub async fn stop(&self) -> Result<Artifact, CaptureError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RecorderCommand::Stop(reply))
            .await
            .map_err(|_| CaptureError::ChannelClosed)?;
        rx.await.map_err(|_| CaptureError::ChannelClosed)?
    }

    pub async fn discard(&self) -> Result<(), CaptureError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RecorderCommand::Discard(reply))
            .await
            .map_err(|_| CaptureError::ChannelClosed)?;
        rx.await.map_err(|_| CaptureError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<CaptureStatus, CaptureError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RecorderCommand::Status(reply))
            .await
            .map_err(|_| CaptureError::ChannelClosed)?;
        rx.await.map_err(|_| CaptureError::ChannelClosed)
    }

    pub async fn artifact(&self) -> Result<Option<Artifact>, CaptureError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RecorderCommand::Artifact(reply))
            .await
            .map_err(|_| CaptureError::ChannelClosed)?;
        rx.await.map_err(|_| CaptureError::ChannelClosed)
    }
}
