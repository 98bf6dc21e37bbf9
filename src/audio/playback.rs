use crate::session::Artifact;
use rodio::OutputStreamBuilder;
use std::io::Cursor;

/// Play the finished take through the default output device. Fire and
/// forget: playback problems are logged, never surfaced to the shell.
pub async fn preview(artifact: Artifact) {
    tokio::spawn(async move {
        tokio::task::spawn_blocking(move || {
            let stream_handle = OutputStreamBuilder::open_default_stream();
            if let Ok(stream_handle) = stream_handle {
                if let Ok(sink) = rodio::play(stream_handle.mixer(), Cursor::new(artifact.bytes)) {
                    sink.sleep_until_end();
                } else {
                    tracing::warn!("Failed to play back recording");
                }
            } else {
                tracing::warn!("Failed to open audio output stream");
            }
        })
        .await
        .ok();
    });
}
