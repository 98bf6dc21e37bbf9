use super::format::AudioFormat;
use crate::session::CaptureError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::{HeapRb, traits::*};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};

/// A live capture stream. Dropping the handle releases the device.
pub trait StreamHandle {}

/// Source of captured audio. The production driver opens the default
/// microphone through cpal; tests substitute a scripted driver so the
/// recorder can run without hardware.
pub trait CaptureDriver {
    /// Acquire the device and start delivering fragments on `chunk_tx`.
    ///
    /// Returns the stream handle which must be kept alive for capture to
    /// continue. Any acquisition failure (no device, denied access, config
    /// rejected) comes back as a recoverable `CaptureError::Permission`.
    fn acquire(
        &mut self,
        format: AudioFormat,
        chunk_tx: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn StreamHandle>, CaptureError>;
}

pub struct MicDriver;

struct MicStream {
    _stream: cpal::Stream,
}

impl StreamHandle for MicStream {}

impl CaptureDriver for MicDriver {
    fn acquire(
        &mut self,
        format: AudioFormat,
        chunk_tx: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn StreamHandle>, CaptureError> {
        let ring = HeapRb::<f32>::new(format.samples_for_duration(60.0));
        let (mut producer, consumer) = ring.split();

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::Permission("no input device available".into()))?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let notify = Arc::new(Notify::new());
        let notify_callback = notify.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    producer.push_slice(data);
                    notify_callback.notify_one();
                },
                move |err| {
                    eprintln!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::Permission(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::Permission(e.to_string()))?;

        let chunk_size = format.samples_for_duration(0.5);
        tokio::task::spawn_local(bridge_task(consumer, chunk_tx, chunk_size, notify));

        tracing::info!("Audio capture started");
        Ok(Box::new(MicStream { _stream: stream }))
    }
}

/// Moves samples from the real-time ring buffer into fragment-sized chunks
/// on the async side. Exits when the receiving end goes away.
async fn bridge_task(
    mut consumer: impl Consumer<Item = f32>,
    tx: mpsc::Sender<Vec<f32>>,
    chunk_size: usize,
    notify: Arc<Notify>,
) {
    loop {
        notify.notified().await;

        let available = consumer.occupied_len();
        if available >= chunk_size {
            let mut chunk = vec![0.0f32; chunk_size];
            let n = consumer.pop_slice(&mut chunk);
            chunk.truncate(n);

            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    }
}
