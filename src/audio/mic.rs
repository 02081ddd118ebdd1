use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::capture::{AudioFrame, CaptureBackend, CaptureConfig, CaptureError, CaptureFactory};

/// Frame channel depth. The capture callback drops frames rather than block
/// the audio thread when the consumer falls behind.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Microphone capture backend built on cpal.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread and
/// hands frames to the async side over an mpsc channel. Dropping the stream
/// (on release) closes the channel.
pub struct MicBackend {
    config: CaptureConfig,
    running: Option<RunningCapture>,
}

struct RunningCapture {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MicBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.running.is_some() {
            return Err(CaptureError::DeviceUnavailable(
                "microphone already acquired".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = stop.clone();
        let config = self.config.clone();

        let thread = std::thread::spawn(move || {
            run_capture_thread(config, frame_tx, ready_tx, stop_flag);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.running = Some(RunningCapture {
                    stop,
                    thread: Some(thread),
                });
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                // Capture thread died before reporting readiness
                let _ = thread.join();
                Err(CaptureError::DeviceUnavailable(
                    "capture thread exited unexpectedly".to_string(),
                ))
            }
        }
    }

    async fn release(&mut self) {
        if let Some(mut running) = self.running.take() {
            running.stop.store(true, Ordering::SeqCst);
            if let Some(thread) = running.thread.take() {
                let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            }
            info!("Microphone released");
        }
    }

    fn is_capturing(&self) -> bool {
        self.running.is_some()
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

impl Drop for MicBackend {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.store(true, Ordering::SeqCst);
        }
    }
}

/// Default factory: one cpal microphone backend per session.
pub struct MicCaptureFactory {
    config: CaptureConfig,
}

impl MicCaptureFactory {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl CaptureFactory for MicCaptureFactory {
    fn create(&self) -> Box<dyn CaptureBackend> {
        Box::new(MicBackend::new(self.config.clone()))
    }
}

/// Owns the cpal stream for the lifetime of one acquisition.
fn run_capture_thread(
    config: CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
    stop: Arc<AtomicBool>,
) {
    let host = cpal::default_host();

    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(
                "no input device found".to_string(),
            )));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
            return;
        }
    };

    info!(
        "Using input device {:?}: {} Hz, {} channels, {:?}",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        supported.sample_rate().0,
        supported.channels(),
        supported.sample_format()
    );

    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, &config, frame_tx),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, &config, frame_tx),
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, &config, frame_tx),
        other => Err(CaptureError::DeviceUnavailable(format!(
            "unsupported sample format: {:?}",
            other
        ))),
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    // Dropping the stream stops the callback; the frame sender goes with it.
    drop(stream);
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    config: &CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let device_rate = stream_config.sample_rate.0;
    let device_channels = stream_config.channels;
    let target_rate = config.target_sample_rate;
    let target_channels = config.target_channels;

    let samples_per_frame =
        (device_rate as u64 * device_channels as u64 * config.frame_duration_ms / 1000) as usize;
    let frame_duration_ms = config.frame_duration_ms;

    let mut pending: Vec<i16> = Vec::with_capacity(samples_per_frame);
    let mut frame_index: u64 = 0;

    let err_fn = |err| warn!("Audio stream error: {}", err);

    let stream = device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push(i16::from_sample(sample));
                }

                while pending.len() >= samples_per_frame {
                    let samples: Vec<i16> = pending.drain(..samples_per_frame).collect();
                    let frame = AudioFrame {
                        samples,
                        sample_rate: device_rate,
                        channels: device_channels,
                        timestamp_ms: frame_index * frame_duration_ms,
                    }
                    .conformed(target_rate, target_channels);
                    frame_index += 1;

                    // Never block the audio callback; a full channel means the
                    // consumer is behind, so the frame is dropped.
                    if frame_tx.try_send(frame).is_err() {
                        warn!("Frame channel full or closed; dropping capture frame");
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| classify_device_error(&e.to_string()))?;

    Ok(stream)
}

/// cpal reports permission problems as backend-specific errors, so the split
/// between the two fatal capture errors is by message inspection.
fn classify_device_error(message: &str) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied(message.to_string())
    } else {
        CaptureError::DeviceUnavailable(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_classified() {
        assert!(matches!(
            classify_device_error("Access denied by the user"),
            CaptureError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_device_error("device disconnected"),
            CaptureError::DeviceUnavailable(_)
        ));
    }
}
