use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised while acquiring or driving a capture device.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// The platform refused access to the capture device.
    #[error("permission to use the capture device was denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device, or the device went away.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Conform this frame to the target format (downsample and fold to mono
    /// as needed). Upsampling is not supported; the frame is returned as-is.
    pub fn conformed(self, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
        let mut frame = self;

        if frame.sample_rate != target_sample_rate {
            frame = frame.downsampled(target_sample_rate);
        }

        if frame.channels != target_channels && target_channels == 1 {
            frame = frame.to_mono();
        }

        frame
    }

    /// Downsample by decimation (take every Nth sample).
    fn downsampled(self, target_rate: u32) -> AudioFrame {
        if self.sample_rate == target_rate {
            return self;
        }

        let ratio = self.sample_rate / target_rate;
        if ratio <= 1 {
            return self; // Can't upsample
        }

        let samples: Vec<i16> = self.samples.iter().step_by(ratio as usize).copied().collect();

        AudioFrame {
            samples,
            sample_rate: target_rate,
            channels: self.channels,
            timestamp_ms: self.timestamp_ms,
        }
    }

    /// Fold stereo to mono by summing channels (no division, preserves volume).
    fn to_mono(self) -> AudioFrame {
        if self.channels != 2 {
            return self; // Only stereo -> mono is supported
        }

        let mut mono = Vec::with_capacity(self.samples.len() / 2);

        for pair in self.samples.chunks_exact(2) {
            let sum = pair[0] as i32 + pair[1] as i32;
            mono.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        }

        AudioFrame {
            samples: mono,
            sample_rate: self.sample_rate,
            channels: 1,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (frames are downsampled if the device runs faster)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz mono is what the analysis model expects
            target_channels: 1,
            frame_duration_ms: 100,
        }
    }
}

/// Capture device backend.
///
/// `acquire` requests exclusive access to the device and hands back a frame
/// receiver. `release` must be idempotent: the session controller calls it on
/// every exit path (stop, cancel, failure), and a released backend must stop
/// producing frames, which closes the receiver.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire the device and start capturing.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Release the device. Idempotent; always succeeds.
    async fn release(&mut self);

    /// Whether the device is currently held.
    fn is_capturing(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Creates a capture backend per session.
///
/// The controller acquires a fresh backend for every microphone session, so
/// the factory is the seam where tests substitute scripted capture sources.
pub trait CaptureFactory: Send + Sync {
    fn create(&self) -> Box<dyn CaptureBackend>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, sample_rate: u32, channels: u16) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn conformed_downsamples_by_decimation() {
        let f = frame((0..8).map(|i| i as i16).collect(), 32000, 1);
        let out = f.conformed(16000, 1);
        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.samples, vec![0, 2, 4, 6]);
    }

    #[test]
    fn conformed_folds_stereo_to_mono() {
        let f = frame(vec![100, 200, -50, 50], 16000, 2);
        let out = f.conformed(16000, 1);
        assert_eq!(out.channels, 1);
        assert_eq!(out.samples, vec![300, 0]);
    }

    #[test]
    fn mono_fold_clamps_overflow() {
        let f = frame(vec![i16::MAX, i16::MAX], 16000, 2);
        let out = f.conformed(16000, 1);
        assert_eq!(out.samples, vec![i16::MAX]);
    }

    #[test]
    fn matching_format_is_untouched() {
        let f = frame(vec![1, 2, 3], 16000, 1);
        let out = f.conformed(16000, 1);
        assert_eq!(out.samples, vec![1, 2, 3]);
    }
}
