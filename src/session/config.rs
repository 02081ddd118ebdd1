use serde::{Deserialize, Serialize};

use crate::audio::{CaptureConfig, ChunkConfig};

/// Configuration for recording sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sample rate for captured audio (the analysis model expects 16kHz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration of each encoded chunk in milliseconds
    /// Default: 1000 (one chunk per second of capture)
    pub chunk_duration_ms: u64,

    /// Forward chunks over the live streaming channel while recording
    pub live_streaming: bool,

    /// Persist the completed recording server-side after analysis
    pub persist_recordings: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_duration_ms: 1000,
            live_streaming: true,
            persist_recordings: true,
        }
    }
}

impl SessionConfig {
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            target_sample_rate: self.sample_rate,
            target_channels: self.channels,
            frame_duration_ms: 100,
        }
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_duration_ms: self.chunk_duration_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}
