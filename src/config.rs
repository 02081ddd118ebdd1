use anyhow::{ensure, Result};
use serde::Deserialize;

use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the analysis API, e.g. "http://localhost:8000/api/v1"
    pub api_url: String,
    /// WebSocket URL of the live analysis stream
    pub stream_url: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_duration_ms: u64,
    pub live_streaming: bool,
    pub persist_recordings: bool,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.audio.sample_rate > 0, "audio.sample_rate must be positive");
        ensure!(self.audio.channels > 0, "audio.channels must be positive");
        ensure!(
            self.audio.chunk_duration_ms > 0,
            "audio.chunk_duration_ms must be positive"
        );
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            chunk_duration_ms: self.audio.chunk_duration_ms,
            live_streaming: self.audio.live_streaming,
            persist_recordings: self.audio.persist_recordings,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "voicescreen".to_string(),
            },
            backend: BackendConfig {
                api_url: "http://localhost:8000/api/v1".to_string(),
                stream_url: "ws://localhost:8000/api/v1/audio/stream".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 16000,
                channels: 1,
                chunk_duration_ms: 1000,
                live_streaming: true,
                persist_recordings: true,
            },
        }
    }
}
