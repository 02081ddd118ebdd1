use std::io::Cursor;

use thiserror::Error;
use tracing::info;

use super::capture::AudioFrame;

/// Audio could not be encoded into its container format.
#[derive(Debug, Clone, Error)]
#[error("audio encoding failed: {0}")]
pub struct EncodeError(pub String);

/// Chunk configuration
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Duration of each chunk in milliseconds (default: 1000 = one second)
    pub chunk_duration_ms: u64,
    /// Sample rate of incoming frames
    pub sample_rate: u32,
    /// Channel count of incoming frames
    pub channels: u16,
}

impl ChunkConfig {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            chunk_duration_ms: 1000,
            sample_rate,
            channels,
        }
    }

    fn samples_per_chunk(&self) -> usize {
        (self.sample_rate as u64 * self.channels as u64 * self.chunk_duration_ms / 1000) as usize
    }
}

/// A self-contained encoded slice of captured audio.
///
/// Each chunk is a complete WAV container so it can be forwarded over the
/// streaming channel and decoded on its own.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Chunk number (0-indexed, generation order)
    pub index: usize,
    /// Encoded WAV bytes
    pub wav: Vec<u8>,
    /// Start time in milliseconds since capture started
    pub start_ms: u64,
    /// End time in milliseconds since capture started
    pub end_ms: u64,
    /// Number of samples in this chunk
    pub sample_count: usize,
}

/// Assembles capture frames into fixed-duration encoded chunks.
///
/// Frames are appended as they arrive; every time a full chunk duration of
/// samples has accumulated, one encoded chunk is emitted. `finish` flushes
/// whatever remainder is pending when capture stops.
pub struct ChunkAssembler {
    config: ChunkConfig,
    pending: Vec<i16>,
    chunk_index: usize,
    emitted_samples: u64,
}

impl ChunkAssembler {
    pub fn new(config: ChunkConfig) -> Self {
        let capacity = config.samples_per_chunk();
        Self {
            config,
            pending: Vec::with_capacity(capacity),
            chunk_index: 0,
            emitted_samples: 0,
        }
    }

    /// Append a frame; returns any chunks completed by it (usually zero or one).
    pub fn push_frame(&mut self, frame: &AudioFrame) -> Result<Vec<EncodedChunk>, EncodeError> {
        // A zero sample budget would never fill a chunk; reject it instead
        // of looping on an empty drain.
        let per_chunk = self.config.samples_per_chunk();
        if per_chunk == 0 {
            return Err(EncodeError(format!(
                "invalid chunk configuration: {} Hz, {} channels, {} ms per chunk",
                self.config.sample_rate, self.config.channels, self.config.chunk_duration_ms
            )));
        }

        self.pending.extend_from_slice(&frame.samples);

        let mut completed = Vec::new();

        while self.pending.len() >= per_chunk {
            let samples: Vec<i16> = self.pending.drain(..per_chunk).collect();
            completed.push(self.emit(&samples)?);
        }

        Ok(completed)
    }

    /// Flush the trailing partial chunk, if any.
    pub fn finish(&mut self) -> Result<Option<EncodedChunk>, EncodeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let samples = std::mem::take(&mut self.pending);
        let chunk = self.emit(&samples)?;

        info!(
            "Chunk stream finished: {} chunks, {:.1}s of audio",
            self.chunk_index,
            self.emitted_samples as f64
                / (self.config.sample_rate as f64 * self.config.channels as f64)
        );

        Ok(Some(chunk))
    }

    fn emit(&mut self, samples: &[i16]) -> Result<EncodedChunk, EncodeError> {
        let rate_ms = self.config.sample_rate as u64 * self.config.channels as u64;
        let start_ms = self.emitted_samples * 1000 / rate_ms;
        self.emitted_samples += samples.len() as u64;
        let end_ms = self.emitted_samples * 1000 / rate_ms;

        let wav = encode_wav(samples, self.config.sample_rate, self.config.channels)?;

        let chunk = EncodedChunk {
            index: self.chunk_index,
            wav,
            start_ms,
            end_ms,
            sample_count: samples.len(),
        };

        self.chunk_index += 1;

        Ok(chunk)
    }
}

/// Encode PCM samples into a single in-memory WAV container.
///
/// Used both for per-chunk encoding and for the final concatenated blob sent
/// on the batch upload path.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, EncodeError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());

    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| EncodeError(format!("failed to create WAV writer: {}", e)))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| EncodeError(format!("failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| EncodeError(format!("failed to finalize WAV: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn emits_chunk_when_duration_reached() {
        let mut assembler = ChunkAssembler::new(ChunkConfig::new(16000, 1));

        // 900ms of audio: no chunk yet
        let out = assembler.push_frame(&frame(vec![0; 14400])).unwrap();
        assert!(out.is_empty());

        // 200ms more crosses the 1s boundary
        let out = assembler.push_frame(&frame(vec![0; 3200])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].index, 0);
        assert_eq!(out[0].sample_count, 16000);
        assert_eq!(out[0].start_ms, 0);
        assert_eq!(out[0].end_ms, 1000);
    }

    #[test]
    fn finish_flushes_remainder() {
        let mut assembler = ChunkAssembler::new(ChunkConfig::new(16000, 1));
        assembler.push_frame(&frame(vec![7; 8000])).unwrap();

        let tail = assembler.finish().unwrap().expect("pending samples");
        assert_eq!(tail.sample_count, 8000);
        assert_eq!(tail.end_ms, 500);

        // Second finish is a no-op
        assert!(assembler.finish().unwrap().is_none());
    }

    #[test]
    fn chunks_are_independently_decodable() {
        let mut assembler = ChunkAssembler::new(ChunkConfig::new(16000, 1));
        let chunks = assembler
            .push_frame(&frame((0..32000).map(|i| (i % 128) as i16).collect()))
            .unwrap();
        assert_eq!(chunks.len(), 2);

        for chunk in &chunks {
            let reader = hound::WavReader::new(Cursor::new(chunk.wav.clone())).unwrap();
            assert_eq!(reader.spec().sample_rate, 16000);
            assert_eq!(reader.len() as usize, chunk.sample_count);
        }
    }

    #[test]
    fn zero_sample_budget_is_rejected() {
        let zero_duration = ChunkConfig {
            chunk_duration_ms: 0,
            sample_rate: 16000,
            channels: 1,
        };
        let mut assembler = ChunkAssembler::new(zero_duration);
        assert!(assembler.push_frame(&frame(vec![0; 100])).is_err());

        let zero_rate = ChunkConfig {
            chunk_duration_ms: 1000,
            sample_rate: 0,
            channels: 1,
        };
        let mut assembler = ChunkAssembler::new(zero_rate);
        assert!(assembler.push_frame(&frame(vec![0; 100])).is_err());
    }

    #[test]
    fn encode_wav_roundtrips_samples() {
        let samples: Vec<i16> = (0..1600).map(|i| (i * 3 % 251) as i16).collect();
        let wav = encode_wav(&samples, 16000, 1).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(decoded, samples);
    }
}
