use std::io::Cursor;
use std::path::Path;

use hound::WavReader;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::info;

use super::chunk::EncodeError;

/// A decoded WAV recording held in memory. Used by the CLI to report on
/// fetched recordings and by tests to inspect generated audio.
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EncodeError> {
        let path = path.as_ref();

        let reader = WavReader::open(path)
            .map_err(|e| EncodeError(format!("failed to open {}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EncodeError(format!("failed to decode {}: {}", path.display(), e)))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Loaded {}: {:.1}s at {} Hz, {} channels",
            path.display(),
            duration_seconds,
            spec.sample_rate,
            spec.channels
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Basic stream parameters recovered by probing an encoded file.
#[derive(Debug, Clone)]
pub struct ProbedAudio {
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    pub duration_seconds: Option<f64>,
}

/// Probe encoded bytes to confirm they are decodable audio.
///
/// File-sourced sessions upload the bytes as-is, so this is the only gate
/// between a user-picked file and the backend: anything symphonia cannot
/// identify is rejected up front instead of failing server-side.
pub fn probe_encoded(bytes: &[u8], name: &str) -> Result<ProbedAudio, EncodeError> {
    let mut hint = Hint::new();
    if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| EncodeError(format!("unsupported audio format: {}", e)))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| EncodeError("no audio track found".to_string()))?;

    let params = &track.codec_params;
    let duration_seconds = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / rate as f64),
        _ => None,
    };

    Ok(ProbedAudio {
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
        duration_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::encode_wav;

    #[test]
    fn probe_accepts_wav_bytes() {
        let samples: Vec<i16> = (0..16000).map(|i| (i % 100) as i16).collect();
        let wav = encode_wav(&samples, 16000, 1).unwrap();

        let probed = probe_encoded(&wav, "clip.wav").unwrap();
        assert_eq!(probed.sample_rate, Some(16000));
        assert_eq!(probed.channels, Some(1));
    }

    #[test]
    fn probe_rejects_garbage() {
        let err = probe_encoded(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01], "clip.wav");
        assert!(err.is_err());
    }
}
