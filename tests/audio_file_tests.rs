// Integration tests for file-based audio handling: reading WAV files from
// disk and probing encoded bytes before upload.

use anyhow::Result;
use std::path::PathBuf;

use voicescreen::audio::{encode_wav, probe_encoded, AudioFile};

fn write_test_wav(dir: &tempfile::TempDir, seconds: f64) -> Result<PathBuf> {
    let path = dir.path().join("clip.wav");
    let samples: Vec<i16> = (0..(16000.0 * seconds) as usize)
        .map(|i| ((i % 200) as i16 - 100) * 50)
        .collect();
    std::fs::write(&path, encode_wav(&samples, 16000, 1)?)?;
    Ok(path)
}

#[test]
fn audio_file_open_reads_samples_and_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_test_wav(&dir, 2.0)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 32000);
    assert!((audio.duration_seconds - 2.0).abs() < 0.01);
    assert!(audio.path.contains("clip.wav"));

    Ok(())
}

#[test]
fn audio_file_open_nonexistent_fails() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err());
}

#[test]
fn probe_recovers_parameters_from_encoded_bytes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_test_wav(&dir, 1.5)?;
    let bytes = std::fs::read(&path)?;

    let probed = probe_encoded(&bytes, "clip.wav")?;

    assert_eq!(probed.sample_rate, Some(16000));
    assert_eq!(probed.channels, Some(1));
    if let Some(duration) = probed.duration_seconds {
        assert!((duration - 1.5).abs() < 0.01);
    }

    Ok(())
}

#[test]
fn probe_rejects_non_audio_bytes() {
    let result = probe_encoded(b"just some text pretending to be audio", "clip.wav");
    assert!(result.is_err());
}
