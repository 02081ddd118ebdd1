pub mod capture;
pub mod chunk;
pub mod file;
pub mod mic;

pub use capture::{AudioFrame, CaptureBackend, CaptureConfig, CaptureError, CaptureFactory};
pub use chunk::{encode_wav, ChunkAssembler, ChunkConfig, EncodeError, EncodedChunk};
pub use file::{probe_encoded, AudioFile, ProbedAudio};
pub use mic::{MicBackend, MicCaptureFactory};
