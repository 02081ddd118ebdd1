pub mod audio;
pub mod config;
pub mod session;
pub mod transport;

pub use audio::{
    AudioFile, AudioFrame, CaptureBackend, CaptureConfig, CaptureError, CaptureFactory,
    ChunkAssembler, ChunkConfig, EncodedChunk, MicCaptureFactory,
};
pub use config::Config;
pub use session::{
    Session, SessionConfig, SessionController, SessionError, SessionOutcome, SessionState,
    SourceKind,
};
pub use transport::{AnalysisBackend, AnalysisResult, BackendClient, StreamingChannel, TransportError};
