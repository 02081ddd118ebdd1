//! Transport to the analysis backend.
//!
//! Two channel types, both dumb conduits:
//! - request/response HTTP for batch upload, persistence and recording
//!   management (`BackendClient`)
//! - a live streaming socket carrying encoded chunks out and analysis
//!   results back (`StreamingChannel` / `WsChannel`)

mod http;
mod result;
mod stream;

pub use http::BackendClient;
pub use result::AnalysisResult;
pub use stream::WsChannel;

use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level failures, reported independently of session state.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the streaming or HTTP endpoint at all.
    #[error("failed to connect to backend: {0}")]
    ConnectFailed(String),

    /// The streaming channel was closed (locally or by the peer).
    #[error("streaming channel is closed")]
    ChannelClosed,

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {0}")]
    Http(u16),

    /// The named recording does not exist server-side.
    #[error("recording not found: {0}")]
    NotFound(String),

    /// Request plumbing failed (I/O, timeout, TLS, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered 2xx but the payload did not parse.
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

/// Request/response side of the backend service.
///
/// All methods are non-blocking; in-flight requests are bounded by the
/// client timeout and simply abandoned when their future is dropped.
#[async_trait::async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Submit a complete encoded blob for classification.
    async fn process(&self, blob: Vec<u8>, name: &str) -> Result<AnalysisResult, TransportError>;

    /// Persist a completed recording under the given name.
    async fn store(&self, blob: Vec<u8>, name: &str) -> Result<(), TransportError>;

    /// Names of stored recordings, in server order.
    async fn list_recordings(&self) -> Result<Vec<String>, TransportError>;

    /// Raw bytes of a stored recording.
    async fn fetch_recording(&self, name: &str) -> Result<Vec<u8>, TransportError>;

    /// Delete a stored recording.
    async fn delete_recording(&self, name: &str) -> Result<(), TransportError>;

    /// Open a live streaming channel. Analysis result frames arriving on the
    /// channel are delivered through `results`, out-of-band with chunk sends.
    async fn open_stream(
        &self,
        results: mpsc::Sender<AnalysisResult>,
    ) -> Result<Box<dyn StreamingChannel>, TransportError>;
}

/// Write side of a live streaming channel.
///
/// Sends preserve chunk generation order. `close` is idempotent and must be
/// called on every session exit path.
#[async_trait::async_trait]
pub trait StreamingChannel: Send {
    /// Forward one encoded chunk. Fire-and-forget from the session's point of
    /// view, but channel closure is detected and reported.
    async fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError>;

    /// Close the channel. Safe to call more than once.
    async fn close(&mut self);
}
