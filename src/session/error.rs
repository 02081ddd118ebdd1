use thiserror::Error;

use crate::audio::{CaptureError, EncodeError};
use crate::transport::TransportError;

/// Session-level failures.
///
/// Propagation policy: acquisition and encoding errors abort the session;
/// transport errors during live streaming are absorbed (best effort); a
/// transport error on the final upload is converted into a renderable error
/// result and carried in the session outcome instead of being thrown.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called while a session is in flight. No state change.
    #[error("a session is already active")]
    SessionAlreadyActive,

    /// `stop` was called outside the `Recording` state.
    #[error("no recording in progress")]
    NotRecording,

    /// The input file could not be read.
    #[error("failed to read {0}: {1}")]
    FileRead(String, String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Encoding(#[from] EncodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
