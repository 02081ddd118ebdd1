//! Recording session management
//!
//! This module provides the session state machine that coordinates:
//! - Capture device acquisition and release
//! - Chunked encoding of captured audio
//! - Best-effort live streaming to the analysis backend
//! - The final batch upload and optional persistence
//! - Delivery of analysis results to the collaborator

mod config;
mod controller;
mod error;
mod state;

pub use config::SessionConfig;
pub use controller::{SessionController, SessionOutcome};
pub use error::SessionError;
pub use state::{Session, SessionState, SourceKind};
