use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::error::SessionError;
use super::state::{Session, SessionState, SourceKind};
use crate::audio::{
    encode_wav, probe_encoded, AudioFrame, CaptureBackend, CaptureFactory, ChunkAssembler,
    EncodeError, EncodedChunk,
};
use crate::transport::{AnalysisBackend, AnalysisResult, StreamingChannel};

/// How often the capture loop re-checks its stop flag while idle.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the result channel handed to the collaborator.
const RESULT_CHANNEL_CAPACITY: usize = 32;

/// Terminal outcome of a session.
///
/// Success and failure are structurally distinguished; the `Failed` variant
/// still carries the renderable placeholder result when the failure happened
/// on the upload path, so consumers that need something displayable in all
/// cases have it without inspecting sentinel strings.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(AnalysisResult),
    Failed {
        error: SessionError,
        /// Present for upload failures (the synthesized error result);
        /// absent when the session failed before producing anything.
        result: Option<AnalysisResult>,
    },
}

/// What the capture task hands back when it finishes.
#[derive(Default)]
struct CaptureResult {
    /// Complete buffered samples, independent of what was streamed live
    samples: Vec<i16>,
    chunks_emitted: usize,
    chunks_streamed: usize,
}

struct ActiveCapture {
    stop: Arc<AtomicBool>,
    /// Set by the capture task when encoding fails mid-session
    fatal: Arc<Mutex<Option<EncodeError>>>,
    task: JoinHandle<CaptureResult>,
}

/// The recording session state machine.
///
/// Owns at most one active session at a time and all of its resources: the
/// capture device handle, the chunk buffer, and the streaming channel. The
/// collaborator consumes analysis results from the receiver returned by
/// [`SessionController::new`]; live results during streaming and the final
/// batch result both arrive there.
pub struct SessionController {
    backend: Arc<dyn AnalysisBackend>,
    capture_factory: Box<dyn CaptureFactory>,
    config: SessionConfig,
    results_tx: mpsc::Sender<AnalysisResult>,
    session: Option<Session>,
    active: Option<ActiveCapture>,
    last_outcome: Option<SessionOutcome>,
}

impl SessionController {
    /// Create a controller and the result channel for the collaborator.
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        capture_factory: Box<dyn CaptureFactory>,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<AnalysisResult>) {
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        let controller = Self {
            backend,
            capture_factory,
            config,
            results_tx,
            session: None,
            active: None,
            last_outcome: None,
        };

        (controller, results_rx)
    }

    /// State of the current session, `Idle` before the first start.
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    /// The current or most recent session.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Outcome of the most recently finished session.
    pub fn last_outcome(&self) -> Option<&SessionOutcome> {
        self.last_outcome.as_ref()
    }

    /// Start a new session.
    ///
    /// Rejected with [`SessionError::SessionAlreadyActive`] while another
    /// session holds resources; legal again once that session is terminal.
    /// Microphone sessions return as soon as recording is underway. File
    /// sessions skip capture, run the upload to completion, and leave their
    /// result in the outcome and on the result channel.
    pub async fn start(&mut self, source: SourceKind) -> Result<Uuid, SessionError> {
        self.reap_failed_capture().await;

        if self.state().is_active() {
            warn!("start rejected: a session is already {:?}", self.state());
            return Err(SessionError::SessionAlreadyActive);
        }

        match source {
            SourceKind::Microphone => self.start_microphone().await,
            SourceKind::File(path) => self.start_file(path).await,
        }
    }

    async fn start_microphone(&mut self) -> Result<Uuid, SessionError> {
        let mut session = Session::new(SourceKind::Microphone);
        let id = session.id;

        info!("Starting microphone session {}", id);
        session.advance(SessionState::Acquiring);

        let mut device = self.capture_factory.create();

        let frames = match device.acquire().await {
            Ok(rx) => rx,
            Err(e) => {
                // Release whatever the backend may have grabbed before failing
                device.release().await;
                error!("Acquisition failed for session {}: {}", id, e);
                session.advance(SessionState::Failed);
                session.ended_at = Some(Utc::now());
                self.session = Some(session);
                self.last_outcome = Some(SessionOutcome::Failed {
                    error: e.clone().into(),
                    result: None,
                });
                return Err(e.into());
            }
        };

        // Live preview is best effort; the session records without it when
        // the streaming endpoint is unreachable.
        let channel = if self.config.live_streaming {
            match self.backend.open_stream(self.results_tx.clone()).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("Streaming channel unavailable, recording without live preview: {}", e);
                    None
                }
            }
        } else {
            None
        };

        session.advance(SessionState::Recording);

        let stop = Arc::new(AtomicBool::new(false));
        let fatal = Arc::new(Mutex::new(None));
        let assembler = ChunkAssembler::new(self.config.chunk_config());

        let task = tokio::spawn(capture_loop(
            frames,
            device,
            channel,
            assembler,
            stop.clone(),
            fatal.clone(),
        ));

        self.active = Some(ActiveCapture { stop, fatal, task });
        self.session = Some(session);

        Ok(id)
    }

    async fn start_file(&mut self, path: PathBuf) -> Result<Uuid, SessionError> {
        let mut session = Session::new(SourceKind::File(path.clone()));
        let id = session.id;

        info!("Starting file session {} for {}", id, path.display());

        // File sources skip Acquiring/Recording entirely
        session.advance(SessionState::Uploading);

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.wav")
            .to_string();

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                session.advance(SessionState::Failed);
                session.ended_at = Some(Utc::now());
                self.session = Some(session);
                let path_str = path.display().to_string();
                self.last_outcome = Some(SessionOutcome::Failed {
                    error: SessionError::FileRead(path_str.clone(), e.to_string()),
                    result: None,
                });
                return Err(SessionError::FileRead(path_str, e.to_string()));
            }
        };

        // Reject files the decoder cannot identify before bothering the backend
        if let Err(e) = probe_encoded(&bytes, &name) {
            error!("File session {} rejected: {}", id, e);
            session.advance(SessionState::Failed);
            session.ended_at = Some(Utc::now());
            self.session = Some(session);
            self.last_outcome = Some(SessionOutcome::Failed {
                error: e.clone().into(),
                result: None,
            });
            return Err(e.into());
        }

        let outcome = self.upload(bytes, &name, false).await;

        match outcome {
            Ok(result) => {
                session.advance(SessionState::Completed);
                session.ended_at = Some(Utc::now());
                self.session = Some(session);
                self.last_outcome = Some(SessionOutcome::Completed(result));
            }
            Err((error, placeholder)) => {
                session.advance(SessionState::Failed);
                session.ended_at = Some(Utc::now());
                self.session = Some(session);
                self.last_outcome = Some(SessionOutcome::Failed {
                    error: error.into(),
                    result: Some(placeholder),
                });
            }
        }

        Ok(id)
    }

    /// Stop the active recording and run the batch upload.
    ///
    /// Legal only from `Recording`. Always passes through `Stopping`
    /// (capture drained, channel closed, device released) before
    /// `Uploading`. An upload failure is returned as the synthesized error
    /// result with the session in `Failed`, never as an `Err`, so the
    /// caller always has something renderable. `Err` is reserved for
    /// call-site misuse and capture/encoding faults.
    pub async fn stop(&mut self) -> Result<AnalysisResult, SessionError> {
        if let Some(e) = self.reap_failed_capture().await {
            return Err(e.into());
        }

        if self.state() != SessionState::Recording {
            return Err(SessionError::NotRecording);
        }

        let active = self.active.take().ok_or(SessionError::NotRecording)?;

        {
            let session = self.session.as_mut().expect("recording session present");
            info!("Stopping session {}", session.id);
            session.advance(SessionState::Stopping);
        }

        active.stop.store(true, Ordering::SeqCst);

        let captured = match active.task.await {
            Ok(r) => r,
            Err(e) => {
                error!("Capture task panicked: {}", e);
                CaptureResult::default()
            }
        };

        if let Some(e) = active.fatal.lock().expect("fatal slot poisoned").take() {
            let session = self.session.as_mut().expect("recording session present");
            session.advance(SessionState::Failed);
            session.ended_at = Some(Utc::now());
            self.last_outcome = Some(SessionOutcome::Failed {
                error: e.clone().into(),
                result: None,
            });
            return Err(e.into());
        }

        info!(
            "Capture finished: {} chunks ({} streamed live), {} samples buffered",
            captured.chunks_emitted,
            captured.chunks_streamed,
            captured.samples.len()
        );

        {
            let session = self.session.as_mut().expect("recording session present");
            session.advance(SessionState::Uploading);
        }

        // The batch upload carries the complete local buffer, independent of
        // whatever the live stream managed to deliver.
        let blob = match encode_wav(&captured.samples, self.config.sample_rate, self.config.channels)
        {
            Ok(b) => b,
            Err(e) => {
                let session = self.session.as_mut().expect("recording session present");
                session.advance(SessionState::Failed);
                session.ended_at = Some(Utc::now());
                self.last_outcome = Some(SessionOutcome::Failed {
                    error: e.clone().into(),
                    result: None,
                });
                return Err(e.into());
            }
        };

        let name = recording_name(Utc::now());
        let outcome = self.upload(blob, &name, self.config.persist_recordings).await;

        let session = self.session.as_mut().expect("recording session present");
        session.ended_at = Some(Utc::now());

        match outcome {
            Ok(result) => {
                session.advance(SessionState::Completed);
                self.last_outcome = Some(SessionOutcome::Completed(result.clone()));
                Ok(result)
            }
            Err((error, placeholder)) => {
                session.advance(SessionState::Failed);
                self.last_outcome = Some(SessionOutcome::Failed {
                    error: error.into(),
                    result: Some(placeholder.clone()),
                });
                Ok(placeholder)
            }
        }
    }

    /// Abort the active session without producing a result or store request.
    ///
    /// Legal from `Acquiring`, `Recording` and `Stopping`; a no-op
    /// otherwise. Buffered chunks are discarded and all resources released.
    pub async fn cancel(&mut self) {
        self.reap_failed_capture().await;

        let cancellable = matches!(
            self.state(),
            SessionState::Acquiring | SessionState::Recording | SessionState::Stopping
        );
        if !cancellable {
            return;
        }

        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::SeqCst);
            match active.task.await {
                Ok(captured) => {
                    info!("Discarding {} buffered samples", captured.samples.len());
                }
                Err(e) => error!("Capture task panicked during cancel: {}", e),
            }
        }

        let session = self.session.as_mut().expect("active session present");
        info!("Session {} cancelled", session.id);
        session.advance(SessionState::Idle);
        session.ended_at = Some(Utc::now());
    }

    // ------------------------------------------------------------------
    // Recording management passthrough
    // ------------------------------------------------------------------

    pub async fn list_recordings(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.backend.list_recordings().await?)
    }

    pub async fn fetch_recording(&self, name: &str) -> Result<Vec<u8>, SessionError> {
        Ok(self.backend.fetch_recording(name).await?)
    }

    pub async fn delete_recording(&self, name: &str) -> Result<(), SessionError> {
        Ok(self.backend.delete_recording(name).await?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Analyze the blob and optionally persist it. On analysis failure,
    /// returns the transport error together with the renderable placeholder;
    /// both paths deliver the result to the collaborator channel.
    async fn upload(
        &self,
        blob: Vec<u8>,
        name: &str,
        persist: bool,
    ) -> Result<AnalysisResult, (crate::transport::TransportError, AnalysisResult)> {
        match self.backend.process(blob.clone(), name).await {
            Ok(result) => {
                if persist {
                    // A store failure does not invalidate the analysis result
                    if let Err(e) = self.backend.store(blob, name).await {
                        warn!("Failed to store recording {}: {}", name, e);
                    }
                }
                let _ = self.results_tx.send(result.clone()).await;
                Ok(result)
            }
            Err(e) => {
                error!("Analysis upload failed: {}", e);
                let placeholder = AnalysisResult::error_placeholder();
                let _ = self.results_tx.send(placeholder.clone()).await;
                Err((e, placeholder))
            }
        }
    }

    /// Fold a capture task that died of an encoding fault into a terminal
    /// session, returning the fault. The task has already released the device
    /// and closed the channel by the time it sets the fatal slot.
    async fn reap_failed_capture(&mut self) -> Option<EncodeError> {
        let fatal_pending = self
            .active
            .as_ref()
            .map(|a| a.task.is_finished() && a.fatal.lock().expect("fatal slot poisoned").is_some())
            .unwrap_or(false);

        if !fatal_pending {
            return None;
        }

        let active = self.active.take().expect("checked above");
        let _ = active.task.await;

        let e = active.fatal.lock().expect("fatal slot poisoned").take()?;

        if let Some(session) = self.session.as_mut() {
            error!("Session {} failed mid-capture: {}", session.id, e);
            session.advance(SessionState::Failed);
            session.ended_at = Some(Utc::now());
            self.last_outcome = Some(SessionOutcome::Failed {
                error: e.clone().into(),
                result: None,
            });
        }

        Some(e)
    }
}

/// The capture task: consumes frames, buffers samples, assembles chunks and
/// forwards them best-effort over the streaming channel.
///
/// Resource teardown lives in this function's epilogue so the device handle
/// is released and the channel closed exactly once on every exit path,
/// whether that is a normal stop, cancellation, device loss, or an encoding
/// failure.
async fn capture_loop(
    mut frames: mpsc::Receiver<AudioFrame>,
    mut device: Box<dyn CaptureBackend>,
    mut channel: Option<Box<dyn StreamingChannel>>,
    mut assembler: ChunkAssembler,
    stop: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<EncodeError>>>,
) -> CaptureResult {
    let mut result = CaptureResult::default();
    let mut failed = false;

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let frame = match timeout(STOP_POLL_INTERVAL, frames.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("Capture device stopped producing frames");
                break;
            }
            Err(_) => continue, // timeout, re-check the stop flag
        };

        result.samples.extend_from_slice(&frame.samples);

        match assembler.push_frame(&frame) {
            Ok(chunks) => {
                for chunk in chunks {
                    result.chunks_emitted += 1;
                    forward_chunk(&mut channel, &chunk, &mut result.chunks_streamed).await;
                }
            }
            Err(e) => {
                error!("Encoding failed, aborting capture: {}", e);
                *fatal.lock().expect("fatal slot poisoned") = Some(e);
                failed = true;
                break;
            }
        }
    }

    // The trailing partial chunk still goes out on the live stream
    if !failed {
        match assembler.finish() {
            Ok(Some(chunk)) => {
                result.chunks_emitted += 1;
                forward_chunk(&mut channel, &chunk, &mut result.chunks_streamed).await;
            }
            Ok(None) => {}
            Err(e) => {
                error!("Encoding failed while finalizing capture: {}", e);
                *fatal.lock().expect("fatal slot poisoned") = Some(e);
            }
        }
    }

    if let Some(channel) = channel.as_mut() {
        channel.close().await;
    }
    device.release().await;

    result
}

/// Best-effort forward: a failed send is logged and recording continues; the
/// buffered copy stays authoritative.
async fn forward_chunk(
    channel: &mut Option<Box<dyn StreamingChannel>>,
    chunk: &EncodedChunk,
    streamed: &mut usize,
) {
    if let Some(channel) = channel.as_mut() {
        match channel.send_chunk(&chunk.wav).await {
            Ok(()) => *streamed += 1,
            Err(e) => warn!("Failed to forward chunk {}: {}", chunk.index, e),
        }
    }
}

/// Stored-recording naming convention: colons and dots are replaced so the
/// name stays filesystem- and URL-safe.
fn recording_name(now: DateTime<Utc>) -> String {
    format!("recording_{}.wav", now.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_names_avoid_reserved_characters() {
        let now = "2026-08-24T10:30:00.123Z".parse::<DateTime<Utc>>().unwrap();
        let name = recording_name(now);
        assert_eq!(name, "recording_2026-08-24T10-30-00-123Z.wav");
        assert!(!name.contains(':'));
    }
}
