use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle states of a session.
///
/// Transitions run strictly forward through the list; cancellation is the one
/// sanctioned way back to `Idle`. `Completed` and `Failed` are terminal; a
/// new `start` call creates a fresh session rather than reusing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Recording,
    Stopping,
    Uploading,
    Completed,
    Failed,
}

impl SessionState {
    /// Whether this state holds resources (device handle, streaming channel,
    /// or an in-flight upload). At most one session per controller may be in
    /// an active state.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Acquiring
                | SessionState::Recording
                | SessionState::Stopping
                | SessionState::Uploading
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Legal next states. `Idle` targets below are cancellation paths.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        match self {
            // File sessions jump straight to Uploading, skipping capture
            Idle => matches!(next, Acquiring | Uploading),
            Acquiring => matches!(next, Recording | Failed | Idle),
            Recording => matches!(next, Stopping | Failed | Idle),
            Stopping => matches!(next, Uploading | Failed | Idle),
            Uploading => matches!(next, Completed | Failed),
            Completed | Failed => false,
        }
    }
}

/// Where a session's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Microphone,
    File(PathBuf),
}

/// One end-to-end recording/analysis attempt.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub source: SourceKind,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    history: Vec<SessionState>,
}

impl Session {
    pub(crate) fn new(source: SourceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            state: SessionState::Idle,
            started_at: Utc::now(),
            ended_at: None,
            history: vec![SessionState::Idle],
        }
    }

    /// Move to the next state, recording the transition.
    pub(crate) fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.history.push(next);
    }

    /// Every state this session has visited, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }
}
