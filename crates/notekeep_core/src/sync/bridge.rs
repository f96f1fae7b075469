//! Sync bridge contract and the no-op bridge.
//!
//! # Invariants
//! - Bridge failures are always recoverable `SyncError::Unavailable` values.
//! - A failed `push` never touches local state.

use crate::model::note::Note;
use crate::repo::note_repo::RepoError;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type SyncResult<T> = Result<T, SyncError>;

/// Phase of a sync run, carried in errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Pull,
    Push,
}

impl SyncStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }
}

#[derive(Debug)]
pub enum SyncError {
    /// Remote unreachable, rejected the call, or exceeded the deadline.
    Unavailable { stage: SyncStage, reason: String },
    /// Local repository failed while applying adopted notes.
    Store(RepoError),
    /// Blocking worker running a repository call did not complete.
    Worker(String),
}

impl SyncError {
    pub fn unavailable(stage: SyncStage, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            stage,
            reason: reason.into(),
        }
    }

    pub fn timed_out(stage: SyncStage, deadline: Duration) -> Self {
        Self::unavailable(
            stage,
            format!("deadline of {}ms exceeded", deadline.as_millis()),
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { stage, reason } => {
                write!(f, "sync unavailable during {}: {reason}", stage.as_str())
            }
            Self::Store(err) => write!(f, "sync could not update local notes: {err}"),
            Self::Worker(message) => write!(f, "sync worker failed: {message}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Transport to a remote party holding a full copy of the notes.
///
/// The wire format is up to each implementation.
#[async_trait]
pub trait SyncBridge: Send + Sync {
    /// Stable identifier used in log events.
    fn bridge_id(&self) -> &str;
    /// Returns the remote party's current full note set.
    async fn pull(&self) -> SyncResult<Vec<Note>>;
    /// Sends the full local note set to the remote party.
    async fn push(&self, notes: &[Note]) -> SyncResult<()>;
}

/// Bridge for environments with no remote configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSyncBridge;

#[async_trait]
impl SyncBridge for NoopSyncBridge {
    fn bridge_id(&self) -> &str {
        "noop"
    }

    async fn pull(&self) -> SyncResult<Vec<Note>> {
        Ok(Vec::new())
    }

    async fn push(&self, _notes: &[Note]) -> SyncResult<()> {
        Ok(())
    }
}
