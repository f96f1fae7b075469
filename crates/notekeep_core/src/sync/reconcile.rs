//! Last-writer-wins reconciliation between local and remote note sets.
//!
//! Whole-note granularity: the note with the greater `updated_at` replaces
//! the other entirely. Ties keep the local copy.

use crate::model::note::{Note, NoteId};
use std::collections::{HashMap, HashSet};

/// Outcome of comparing one local and one remote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Remote notes to write locally: remote-only ids and newer remote copies.
    pub adopt: Vec<Note>,
    /// Ids present on both sides where the local copy wins.
    pub kept_local: usize,
    /// Ids present only locally; they reach the remote with the next push.
    pub local_only: usize,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.adopt.is_empty()
    }
}

/// Builds the plan that makes local state the union of both sides.
///
/// Remote order is preserved in `adopt`.
pub fn reconcile(local: &[Note], remote: Vec<Note>) -> SyncPlan {
    let local_by_id: HashMap<NoteId, &Note> =
        local.iter().map(|note| (note.id(), note)).collect();

    let mut plan = SyncPlan::default();
    let mut matched = HashSet::new();
    for remote_note in remote {
        match local_by_id.get(&remote_note.id()) {
            Some(local_note) => {
                matched.insert(remote_note.id());
                if remote_note.updated_at() > local_note.updated_at() {
                    plan.adopt.push(remote_note);
                } else {
                    plan.kept_local += 1;
                }
            }
            None => plan.adopt.push(remote_note),
        }
    }
    plan.local_only = local_by_id.len() - matched.len();
    plan
}
