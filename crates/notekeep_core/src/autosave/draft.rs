//! Shared in-memory working copy of a note.

use crate::model::note::{Note, NoteId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable handle to the editing session's working copy.
///
/// The editing session mutates it; the autosave scheduler snapshots it when a
/// write fires. The note id cannot change through this handle.
#[derive(Debug, Clone)]
pub struct NoteDraft {
    id: NoteId,
    note: Arc<Mutex<Note>>,
}

impl NoteDraft {
    pub(crate) fn new(note: Note) -> Self {
        Self {
            id: note.id(),
            note: Arc::new(Mutex::new(note)),
        }
    }

    pub fn id(&self) -> NoteId {
        self.id
    }

    /// Clones the current in-memory state.
    pub fn snapshot(&self) -> Note {
        self.lock().clone()
    }

    /// Applies `edit` to the working copy and returns its result.
    ///
    /// This does not schedule a write; use `AutosaveScheduler::edit` or call
    /// `notify_edit` afterwards.
    pub fn edit<T>(&self, edit: impl FnOnce(&mut Note) -> T) -> T {
        edit(&mut self.lock())
    }

    pub(crate) fn record_persisted(&self, updated_at: i64) {
        self.lock().stamp_updated_at(updated_at);
    }

    // A panic inside an `edit` closure leaves a plain value behind; keep using it.
    fn lock(&self) -> MutexGuard<'_, Note> {
        self.note.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
