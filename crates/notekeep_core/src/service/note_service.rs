//! Note use-case service.
//!
//! # Responsibility
//! - Be the single entry point the presentation layer calls for notes.
//! - Forward to the repository without adding policy of its own.
//!
//! # Invariants
//! - Filtering, sorting and search over `list_notes()` stay with callers.
//! - `save_note` is the only add-vs-update decision point in core.

use crate::model::note::{Note, NoteId};
use crate::repo::note_repo::{NoteRepository, RepoResult};
use std::sync::Arc;
use tokio::task::JoinError;

/// Note service facade over repository implementations.
pub struct NoteService<R: NoteRepository> {
    repo: R,
}

impl<R: NoteRepository> NoteService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrows the backing repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn list_notes(&self) -> RepoResult<Vec<Note>> {
        self.repo.list()
    }

    pub fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        self.repo.get(id)
    }

    pub fn add_note(&self, note: &Note) -> RepoResult<Note> {
        self.repo.add(note)
    }

    pub fn update_note(&self, note: &Note) -> RepoResult<Note> {
        self.repo.update(note)
    }

    pub fn delete_note(&self, id: NoteId) -> RepoResult<()> {
        self.repo.delete(id)
    }

    /// Writes the note, adding it when absent and replacing it otherwise.
    ///
    /// The existence check and the write are two repository calls; callers
    /// that race deletes must serialize per id around this method.
    /// Repeating the call with identical content only refreshes `updated_at`.
    pub fn save_note(&self, note: &Note) -> RepoResult<Note> {
        match self.repo.get(note.id())? {
            Some(_) => self.repo.update(note),
            None => self.repo.add(note),
        }
    }
}

/// Runs a repository call on the blocking pool.
///
/// The outer `Err` means the worker panicked or was cancelled.
pub(crate) async fn on_blocking_pool<R, T, F>(
    service: &Arc<NoteService<R>>,
    call: F,
) -> Result<RepoResult<T>, JoinError>
where
    R: NoteRepository + 'static,
    T: Send + 'static,
    F: FnOnce(&NoteService<R>) -> RepoResult<T> + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || call(&service)).await
}
