//! Process-local note repository.
//!
//! Same contract as `SqliteNoteRepository` without a durable medium. Used by
//! tests and by hosts that run without a database file.

use crate::db::DbError;
use crate::model::note::{now_epoch_ms, Note, NoteId};
use crate::repo::note_repo::{NoteRepository, RepoError, RepoResult};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// `RwLock<Vec<Note>>`-backed repository keeping insertion order.
#[derive(Default)]
pub struct InMemoryNoteRepository {
    notes: RwLock<Vec<Note>>,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, Vec<Note>>> {
        self.notes.read().map_err(|_| RepoError::Db(DbError::Poisoned))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, Vec<Note>>> {
        self.notes.write().map_err(|_| RepoError::Db(DbError::Poisoned))
    }
}

impl NoteRepository for InMemoryNoteRepository {
    fn list(&self) -> RepoResult<Vec<Note>> {
        Ok(self.read()?.clone())
    }

    fn get(&self, id: NoteId) -> RepoResult<Option<Note>> {
        Ok(self.read()?.iter().find(|note| note.id() == id).cloned())
    }

    fn add(&self, note: &Note) -> RepoResult<Note> {
        note.validate()?;
        let mut notes = self.write()?;
        if notes.iter().any(|stored| stored.id() == note.id()) {
            return Err(RepoError::DuplicateId(note.id()));
        }
        let mut persisted = note.clone();
        persisted.stamp_updated_at(now_epoch_ms());
        notes.push(persisted.clone());
        Ok(persisted)
    }

    fn update(&self, note: &Note) -> RepoResult<Note> {
        note.validate()?;
        let mut notes = self.write()?;
        let stored = notes
            .iter_mut()
            .find(|stored| stored.id() == note.id())
            .ok_or(RepoError::NotFound(note.id()))?;

        let mut persisted = Note::restore(
            note.id(),
            note.title.clone(),
            note.content.clone(),
            note.items.clone(),
            stored.created_at(),
            stored.created_at(),
        )?;
        persisted.stamp_updated_at(now_epoch_ms());
        *stored = persisted.clone();
        Ok(persisted)
    }

    fn delete(&self, id: NoteId) -> RepoResult<()> {
        self.write()?.retain(|note| note.id() != id);
        Ok(())
    }

    fn import(&self, note: &Note) -> RepoResult<bool> {
        note.validate()?;
        let mut notes = self.write()?;
        match notes.iter_mut().find(|stored| stored.id() == note.id()) {
            Some(stored) if stored.updated_at() >= note.updated_at() => return Ok(false),
            Some(stored) => *stored = note.clone(),
            None => notes.push(note.clone()),
        }
        Ok(true)
    }
}
