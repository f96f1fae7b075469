//! Note repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide durable keyed CRUD over notes and their checklists.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Every write runs in one transaction; readers never see a half-written
//!   note or a partial checklist.
//! - Writes call `Note::validate()` before SQL mutations.
//! - `update` is a full replace; checklist rows are rewritten in order.
//! - `delete` is idempotent.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::note::{now_epoch_ms, ChecklistItem, Note, NoteId, NoteValidationError};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    title,
    content,
    created_at,
    updated_at
FROM notes";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for note persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Backing medium could not be opened or bootstrapped.
    StorageUnavailable(DbError),
    NotFound(NoteId),
    /// `add` called for an id that already exists.
    DuplicateId(NoteId),
    Validation(NoteValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageUnavailable(err) => write!(f, "note storage unavailable: {err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::DuplicateId(id) => write!(f, "note already exists: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted note data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) | Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::NotFound(_) | Self::DuplicateId(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<NoteValidationError> for RepoError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable keyed storage for notes.
///
/// Implementations are shared process-wide and called from the blocking
/// pool, so every method must be safe to call concurrently.
pub trait NoteRepository: Send + Sync {
    /// Returns every stored note. No ordering is promised to callers.
    fn list(&self) -> RepoResult<Vec<Note>>;
    /// Gets one note; absence is `Ok(None)`.
    fn get(&self, id: NoteId) -> RepoResult<Option<Note>>;
    /// Inserts a new note and returns the persisted copy.
    fn add(&self, note: &Note) -> RepoResult<Note>;
    /// Replaces an existing note and returns the persisted copy.
    fn update(&self, note: &Note) -> RepoResult<Note>;
    /// Removes a note if present.
    fn delete(&self, id: NoteId) -> RepoResult<()>;
    /// Stores a note verbatim, keeping its own `updated_at`, unless the
    /// stored copy is at least as new.
    ///
    /// The comparison and the write happen in one transaction. Returns
    /// `false` when the stored copy won and nothing was written. Used by
    /// sync adoption so last-writer-wins timestamps survive.
    fn import(&self, note: &Note) -> RepoResult<bool>;
}

/// SQLite-backed note repository owning the process-wide connection.
///
/// The connection lock is held for the duration of one transaction only.
pub struct SqliteNoteRepository {
    conn: Mutex<Connection>,
}

impl SqliteNoteRepository {
    /// Opens (or creates) the database file and wraps it.
    ///
    /// # Errors
    /// - `StorageUnavailable` when the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let conn = open_db(path).map_err(RepoError::StorageUnavailable)?;
        Self::try_new(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        let conn = open_db_in_memory().map_err(RepoError::StorageUnavailable)?;
        Self::try_new(conn)
    }

    /// Wraps a migrated connection after checking the expected tables exist.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Closes the underlying connection, surfacing any close error.
    pub fn close(self) -> RepoResult<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| RepoError::Db(DbError::Poisoned))?;
        conn.close().map_err(|(_, err)| RepoError::from(err))
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RepoError::Db(DbError::Poisoned))
    }
}

impl NoteRepository for SqliteNoteRepository {
    fn list(&self) -> RepoResult<Vec<Note>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let notes = {
            let mut stmt = tx.prepare(&format!("{NOTE_SELECT_SQL} ORDER BY rowid ASC;"))?;
            let mut rows = stmt.query([])?;
            let mut notes = Vec::new();
            while let Some(row) = rows.next()? {
                notes.push(parse_note_row(&tx, row)?);
            }
            notes
        };
        tx.commit()?;
        Ok(notes)
    }

    fn get(&self, id: NoteId) -> RepoResult<Option<Note>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let note = load_note(&tx, id)?;
        tx.commit()?;
        Ok(note)
    }

    fn add(&self, note: &Note) -> RepoResult<Note> {
        note.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if note_exists(&tx, note.id())? {
            return Err(RepoError::DuplicateId(note.id()));
        }

        let mut persisted = note.clone();
        persisted.stamp_updated_at(now_epoch_ms());
        tx.execute(
            "INSERT INTO notes (id, title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                persisted.id().to_string(),
                persisted.title.as_str(),
                persisted.content.as_deref(),
                persisted.created_at(),
                persisted.updated_at(),
            ],
        )?;
        insert_items(&tx, &persisted)?;
        tx.commit()?;

        Ok(persisted)
    }

    fn update(&self, note: &Note) -> RepoResult<Note> {
        note.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored_created_at: Option<i64> = tx
            .query_row(
                "SELECT created_at FROM notes WHERE id = ?1;",
                [note.id().to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(created_at) = stored_created_at else {
            return Err(RepoError::NotFound(note.id()));
        };

        let mut persisted = Note::restore(
            note.id(),
            note.title.clone(),
            note.content.clone(),
            note.items.clone(),
            created_at,
            created_at,
        )?;
        persisted.stamp_updated_at(now_epoch_ms());
        tx.execute(
            "UPDATE notes
             SET
                title = ?2,
                content = ?3,
                updated_at = ?4
             WHERE id = ?1;",
            params![
                persisted.id().to_string(),
                persisted.title.as_str(),
                persisted.content.as_deref(),
                persisted.updated_at(),
            ],
        )?;
        tx.execute(
            "DELETE FROM checklist_items WHERE note_id = ?1;",
            [persisted.id().to_string()],
        )?;
        insert_items(&tx, &persisted)?;
        tx.commit()?;

        Ok(persisted)
    }

    fn delete(&self, id: NoteId) -> RepoResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM notes WHERE id = ?1;", [id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    fn import(&self, note: &Note) -> RepoResult<bool> {
        note.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "INSERT INTO notes (id, title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
             WHERE excluded.updated_at > notes.updated_at;",
            params![
                note.id().to_string(),
                note.title.as_str(),
                note.content.as_deref(),
                note.created_at(),
                note.updated_at(),
            ],
        )?;
        if changed == 0 {
            tx.commit()?;
            return Ok(false);
        }
        tx.execute(
            "DELETE FROM checklist_items WHERE note_id = ?1;",
            [note.id().to_string()],
        )?;
        insert_items(&tx, note)?;
        tx.commit()?;
        Ok(true)
    }
}

fn insert_items(tx: &Transaction<'_>, note: &Note) -> RepoResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO checklist_items (id, note_id, position, text, is_completed)
         VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    let note_id = note.id().to_string();
    for (position, item) in note.items.iter().enumerate() {
        stmt.execute(params![
            item.id.to_string(),
            note_id.as_str(),
            position as i64,
            item.text.as_str(),
            bool_to_int(item.is_completed),
        ])?;
    }
    Ok(())
}

fn load_note(tx: &Transaction<'_>, id: NoteId) -> RepoResult<Option<Note>> {
    let mut stmt = tx.prepare(&format!("{NOTE_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_note_row(tx, row)?)),
        None => Ok(None),
    }
}

fn parse_note_row(tx: &Transaction<'_>, row: &Row<'_>) -> RepoResult<Note> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "notes.id")?;
    let items = load_items(tx, &id_text)?;

    Note::restore(
        id,
        row.get::<_, String>("title")?,
        row.get("content")?,
        items,
        row.get("created_at")?,
        row.get("updated_at")?,
    )
    .map_err(|err| RepoError::InvalidData(format!("note {id}: {err}")))
}

fn load_items(tx: &Transaction<'_>, note_id: &str) -> RepoResult<Vec<ChecklistItem>> {
    let mut stmt = tx.prepare(
        "SELECT id, text, is_completed
         FROM checklist_items
         WHERE note_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([note_id])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        let is_completed = match row.get::<_, i64>("is_completed")? {
            0 => false,
            1 => true,
            other => {
                return Err(RepoError::InvalidData(format!(
                    "invalid is_completed value `{other}` in checklist_items.is_completed"
                )));
            }
        };
        items.push(ChecklistItem {
            id: parse_uuid(&id_text, "checklist_items.id")?,
            text: row.get("text")?,
            is_completed,
        });
    }
    Ok(items)
}

fn note_exists(tx: &Transaction<'_>, id: NoteId) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    for table in ["notes", "checklist_items"] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::StorageUnavailable(DbError::MissingTable(table)));
        }
    }
    Ok(())
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
