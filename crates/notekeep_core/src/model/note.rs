//! Note domain model.
//!
//! # Responsibility
//! - Define the note record and its ordered checklist.
//! - Provide checklist editing helpers for the owning editing session.
//!
//! # Invariants
//! - `id` and `created_at` never change after construction.
//! - `updated_at >= created_at`.
//! - Checklist item ids are unique within one note.
//! - `updated_at` is refreshed only by persistence, never by edits.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier of one note.
pub type NoteId = Uuid;

/// Stable identifier of one checklist row.
pub type ItemId = Uuid;

/// Validation failures for note invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    /// `updated_at` is earlier than `created_at`.
    UpdatedBeforeCreated { created_at: i64, updated_at: i64 },
    /// Two checklist rows share one id.
    DuplicateItemId(ItemId),
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) must be >= created_at ({created_at})"
            ),
            Self::DuplicateItemId(id) => write!(f, "duplicate checklist item id: {id}"),
        }
    }
}

impl Error for NoteValidationError {}

/// One checklist row within a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: ItemId,
    /// Row text, may be empty.
    pub text: String,
    pub is_completed: bool,
}

impl ChecklistItem {
    /// Creates an unchecked row with a generated id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_completed: false,
        }
    }
}

/// Canonical note record shared by the store, autosave and sync paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    id: NoteId,
    /// Required title; an empty string is allowed.
    pub title: String,
    /// Free-text body.
    pub content: Option<String>,
    /// Ordered checklist. Order is meaningful and persisted verbatim.
    pub items: Vec<ChecklistItem>,
    /// Unix epoch milliseconds.
    created_at: i64,
    /// Unix epoch milliseconds of the last successful persisted write.
    updated_at: i64,
}

impl Note {
    /// Creates a new in-memory note with a generated id.
    ///
    /// The note is not durable until the first successful store write.
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), title, now_epoch_ms())
    }

    /// Creates a note with caller-provided identity.
    ///
    /// Used by import/sync paths where the id already exists externally.
    pub fn with_id(id: NoteId, title: impl Into<String>, created_at: i64) -> Self {
        Self {
            id,
            title: title.into(),
            content: None,
            items: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Rebuilds a note from persisted or remote parts.
    ///
    /// # Errors
    /// - Returns `NoteValidationError` when the parts break note invariants.
    pub fn restore(
        id: NoteId,
        title: impl Into<String>,
        content: Option<String>,
        items: Vec<ChecklistItem>,
        created_at: i64,
        updated_at: i64,
    ) -> Result<Self, NoteValidationError> {
        let note = Self {
            id,
            title: title.into(),
            content,
            items,
            created_at,
            updated_at,
        };
        note.validate()?;
        Ok(note)
    }

    pub fn id(&self) -> NoteId {
        self.id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Sets the persisted write timestamp, clamped to `created_at`.
    pub(crate) fn stamp_updated_at(&mut self, epoch_ms: i64) {
        self.updated_at = epoch_ms.max(self.created_at);
    }

    /// Appends an unchecked row and returns its id.
    pub fn add_item(&mut self, text: impl Into<String>) -> ItemId {
        let item = ChecklistItem::new(text);
        let id = item.id;
        self.items.push(item);
        id
    }

    /// Removes one row by id, keeping the relative order of the rest.
    pub fn remove_item(&mut self, item_id: ItemId) -> Option<ChecklistItem> {
        let index = self.items.iter().position(|item| item.id == item_id)?;
        Some(self.items.remove(index))
    }

    pub fn item_mut(&mut self, item_id: ItemId) -> Option<&mut ChecklistItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    /// Moves the row at `from` to position `to`.
    ///
    /// Returns `false` and leaves the list untouched when either index is out
    /// of bounds.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        true
    }

    /// Checks note invariants before persistence.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.updated_at < self.created_at {
            return Err(NoteValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }

        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if !seen.insert(item.id) {
                return Err(NoteValidationError::DuplicateItemId(item.id));
            }
        }

        Ok(())
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::{ChecklistItem, Note, NoteValidationError};
    use uuid::Uuid;

    #[test]
    fn new_note_starts_with_equal_timestamps_and_empty_checklist() {
        let note = Note::new("Groceries");
        assert_eq!(note.created_at(), note.updated_at());
        assert!(note.items.is_empty());
        assert!(note.content.is_none());
    }

    #[test]
    fn checklist_helpers_keep_order() {
        let mut note = Note::new("Groceries");
        let milk = note.add_item("Milk");
        let eggs = note.add_item("Eggs");
        let bread = note.add_item("Bread");

        assert!(note.move_item(2, 0));
        let order: Vec<_> = note.items.iter().map(|item| item.id).collect();
        assert_eq!(order, vec![bread, milk, eggs]);

        let removed = note.remove_item(milk).expect("milk should be removed");
        assert_eq!(removed.text, "Milk");
        assert_eq!(note.items.len(), 2);
        assert!(!note.move_item(0, 5));

        note.item_mut(eggs).expect("eggs row").is_completed = true;
        assert!(note.items[1].is_completed);
    }

    #[test]
    fn restore_rejects_updated_before_created() {
        let err = Note::restore(Uuid::new_v4(), "x", None, vec![], 2_000, 1_000)
            .expect_err("timestamps out of order must fail");
        assert!(matches!(
            err,
            NoteValidationError::UpdatedBeforeCreated { .. }
        ));
    }

    #[test]
    fn validate_rejects_duplicate_item_ids() {
        let item = ChecklistItem::new("dup");
        let mut note = Note::new("dups");
        note.items.push(item.clone());
        note.items.push(item.clone());
        assert_eq!(
            note.validate(),
            Err(NoteValidationError::DuplicateItemId(item.id))
        );
    }

    #[test]
    fn stamp_never_moves_before_created_at() {
        let mut note = Note::with_id(Uuid::new_v4(), "clock skew", 5_000);
        note.stamp_updated_at(1_000);
        assert_eq!(note.updated_at(), 5_000);
        note.stamp_updated_at(9_000);
        assert_eq!(note.updated_at(), 9_000);
    }
}
