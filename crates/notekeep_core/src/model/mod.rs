//! Domain model for notes and their checklists.
//!
//! # Responsibility
//! - Define canonical data structures used by store, autosave and sync.
//!
//! # Invariants
//! - Every note is identified by a stable `NoteId`.
//! - Store deletion is a hard delete; no tombstone rows are kept.

pub mod note;
