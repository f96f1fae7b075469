//! Debounced autosave for notes under edit.
//!
//! # Responsibility
//! - Track editing sessions' drafts per note id.
//! - Turn edit bursts into one write and order writes against deletes.
//!
//! # See also
//! - `service::note_service::NoteService::save_note` for the write procedure.

pub mod draft;
pub mod scheduler;
