//! Persistence and autosave engine for notekeep.
//! This crate owns note storage, debounced autosave and sync reconciliation.

pub mod autosave;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use autosave::draft::NoteDraft;
pub use autosave::scheduler::{
    AutosaveError, AutosaveEvent, AutosaveResult, AutosaveScheduler, FlushReport, LaneState,
    WriteTrigger,
};
pub use config::{AutosaveConfig, ConfigError, CoreConfig, SyncConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::note::{ChecklistItem, ItemId, Note, NoteId, NoteValidationError};
pub use repo::memory_repo::InMemoryNoteRepository;
pub use repo::note_repo::{NoteRepository, RepoError, RepoResult, SqliteNoteRepository};
pub use service::note_service::NoteService;
pub use sync::bridge::{NoopSyncBridge, SyncBridge, SyncError, SyncResult, SyncStage};
pub use sync::coordinator::{SyncCoordinator, SyncReport};
pub use sync::reconcile::{reconcile, SyncPlan};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
