//! Note store contract and persistence implementations.
//!
//! # Responsibility
//! - Define the keyed CRUD contract shared by autosave, sync and the service.
//! - Isolate SQLite details from orchestration code.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateId`) in
//!   addition to transport errors.
//! - Per-note writes are atomic; no lock spans unrelated work across calls.

pub mod memory_repo;
pub mod note_repo;
