//! Pull/push synchronization against an external note source.
//!
//! # Responsibility
//! - Define the bridge contract remote transports implement.
//! - Apply last-writer-wins reconciliation at whole-note granularity.
//!
//! # Invariants
//! - Sync errors are recoverable and never abort the host.
//! - Sync reads and writes go through the note repository only; it does not
//!   touch autosave state.

pub mod bridge;
pub mod coordinator;
pub mod reconcile;
