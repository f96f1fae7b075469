//! Core runtime configuration.
//!
//! # Responsibility
//! - Carry tunables for autosave, sync and logging with stable defaults.
//! - Stay format-agnostic: hosts deserialize from whatever source they own.
//!
//! # Invariants
//! - Missing fields fall back to defaults.
//! - `validate()` rejects zero durations.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_SYNC_DEADLINE_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroDebounce,
    ZeroSyncDeadline,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroDebounce => write!(f, "autosave.debounce_ms must be greater than zero"),
            Self::ZeroSyncDeadline => write!(f, "sync.deadline_ms must be greater than zero"),
        }
    }
}

impl Error for ConfigError {}

/// Top-level core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub autosave: AutosaveConfig,
    pub sync: SyncConfig,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            autosave: AutosaveConfig::default(),
            sync: SyncConfig::default(),
            log_level: default_log_level().to_string(),
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.autosave.validate()?;
        self.sync.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a write fires.
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroDebounce);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound for each pull or push call.
    pub deadline_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_SYNC_DEADLINE_MS,
        }
    }
}

impl SyncConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_ms == 0 {
            return Err(ConfigError::ZeroSyncDeadline);
        }
        Ok(())
    }
}
