// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable kill-switch record.

use crate::{state::write_atomic, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Persisted kill-switch state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchRecord {
    pub killed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
}

/// Reads and writes the kill-switch record at `<root>/killswitch.json`.
#[derive(Debug, Clone)]
pub struct KillSwitchStore {
    path: PathBuf,
}

impl KillSwitchStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            path: root.into().join("killswitch.json"),
        }
    }

    /// Load the persisted record; a missing or corrupt file reads as
    /// not-killed so a broken record can never brick startup.
    pub fn load(&self) -> KillSwitchRecord {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return KillSwitchRecord::default(),
        };
        match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt kill-switch record, treating as inactive");
                KillSwitchRecord::default()
            }
        }
    }

    pub fn save(&self, record: &KillSwitchRecord) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(record)?;
        write_atomic(&self.path, &bytes)
    }
}

#[cfg(test)]
#[path = "killswitch_tests.rs"]
mod tests;
