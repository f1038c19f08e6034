// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-agent event logs.
//!
//! One `<id>.jsonl` file per agent under `<root>/events/`, one sanitized
//! event per line. The engine accumulates lines into batches and appends a
//! whole batch in a single write.

use crate::StorageError;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use warden_core::StreamEvent;

/// Store of append-only event history under `<root>/events/`.
#[derive(Debug, Clone)]
pub struct EventLogStore {
    events_dir: PathBuf,
}

impl EventLogStore {
    /// Open (and create) the store under the given root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let events_dir = root.into().join("events");
        fs::create_dir_all(&events_dir)?;
        Ok(Self { events_dir })
    }

    pub fn events_dir(&self) -> &Path {
        &self.events_dir
    }

    pub fn log_path(&self, id: &str) -> PathBuf {
        self.events_dir.join(format!("{id}.jsonl"))
    }

    /// Append a pre-serialized batch of newline-terminated JSONL lines.
    pub fn append_batch(&self, id: &str, batch: &str) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(id))?;
        file.write_all(batch.as_bytes())?;
        Ok(())
    }

    /// Read the full event history of an agent from disk.
    ///
    /// Unparseable lines are skipped with a warning; a missing file reads
    /// as empty history.
    pub fn read_all(&self, id: &str) -> Result<Vec<StreamEvent>, StorageError> {
        let path = self.log_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamEvent>(trimmed) {
                Ok(ev) => events.push(ev),
                Err(e) => {
                    warn!(agent = id, error = %e, "skipping malformed event log line");
                }
            }
        }
        Ok(events)
    }

    /// Remove an agent's event log. Idempotent.
    pub fn remove(&self, id: &str) -> Result<(), StorageError> {
        if let Err(e) = fs::remove_file(self.log_path(id)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Delete event logs whose agent is no longer persisted.
    pub fn remove_orphans(&self, live_ids: &BTreeSet<String>) -> Result<usize, StorageError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.events_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".jsonl") else {
                continue;
            };
            if !live_ids.contains(stem) {
                warn!(path = %path.display(), "removing orphan event log");
                let _ = fs::remove_file(&path);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
