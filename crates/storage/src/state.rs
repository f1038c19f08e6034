// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent state files and the kill-switch tombstone.
//!
//! One `<id>.json` file per agent. Writes go to `<id>.json.tmp`, fsync,
//! then rename, so a crash mid-write never corrupts the visible file.
//! Loading is tolerant: files that are flagged (`.tmp` suffix, `_` prefix),
//! empty, or unparseable are skipped without failing startup.

use crate::{events::EventLogStore, StorageError};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use warden_core::{AgentId, AgentRecord};

const TOMBSTONE_FILE: &str = "killswitch.tombstone";

/// Store of durable per-agent state under `<root>/agents/`.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
    tombstone_path: PathBuf,
}

impl StateStore {
    /// Open (and create) the store under the given root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        let state_dir = root.join("agents");
        fs::create_dir_all(&state_dir)?;
        Ok(Self {
            state_dir,
            tombstone_path: root.join(TOMBSTONE_FILE),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_path(&self, id: &str) -> PathBuf {
        self.state_dir.join(format!("{id}.json"))
    }

    /// Write a record atomically (`.tmp` + fsync + rename).
    pub fn save(&self, record: &AgentRecord) -> Result<(), StorageError> {
        let path = self.state_path(record.id.as_str());
        let tmp_path = self.state_dir.join(format!("{}.json.tmp", record.id));

        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, record)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Load every persisted record.
    ///
    /// Returns empty while the tombstone is present; the operator must
    /// clear it before agents can be rehydrated. Flagged or broken files
    /// are skipped; empty files are deleted as a side effect.
    pub fn load_all(&self) -> Result<Vec<AgentRecord>, StorageError> {
        if self.has_tombstone() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.state_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") || name.starts_with('_') {
                continue;
            }

            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable state file, skipping");
                    continue;
                }
            };
            if content.trim().is_empty() {
                warn!(path = %path.display(), "empty state file, deleting");
                let _ = fs::remove_file(&path);
                continue;
            }

            let record: AgentRecord = match serde_json::from_str(&content) {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt state file, skipping");
                    continue;
                }
            };

            let stem = name.trim_end_matches(".json");
            if record.id.as_str() != stem {
                warn!(
                    path = %path.display(),
                    id = %record.id,
                    "state file id does not match filename, skipping"
                );
                continue;
            }

            records.push(record);
        }
        Ok(records)
    }

    /// Ids of all currently persisted agents.
    pub fn persisted_ids(&self) -> Result<BTreeSet<String>, StorageError> {
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(&self.state_dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if name.ends_with(".json") && !name.starts_with('_') {
                ids.insert(name.trim_end_matches(".json").to_string());
            }
        }
        Ok(ids)
    }

    /// Remove an agent's state file and any leftover `.tmp`. Idempotent.
    pub fn remove(&self, id: &AgentId) -> Result<(), StorageError> {
        let path = self.state_path(id.as_str());
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        let tmp = self.state_dir.join(format!("{id}.json.tmp"));
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Startup sweep: delete interrupted `.tmp` writes and event logs of
    /// agents that are no longer persisted.
    pub fn cleanup_stale(&self, events: &EventLogStore) -> Result<(), StorageError> {
        for entry in fs::read_dir(&self.state_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                warn!(path = %path.display(), "removing interrupted state write");
                let _ = fs::remove_file(&path);
            }
        }

        let live = self.persisted_ids()?;
        events.remove_orphans(&live)?;
        Ok(())
    }

    // ── Tombstone ───────────────────────────────────────────────────────────

    pub fn write_tombstone(&self) -> Result<(), StorageError> {
        fs::write(&self.tombstone_path, b"")?;
        Ok(())
    }

    pub fn has_tombstone(&self) -> bool {
        self.tombstone_path.exists()
    }

    pub fn clear_tombstone(&self) -> Result<(), StorageError> {
        if let Err(e) = fs::remove_file(&self.tombstone_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// Write arbitrary bytes atomically next to their final path.
///
/// Shared by the kill-switch record store.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
