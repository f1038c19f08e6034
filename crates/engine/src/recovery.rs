// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation after a restart.
//!
//! Persisted agents come back in `restored` status with no child; a later
//! message resumes their recorded session. Orphan CLI processes from a
//! prior non-graceful exit are reaped, and workspace / shared-context
//! leftovers with no surviving agent are removed.

use crate::manager::AgentManager;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use warden_adapters::ChildAdapter;
use warden_core::SupervisorError;
use warden_storage::StateStore;

/// What recovery did, for the startup log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Startup was blocked by a kill-switch tombstone.
    pub tombstoned: bool,
    pub restored: usize,
    pub orphans_killed: usize,
    pub workspaces_removed: usize,
    pub context_files_removed: usize,
}

/// Run the startup sequence. Called once, after the token service exists.
pub async fn run_recovery<A: ChildAdapter>(
    manager: &AgentManager<A>,
    state_store: &StateStore,
    event_store: &warden_storage::EventLogStore,
    workspace_root: &Path,
    context_dir: &Path,
    cli_bin: &str,
) -> Result<RecoveryReport, SupervisorError> {
    let mut report = RecoveryReport::default();

    // 1. A tombstone means the kill switch fired; the operator clears it.
    if state_store.has_tombstone() {
        warn!("tombstone present, skipping agent restore");
        report.tombstoned = true;
        return Ok(report);
    }

    // 2. Interrupted writes and orphan event logs
    if let Err(e) = state_store.cleanup_stale(event_store) {
        warn!(error = %e, "stale-state cleanup failed");
    }

    // 3. CLI processes whose parent is not this daemon
    report.orphans_killed = reap_orphans(cli_bin, std::process::id());

    // 4. Rehydrate state files as restored shells (no child spawned)
    let records = state_store
        .load_all()
        .map_err(|e| SupervisorError::Misconfigured(format!("cannot load agent state: {e}")))?;
    let mut live_ids = BTreeSet::new();
    for record in records {
        live_ids.insert(record.id.to_string());
        manager.register_restored(record);
        report.restored += 1;
    }

    // 5. Workspace directories with no surviving agent
    report.workspaces_removed = remove_stale_workspaces(workspace_root, &live_ids);

    // 6. Obsolete per-agent working-memory files in the shared context dir
    report.context_files_removed = remove_stale_context_files(context_dir, &live_ids);

    info!(
        restored = report.restored,
        orphans = report.orphans_killed,
        workspaces = report.workspaces_removed,
        "recovery complete"
    );
    Ok(report)
}

/// SIGKILL every process named like the CLI whose parent is not us.
fn reap_orphans(cli_bin: &str, self_pid: u32) -> usize {
    let process_name = cli_bin.rsplit('/').next().unwrap_or(cli_bin);
    let Ok(entries) = fs::read_dir("/proc") else {
        return 0;
    };

    let mut killed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        if pid == self_pid as i32 {
            continue;
        }

        let comm = fs::read_to_string(entry.path().join("comm")).unwrap_or_default();
        if comm.trim() != process_name {
            continue;
        }
        let stat = fs::read_to_string(entry.path().join("stat")).unwrap_or_default();
        match parse_stat_ppid(&stat) {
            Some(ppid) if ppid == self_pid as i32 => continue,
            _ => {}
        }

        warn!(pid, process = process_name, "killing orphan agent process");
        if kill(Pid::from_raw(pid), Signal::SIGKILL).is_ok() {
            killed += 1;
        }
    }
    killed
}

/// Parent pid is field 4 of `/proc/<pid>/stat`, after the parenthesized
/// comm (which may itself contain spaces and parens).
fn parse_stat_ppid(stat: &str) -> Option<i32> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    after_comm.split_whitespace().nth(1)?.parse().ok()
}

fn remove_stale_workspaces(workspace_root: &Path, live_ids: &BTreeSet<String>) -> usize {
    let Ok(entries) = fs::read_dir(workspace_root) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(id) = name.strip_prefix("workspace-") else {
            continue;
        };
        if !live_ids.contains(id) {
            info!(workspace = name, "removing stale workspace");
            if fs::remove_dir_all(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }
    removed
}

fn remove_stale_context_files(context_dir: &Path, live_ids: &BTreeSet<String>) -> usize {
    let Ok(entries) = fs::read_dir(context_dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(id) = name.strip_suffix(".md") else {
            continue;
        };
        if !live_ids.contains(id) {
            info!(file = name, "removing obsolete working-memory file");
            if fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }
    removed
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
