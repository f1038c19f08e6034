// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace preparation for agent execution.
//!
//! Every agent gets `workspace-<id>` under the workspace root: a git
//! worktree when repository context is supplied, a plain directory
//! otherwise. Attachments are written into the workspace before the first
//! child spawn.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;
use warden_core::SupervisorError;

/// Window allowed for one git worktree operation before it is killed.
const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(60);

/// Run a git command under the worktree timeout.
///
/// Timeout expiry kills the child (tokio `Child` drop) and reads as an
/// error naming the operation.
async fn run_git(mut cmd: Command, operation: &str) -> Result<Output, String> {
    match tokio::time::timeout(GIT_WORKTREE_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("{operation} failed: {e}")),
        Err(_) => Err(format!(
            "{operation} timed out after {}s",
            GIT_WORKTREE_TIMEOUT.as_secs()
        )),
    }
}

/// Repository context for a worktree-backed workspace.
#[derive(Debug, Clone)]
pub struct RepoContext {
    /// Path of the repository to create the worktree from.
    pub repo_path: PathBuf,
    /// Branch to base the worktree on (repository default when unset).
    pub base_branch: Option<String>,
}

/// A file written into the workspace before the first spawn.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Path relative to the workspace root.
    pub name: String,
    pub content: String,
}

/// Workspace directory for an agent id.
pub fn workspace_dir(root: &Path, agent_id: &str) -> PathBuf {
    root.join(format!("workspace-{agent_id}"))
}

/// Create the workspace, as a worktree when repo context is given.
pub async fn prepare_workspace(
    root: &Path,
    agent_id: &str,
    repo: Option<&RepoContext>,
) -> Result<PathBuf, SupervisorError> {
    let dir = workspace_dir(root, agent_id);
    tokio::fs::create_dir_all(root).await?;

    match repo {
        None => {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Some(repo) => {
            let branch = format!("warden/{agent_id}");
            let mut cmd = Command::new("git");
            cmd.arg("-C")
                .arg(&repo.repo_path)
                .args(["worktree", "add", "-b", &branch])
                .arg(&dir);
            if let Some(base) = &repo.base_branch {
                cmd.arg(base);
            }

            let output = run_git(cmd, "git worktree add")
                .await
                .map_err(SupervisorError::Spawn)?;
            if !output.status.success() {
                return Err(SupervisorError::Spawn(format!(
                    "git worktree add failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
        }
    }

    Ok(dir)
}

/// Write attachments into the workspace.
pub async fn write_attachments(
    dir: &Path,
    attachments: &[Attachment],
) -> Result<(), SupervisorError> {
    for attachment in attachments {
        let path = dir.join(&attachment.name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &attachment.content).await?;
    }
    Ok(())
}

/// Remove the workspace; worktrees are detached from their repository
/// first. Best-effort: failures are logged, not surfaced.
pub async fn cleanup_workspace(dir: &Path, repo: Option<&RepoContext>) {
    if let Some(repo) = repo {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&repo.repo_path)
            .args(["worktree", "remove", "--force"])
            .arg(dir);
        match run_git(cmd, "git worktree remove").await {
            Ok(output) if output.status.success() => return,
            Ok(output) => warn!(
                dir = %dir.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git worktree remove failed, falling back to rm"
            ),
            Err(e) => warn!(dir = %dir.display(), error = %e, "git worktree remove failed, falling back to rm"),
        }
    }

    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "workspace removal failed");
        }
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
