// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real child adapter backed by tokio::process and POSIX signals.
//!
//! Each child runs in its own process group so that signals reach the
//! whole process tree (the CLI forks tool subprocesses). Stdout and stderr
//! are read line-by-line; the exit notification is always the final item
//! on the output channel.

use super::{ChildAdapter, ChildAdapterError, ChildOutput, ChildSpawnConfig};
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use warden_core::AgentId;

/// Adapter spawning real CLI processes.
#[derive(Clone, Default)]
pub struct CliChildAdapter {
    children: Arc<Mutex<HashMap<AgentId, ChildEntry>>>,
}

struct ChildEntry {
    pgid: i32,
}

impl CliChildAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn signal(&self, agent_id: &AgentId, signal: Signal) -> Result<(), ChildAdapterError> {
        let pgid = {
            let children = self.children.lock();
            children
                .get(agent_id)
                .map(|entry| entry.pgid)
                .ok_or_else(|| ChildAdapterError::NotFound(agent_id.to_string()))?
        };
        killpg(Pid::from_raw(pgid), signal)
            .map_err(|e| ChildAdapterError::SignalFailed(format!("{signal:?} to {pgid}: {e}")))
    }
}

#[async_trait]
impl ChildAdapter for CliChildAdapter {
    async fn spawn(
        &self,
        config: ChildSpawnConfig,
        output_tx: mpsc::Sender<ChildOutput>,
    ) -> Result<(), ChildAdapterError> {
        tracing::debug!(
            agent_id = %config.agent_id,
            program = %config.program,
            cwd = %config.cwd.display(),
            "spawning child"
        );

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .env_clear()
            .envs(&config.env)
            .current_dir(&config.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| ChildAdapterError::SpawnFailed(format!("{}: {e}", config.program)))?;

        let pid = child
            .id()
            .ok_or_else(|| ChildAdapterError::SpawnFailed("child exited before start".into()))?
            as i32;

        self.children
            .lock()
            .insert(config.agent_id.clone(), ChildEntry { pgid: pid });

        // Stdout reader
        if let Some(stdout) = child.stdout.take() {
            let tx = output_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(ChildOutput::Stdout(line)).await.is_err() {
                        break;
                    }
                }
            });
        }

        // Stderr reader
        if let Some(stderr) = child.stderr.take() {
            let tx = output_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(ChildOutput::Stderr(line)).await.is_err() {
                        break;
                    }
                }
            });
        }

        // Exit waiter: unregisters the child, then reports the exit code
        let agent_id = config.agent_id.clone();
        let children = Arc::clone(&self.children);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(agent_id = %agent_id, error = %e, "child wait failed");
                    None
                }
            };
            children.lock().remove(&agent_id);
            let _ = output_tx.send(ChildOutput::Exited(code)).await;
        });

        Ok(())
    }

    async fn kill(
        &self,
        agent_id: &AgentId,
        grace: Option<Duration>,
    ) -> Result<(), ChildAdapterError> {
        match grace {
            None => self.signal(agent_id, Signal::SIGKILL),
            Some(grace) => {
                self.signal(agent_id, Signal::SIGTERM)?;
                let adapter = self.clone();
                let agent_id = agent_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if adapter.has_child(&agent_id) {
                        tracing::warn!(agent_id = %agent_id, "grace expired, escalating to SIGKILL");
                        let _ = adapter.signal(&agent_id, Signal::SIGKILL);
                    }
                });
                Ok(())
            }
        }
    }

    async fn pause(&self, agent_id: &AgentId) -> Result<(), ChildAdapterError> {
        self.signal(agent_id, Signal::SIGSTOP)
    }

    async fn resume(&self, agent_id: &AgentId) -> Result<(), ChildAdapterError> {
        self.signal(agent_id, Signal::SIGCONT)
    }

    fn has_child(&self, agent_id: &AgentId) -> bool {
        self.children.lock().contains_key(agent_id)
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
