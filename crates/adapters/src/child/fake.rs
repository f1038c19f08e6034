// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake child adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ChildAdapter, ChildAdapterError, ChildOutput, ChildSpawnConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use warden_core::AgentId;

/// One step of a scripted child run, played in order on spawn.
#[derive(Debug, Clone)]
pub enum FakeStep {
    /// A stdout line.
    Line(String),
    /// Process exit; always the last step that has any effect.
    Exit(i32),
}

impl FakeStep {
    /// Convenience: a stdout line holding one JSON event.
    pub fn event(value: serde_json::Value) -> Self {
        FakeStep::Line(value.to_string())
    }
}

/// Recorded call to the fake adapter.
#[derive(Debug, Clone)]
pub enum ChildCall {
    Spawn {
        agent_id: AgentId,
        program: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        cwd: PathBuf,
    },
    Kill {
        agent_id: AgentId,
        grace: Option<Duration>,
    },
    Pause {
        agent_id: AgentId,
    },
    Resume {
        agent_id: AgentId,
    },
}

/// Fake child adapter.
///
/// Scripts queued with [`push_script`](Self::push_script) are consumed one
/// per spawn and played asynchronously. Without a script the child stays
/// "running" until driven manually with `emit_line`/`emit_exit` or killed.
#[derive(Clone, Default)]
pub struct FakeChildAdapter {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    children: HashMap<AgentId, FakeChild>,
    scripts: VecDeque<Vec<FakeStep>>,
    calls: Vec<ChildCall>,
    spawn_error: Option<String>,
}

struct FakeChild {
    output_tx: mpsc::Sender<ChildOutput>,
}

impl FakeChildAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next spawn.
    pub fn push_script(&self, steps: Vec<FakeStep>) {
        self.inner.lock().scripts.push_back(steps);
    }

    /// Fail the next spawn with the given message.
    pub fn set_spawn_error(&self, message: impl Into<String>) {
        self.inner.lock().spawn_error = Some(message.into());
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<ChildCall> {
        self.inner.lock().calls.clone()
    }

    /// Arguments of the most recent spawn, if any.
    pub fn last_spawn_args(&self) -> Option<Vec<String>> {
        self.inner.lock().calls.iter().rev().find_map(|c| match c {
            ChildCall::Spawn { args, .. } => Some(args.clone()),
            _ => None,
        })
    }

    /// Environment of the most recent spawn, if any.
    pub fn last_spawn_env(&self) -> Option<BTreeMap<String, String>> {
        self.inner.lock().calls.iter().rev().find_map(|c| match c {
            ChildCall::Spawn { env, .. } => Some(env.clone()),
            _ => None,
        })
    }

    /// Emit a stdout line from a live fake child.
    pub async fn emit_line(&self, agent_id: &AgentId, line: impl Into<String>) {
        let tx = {
            let inner = self.inner.lock();
            inner.children.get(agent_id).map(|c| c.output_tx.clone())
        };
        if let Some(tx) = tx {
            let _ = tx.send(ChildOutput::Stdout(line.into())).await;
        }
    }

    /// Emit a stdout line holding one JSON event.
    pub async fn emit_event(&self, agent_id: &AgentId, value: serde_json::Value) {
        self.emit_line(agent_id, value.to_string()).await;
    }

    /// Terminate a live fake child with the given exit code.
    pub async fn emit_exit(&self, agent_id: &AgentId, code: i32) {
        let tx = {
            let mut inner = self.inner.lock();
            inner.children.remove(agent_id).map(|c| c.output_tx)
        };
        if let Some(tx) = tx {
            let _ = tx.send(ChildOutput::Exited(Some(code))).await;
        }
    }

    pub fn child_count(&self) -> usize {
        self.inner.lock().children.len()
    }
}

#[async_trait]
impl ChildAdapter for FakeChildAdapter {
    async fn spawn(
        &self,
        config: ChildSpawnConfig,
        output_tx: mpsc::Sender<ChildOutput>,
    ) -> Result<(), ChildAdapterError> {
        let script = {
            let mut inner = self.inner.lock();
            inner.calls.push(ChildCall::Spawn {
                agent_id: config.agent_id.clone(),
                program: config.program.clone(),
                args: config.args.clone(),
                env: config.env.clone(),
                cwd: config.cwd.clone(),
            });
            if let Some(message) = inner.spawn_error.take() {
                return Err(ChildAdapterError::SpawnFailed(message));
            }
            inner.children.insert(
                config.agent_id.clone(),
                FakeChild {
                    output_tx: output_tx.clone(),
                },
            );
            inner.scripts.pop_front()
        };

        if let Some(steps) = script {
            let adapter = self.clone();
            let agent_id = config.agent_id;
            tokio::spawn(async move {
                for step in steps {
                    match step {
                        FakeStep::Line(line) => adapter.emit_line(&agent_id, line).await,
                        FakeStep::Exit(code) => {
                            adapter.emit_exit(&agent_id, code).await;
                            return;
                        }
                    }
                }
            });
        }

        Ok(())
    }

    async fn kill(
        &self,
        agent_id: &AgentId,
        grace: Option<Duration>,
    ) -> Result<(), ChildAdapterError> {
        {
            let mut inner = self.inner.lock();
            inner.calls.push(ChildCall::Kill {
                agent_id: agent_id.clone(),
                grace,
            });
            if !inner.children.contains_key(agent_id) {
                return Err(ChildAdapterError::NotFound(agent_id.to_string()));
            }
        }
        // SIGTERM-like exit for graceful, SIGKILL-like for forced
        let code = if grace.is_some() { 143 } else { 137 };
        self.emit_exit(agent_id, code).await;
        Ok(())
    }

    async fn pause(&self, agent_id: &AgentId) -> Result<(), ChildAdapterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ChildCall::Pause {
            agent_id: agent_id.clone(),
        });
        if !inner.children.contains_key(agent_id) {
            return Err(ChildAdapterError::NotFound(agent_id.to_string()));
        }
        Ok(())
    }

    async fn resume(&self, agent_id: &AgentId) -> Result<(), ChildAdapterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ChildCall::Resume {
            agent_id: agent_id.clone(),
        });
        if !inner.children.contains_key(agent_id) {
            return Err(ChildAdapterError::NotFound(agent_id.to_string()));
        }
        Ok(())
    }

    fn has_child(&self, agent_id: &AgentId) -> bool {
        self.inner.lock().children.contains_key(agent_id)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
