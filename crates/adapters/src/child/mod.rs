// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child CLI process adapter.
//!
//! One child process per agent turn. The adapter owns spawning, signal
//! delivery, and the raw line stream; interpreting those lines is the
//! engine's job.

pub mod cli;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use warden_core::AgentId;

pub use cli::CliChildAdapter;

/// Raw output from a child process, delivered in stream order.
///
/// `Exited` is always the final item for a given child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildOutput {
    Stdout(String),
    Stderr(String),
    Exited(Option<i32>),
}

/// Everything needed to start one child process.
#[derive(Debug, Clone)]
pub struct ChildSpawnConfig {
    pub agent_id: AgentId,
    /// CLI binary (name or path).
    pub program: String,
    pub args: Vec<String>,
    /// Complete child environment; the parent env is not inherited.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

/// Errors from child process operations.
#[derive(Debug, Error)]
pub enum ChildAdapterError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("no live child for agent: {0}")]
    NotFound(String),
    #[error("signal failed: {0}")]
    SignalFailed(String),
}

/// Seam between the engine and the operating system.
///
/// Implementations hold a registry keyed by agent id; an agent owns at most
/// one live child at a time.
#[async_trait]
pub trait ChildAdapter: Clone + Send + Sync + 'static {
    /// Spawn a child. Output (stdout, stderr, exit) flows into `output_tx`;
    /// the adapter guarantees `Exited` is the last item sent.
    async fn spawn(
        &self,
        config: ChildSpawnConfig,
        output_tx: mpsc::Sender<ChildOutput>,
    ) -> Result<(), ChildAdapterError>;

    /// Terminate the child's process tree.
    ///
    /// With `grace`, SIGTERM first and SIGKILL after the grace period if
    /// still alive. With `None`, SIGKILL immediately.
    async fn kill(
        &self,
        agent_id: &AgentId,
        grace: Option<Duration>,
    ) -> Result<(), ChildAdapterError>;

    /// SIGSTOP the child.
    async fn pause(&self, agent_id: &AgentId) -> Result<(), ChildAdapterError>;

    /// SIGCONT the child.
    async fn resume(&self, agent_id: &AgentId) -> Result<(), ChildAdapterError>;

    /// Whether a live child is registered for this agent.
    fn has_child(&self, agent_id: &AgentId) -> bool;
}

/// Builder for the child CLI argument vector.
///
/// The flag order is part of the contract with the CLI:
/// `[--dangerously-skip-permissions] [--resume <sessionId>]
/// --input-format stream-json --output-format stream-json
/// [--max-turns N] [--model M] <prompt>`
#[derive(Debug, Clone, Default)]
pub struct CliInvocation {
    pub skip_permissions: bool,
    pub resume: Option<String>,
    pub max_turns: Option<u32>,
    pub model: Option<String>,
    pub prompt: String,
}

impl CliInvocation {
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        if let Some(session_id) = &self.resume {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        args.push("--input-format".to_string());
        args.push("stream-json".to_string());
        args.push("--output-format".to_string());
        args.push("stream-json".to_string());
        if let Some(max_turns) = self.max_turns {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push(self.prompt.clone());
        args
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
