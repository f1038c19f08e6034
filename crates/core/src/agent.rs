// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identifier, status, and durable record types.
//!
//! An agent is one logical conversation owning a child CLI process and a
//! workspace directory. The durable `AgentRecord` is what the state store
//! writes to disk; runtime-only bookkeeping (child handle, line buffer,
//! listeners) lives in the engine.

use crate::error::SupervisorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for an agent instance.
    ///
    /// A UUID string in production. Distinct from the child CLI's own
    /// session id, which the child reports in its first event.
    pub struct AgentId;
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Child spawned, no `system:init` seen yet
    Starting,
    /// Child is actively producing events
    Running,
    /// Last turn finished; agent can accept a new message
    Idle,
    /// Child failed or exited non-zero
    Error,
    /// Rehydrated from disk at startup; no live child yet
    Restored,
    /// Graceful destroy in progress (SIGTERM sent)
    Killing,
    /// Forced destroy in progress (SIGKILL, no grace)
    Destroying,
    /// Child suspended via SIGSTOP
    Paused,
    /// No output for the stall window while running
    Stalled,
    /// Output channel closed without an exit notification
    Disconnected,
}

impl AgentStatus {
    /// Statuses that may receive a new message (and thus a new child).
    pub fn accepts_messages(self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Restored)
    }

    /// Status transitions that must be persisted immediately rather than
    /// coalesced behind the debounce window.
    pub fn persists_immediately(self) -> bool {
        matches!(
            self,
            AgentStatus::Idle
                | AgentStatus::Running
                | AgentStatus::Error
                | AgentStatus::Starting
                | AgentStatus::Killing
                | AgentStatus::Destroying
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Error | AgentStatus::Stalled | AgentStatus::Disconnected
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Starting => "starting",
            AgentStatus::Running => "running",
            AgentStatus::Idle => "idle",
            AgentStatus::Error => "error",
            AgentStatus::Restored => "restored",
            AgentStatus::Killing => "killing",
            AgentStatus::Destroying => "destroying",
            AgentStatus::Paused => "paused",
            AgentStatus::Stalled => "stalled",
            AgentStatus::Disconnected => "disconnected",
        };
        write!(f, "{}", s)
    }
}

/// Model the child CLI is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentModel {
    #[default]
    Sonnet,
    Opus,
    Haiku,
}

impl AgentModel {
    /// Value passed to the child CLI's `--model` flag.
    pub fn cli_name(self) -> &'static str {
        match self {
            AgentModel::Sonnet => "sonnet",
            AgentModel::Opus => "opus",
            AgentModel::Haiku => "haiku",
        }
    }

    /// Parse a caller-supplied model name, rejecting anything outside the
    /// allowed set.
    pub fn parse(s: &str) -> Result<Self, SupervisorError> {
        match s {
            "sonnet" => Ok(AgentModel::Sonnet),
            "opus" => Ok(AgentModel::Opus),
            "haiku" => Ok(AgentModel::Haiku),
            other => Err(SupervisorError::Validation(format!(
                "model not allowed: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AgentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

/// Cumulative token and cost accounting for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUsage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub total_tokens_spent: u64,
    pub estimated_cost: f64,
}

impl AgentUsage {
    /// Fold one turn's result into the running totals.
    pub fn accumulate(&mut self, input_tokens: u64, output_tokens: u64, cost_usd: f64) {
        self.tokens_in += input_tokens;
        self.tokens_out += output_tokens;
        self.total_tokens_spent += input_tokens + output_tokens;
        self.estimated_cost += cost_usd;
    }
}

/// Durable per-agent state, persisted as `<id>.json` in the state directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub workspace_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub model: AgentModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AgentId>,
    /// Position in the spawn tree; root agents have depth 1. Immutable.
    pub depth: u32,
    #[serde(default)]
    pub usage: AgentUsage,
    /// Immutable after create.
    #[serde(default)]
    pub dangerously_skip_permissions: bool,
}

impl AgentRecord {
    pub fn new(id: AgentId, name: String, workspace_dir: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            status: AgentStatus::Starting,
            workspace_dir,
            session_id: None,
            created_at: now,
            last_activity: now,
            model: AgentModel::default(),
            role: None,
            capabilities: BTreeSet::new(),
            current_task: None,
            parent_id: None,
            depth: 1,
            usage: AgentUsage::default(),
            dangerously_skip_permissions: false,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
