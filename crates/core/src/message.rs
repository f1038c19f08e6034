// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inter-agent messages carried by the message bus.

use crate::agent::AgentId;
use crate::clock::Clock;
use crate::error::SupervisorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Maximum length of a message body in characters.
pub const MAX_CONTENT_LEN: usize = 50_000;

crate::define_id! {
    /// Time-ordered message identifier.
    ///
    /// A fixed-width hex epoch-millisecond prefix followed by a random
    /// suffix, so lexicographic order matches creation order.
    pub struct MessageId;
}

impl MessageId {
    /// Mint a new id from the given clock.
    pub fn generate(clock: &impl Clock) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::new(format!("{:012x}{}", clock.epoch_ms(), &suffix[..10]))
    }
}

/// Category of an inter-agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Task,
    Result,
    Question,
    Info,
    Status,
    Interrupt,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Task => "task",
            MessageKind::Result => "result",
            MessageKind::Question => "question",
            MessageKind::Info => "info",
            MessageKind::Status => "status",
            MessageKind::Interrupt => "interrupt",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SupervisorError> {
        match s {
            "task" => Ok(MessageKind::Task),
            "result" => Ok(MessageKind::Result),
            "question" => Ok(MessageKind::Question),
            "info" => Ok(MessageKind::Info),
            "status" => Ok(MessageKind::Status),
            "interrupt" => Ok(MessageKind::Interrupt),
            other => Err(SupervisorError::Validation(format!(
                "unknown message type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message as stored on the bus. Never mutated after post except for
/// read-tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: MessageId,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    /// None means broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub read_by: BTreeSet<String>,
    /// Roles this message must not be auto-delivered to.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_roles: BTreeSet<String>,
}

impl AgentMessage {
    pub fn is_read_by(&self, agent_id: &str) -> bool {
        self.read_by.contains(agent_id)
    }

    /// True when `role` (if any) is not excluded by this message.
    pub fn allows_role(&self, role: Option<&str>) -> bool {
        match role {
            Some(r) => !self.exclude_roles.contains(r),
            None => true,
        }
    }
}

/// Parameters for posting a message; the bus assigns `id`, `created_at`,
/// and the empty `read_by` set.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub from: String,
    pub from_name: Option<String>,
    pub to: Option<AgentId>,
    pub channel: Option<String>,
    pub kind: Option<MessageKind>,
    pub content: String,
    pub metadata: Option<Value>,
    pub exclude_roles: BTreeSet<String>,
}

impl NewMessage {
    pub fn to_agent(from: impl Into<String>, to: AgentId, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: Some(to),
            kind: Some(kind),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn broadcast(from: impl Into<String>, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            kind: Some(kind),
            content: content.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
