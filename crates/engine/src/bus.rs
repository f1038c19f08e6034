// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory message bus with read tracking and ordered fan-out.
//!
//! Posts are serialized by a dedicated post lock, so subscribers observe
//! messages strictly in post order even under concurrent posters.
//! Subscriber callbacks run outside the store lock and may query or
//! mark-read, but must not post back into the bus.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use warden_core::{
    AgentId, AgentMessage, Clock, MessageId, MessageKind, NewMessage, SystemClock,
    SupervisorError, MAX_CONTENT_LEN,
};

type BusListener = Arc<dyn Fn(&AgentMessage) + Send + Sync>;

/// Filters for [`MessageBus::query`].
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub to: Option<AgentId>,
    pub from: Option<String>,
    pub channel: Option<String>,
    pub kind: Option<MessageKind>,
    /// Only messages not yet read by this agent.
    pub unread_by: Option<String>,
    /// Only messages created strictly after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    /// Exclude messages whose `exclude_roles` contains this role.
    pub agent_role: Option<String>,
}

/// Handle for removing a bus subscriber; idempotent.
pub struct BusSubscription {
    id: u64,
    subscribers: Arc<Mutex<Vec<(u64, BusListener)>>>,
}

impl BusSubscription {
    pub fn unsubscribe(&self) {
        self.subscribers.lock().retain(|(id, _)| *id != self.id);
    }
}

/// Addressable in-memory message store.
pub struct MessageBus {
    messages: Mutex<Vec<AgentMessage>>,
    subscribers: Arc<Mutex<Vec<(u64, BusListener)>>>,
    next_subscriber: AtomicU64,
    /// Serializes post → notify so fan-out order matches post order.
    post_lock: Mutex<()>,
    clock: SystemClock,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber: AtomicU64::new(1),
            post_lock: Mutex::new(()),
            clock: SystemClock,
        }
    }

    /// Post a message; subscribers are notified synchronously in post
    /// order before this returns.
    pub fn post(&self, new: NewMessage) -> Result<AgentMessage, SupervisorError> {
        let kind = new
            .kind
            .ok_or_else(|| SupervisorError::Validation("message type is required".to_string()))?;
        if new.content.len() > MAX_CONTENT_LEN {
            return Err(SupervisorError::Validation(format!(
                "content exceeds {MAX_CONTENT_LEN} chars"
            )));
        }
        if new.from.is_empty() {
            return Err(SupervisorError::Validation("sender is required".to_string()));
        }

        let _post_guard = self.post_lock.lock();
        let message = AgentMessage {
            id: MessageId::generate(&self.clock),
            from: new.from,
            from_name: new.from_name,
            to: new.to,
            channel: new.channel,
            kind,
            content: new.content,
            metadata: new.metadata,
            created_at: self.clock.now_utc(),
            read_by: Default::default(),
            exclude_roles: new.exclude_roles,
        };
        self.messages.lock().push(message.clone());

        let subscribers: Vec<BusListener> = {
            let guard = self.subscribers.lock();
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for subscriber in subscribers {
            subscriber(&message);
        }
        Ok(message)
    }

    /// Query messages in insertion order.
    pub fn query(&self, query: &MessageQuery) -> Vec<AgentMessage> {
        let messages = self.messages.lock();
        let mut out: Vec<AgentMessage> = messages
            .iter()
            .filter(|m| query.to.as_ref().is_none_or(|to| m.to.as_ref() == Some(to)))
            .filter(|m| query.from.as_ref().is_none_or(|from| &m.from == from))
            .filter(|m| {
                query
                    .channel
                    .as_ref()
                    .is_none_or(|ch| m.channel.as_ref() == Some(ch))
            })
            .filter(|m| query.kind.is_none_or(|kind| m.kind == kind))
            .filter(|m| {
                query
                    .unread_by
                    .as_ref()
                    .is_none_or(|agent| !m.is_read_by(agent))
            })
            .filter(|m| query.since.is_none_or(|since| m.created_at > since))
            .filter(|m| m.allows_role(query.agent_role.as_deref()))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        out
    }

    /// Oldest pending (unread, non-status) message addressed to an agent.
    pub fn next_pending_for(&self, agent: &AgentId, role: Option<&str>) -> Option<AgentMessage> {
        let messages = self.messages.lock();
        messages
            .iter()
            .find(|m| {
                m.to.as_ref() == Some(agent)
                    && m.kind != MessageKind::Status
                    && !m.is_read_by(agent.as_str())
                    && m.allows_role(role)
            })
            .cloned()
    }

    /// Mark one message read by an agent. False when the message is gone.
    pub fn mark_read(&self, message_id: &MessageId, agent_id: &AgentId) -> bool {
        let mut messages = self.messages.lock();
        match messages.iter_mut().find(|m| &m.id == message_id) {
            Some(message) => {
                message.read_by.insert(agent_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Mark all messages addressed to (or broadcast at) an agent as read.
    /// Returns how many were newly marked.
    pub fn mark_all_read(&self, agent_id: &AgentId, role: Option<&str>) -> usize {
        let mut messages = self.messages.lock();
        let mut count = 0;
        for message in messages.iter_mut() {
            let addressed = message.to.is_none() || message.to.as_ref() == Some(agent_id);
            if addressed
                && message.allows_role(role)
                && message.read_by.insert(agent_id.to_string())
            {
                count += 1;
            }
        }
        count
    }

    pub fn unread_count(&self, agent_id: &AgentId, role: Option<&str>) -> usize {
        let messages = self.messages.lock();
        messages
            .iter()
            .filter(|m| m.to.is_none() || m.to.as_ref() == Some(agent_id))
            .filter(|m| m.allows_role(role))
            .filter(|m| !m.is_read_by(agent_id.as_str()))
            .count()
    }

    pub fn subscribe(&self, listener: BusListener) -> BusSubscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().push((id, listener));
        BusSubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    pub fn delete_message(&self, message_id: &MessageId) -> bool {
        let mut messages = self.messages.lock();
        let before = messages.len();
        messages.retain(|m| &m.id != message_id);
        messages.len() != before
    }

    /// Drop every message the agent sent or was addressed.
    pub fn cleanup_for_agent(&self, agent_id: &AgentId) -> usize {
        let mut messages = self.messages.lock();
        let before = messages.len();
        messages.retain(|m| m.from != agent_id.as_str() && m.to.as_ref() != Some(agent_id));
        before - messages.len()
    }

    /// Drop everything. Returns how many messages were removed.
    pub fn clear_all(&self) -> usize {
        let mut messages = self.messages.lock();
        let count = messages.len();
        messages.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
