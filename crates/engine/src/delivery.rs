// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-delivery: routes bus messages into agents.
//!
//! Interrupts preempt a running agent immediately and bypass the delivery
//! lock. Everything else waits until the target can accept a message; the
//! idle drain picks up queued messages after a short settle delay so it
//! never races the child's own final event flush. The per-agent delivery
//! lock guarantees at most one auto-delivery in flight.

use crate::bus::{BusSubscription, MessageBus};
use crate::killswitch::KillSwitchFlag;
use crate::manager::AgentManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use warden_adapters::ChildAdapter;
use warden_core::{AgentId, AgentMessage, MessageKind};

/// Format the prompt for a normal queued delivery.
pub fn format_delivery_prompt(message: &AgentMessage) -> String {
    let sender = message.from_name.as_deref().unwrap_or(&message.from);
    format!(
        "[Message from {sender} - type: {kind}]\n<message-content>\n{content}\n</message-content>\n\n(Reply by sending a message back to agent ID: {from})",
        kind = message.kind,
        content = message.content,
        from = message.from,
    )
}

/// Format the prompt for an interrupt delivery.
pub fn format_interrupt_prompt(message: &AgentMessage) -> String {
    let sender = message.from_name.as_deref().unwrap_or(&message.from);
    format!(
        "[INTERRUPT from {sender}] \u{26a0}\u{fe0f} Your current task has been interrupted. Read and act on this message immediately:\n<message-content>\n{content}\n</message-content>\n\n(Reply by sending a message back to agent ID: {from})",
        content = message.content,
        from = message.from,
    )
}

enum Work {
    Incoming(Box<AgentMessage>),
    Idle(AgentId),
}

/// Running auto-delivery coupler.
pub struct AutoDelivery {
    task: JoinHandle<()>,
    _bus_subscription: BusSubscription,
}

impl AutoDelivery {
    /// Wire the coupler to the bus and the manager's idle notifications.
    pub fn start<A: ChildAdapter>(
        bus: Arc<MessageBus>,
        manager: AgentManager<A>,
        kill_flag: Arc<KillSwitchFlag>,
        settle_delay: Duration,
    ) -> Self {
        let (work_tx, work_rx) = mpsc::unbounded_channel();

        let bus_subscription = bus.subscribe({
            let work_tx = work_tx.clone();
            Arc::new(move |message: &AgentMessage| {
                let _ = work_tx.send(Work::Incoming(Box::new(message.clone())));
            })
        });

        manager.on_idle({
            let work_tx = work_tx.clone();
            Arc::new(move |id: &AgentId| {
                let _ = work_tx.send(Work::Idle(id.clone()));
            })
        });

        let task = tokio::spawn(run(bus, manager, kill_flag, settle_delay, work_rx));
        Self {
            task,
            _bus_subscription: bus_subscription,
        }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

async fn run<A: ChildAdapter>(
    bus: Arc<MessageBus>,
    manager: AgentManager<A>,
    kill_flag: Arc<KillSwitchFlag>,
    settle_delay: Duration,
    mut work_rx: mpsc::UnboundedReceiver<Work>,
) {
    while let Some(work) = work_rx.recv().await {
        if kill_flag.is_active() {
            continue;
        }
        match work {
            Work::Incoming(message) => handle_incoming(&bus, &manager, &message).await,
            Work::Idle(id) => handle_idle(&bus, &manager, &kill_flag, settle_delay, &id).await,
        }
    }
}

async fn handle_incoming<A: ChildAdapter>(
    bus: &Arc<MessageBus>,
    manager: &AgentManager<A>,
    message: &AgentMessage,
) {
    let Some(to) = message.to.clone() else {
        return;
    };
    if message.kind == MessageKind::Status {
        return;
    }
    // Respect the role filter on the direct path too, not just the drain
    let role = manager.get(&to).and_then(|record| record.role);
    if !message.allows_role(role.as_deref()) {
        return;
    }

    if message.kind == MessageKind::Interrupt && manager.can_interrupt(&to) {
        // Interrupts take precedence: no delivery lock, no deliveryDone.
        // The running child is preempted, then the prompt goes in.
        if let Err(e) = manager.preempt(&to).await {
            warn!(agent = %to, error = %e, "interrupt preemption failed, message stays queued");
            return;
        }
        let prompt = format_interrupt_prompt(message);
        bus.mark_read(&message.id, &to);
        if let Err(e) = manager.message(&to, &prompt, None, None).await {
            warn!(agent = %to, error = %e, "interrupt delivery failed");
        }
        return;
    }

    if manager.can_deliver(&to) {
        deliver(bus, manager, &to, message).await;
    }
    // Otherwise the message stays queued for the idle drain
}

async fn handle_idle<A: ChildAdapter>(
    bus: &Arc<MessageBus>,
    manager: &AgentManager<A>,
    kill_flag: &Arc<KillSwitchFlag>,
    settle_delay: Duration,
    id: &AgentId,
) {
    // Let the child's final events land before injecting the next message
    if !settle_delay.is_zero() {
        tokio::time::sleep(settle_delay).await;
    }
    if kill_flag.is_active() {
        return;
    }

    let role = manager.get(id).and_then(|record| record.role);
    match bus.next_pending_for(id, role.as_deref()) {
        Some(message) => deliver(bus, manager, id, &message).await,
        None => manager.delivery_done(id),
    }
}

async fn deliver<A: ChildAdapter>(
    bus: &Arc<MessageBus>,
    manager: &AgentManager<A>,
    to: &AgentId,
    message: &AgentMessage,
) {
    if !manager.try_delivery_lock(to) {
        debug!(agent = %to, "delivery already in flight, leaving message queued");
        return;
    }

    let prompt = if message.kind == MessageKind::Interrupt {
        format_interrupt_prompt(message)
    } else {
        format_delivery_prompt(message)
    };
    bus.mark_read(&message.id, to);
    let result = manager.message(to, &prompt, None, None).await;
    manager.delivery_done(to);

    if let Err(e) = result {
        warn!(agent = %to, error = %e, "auto-delivery failed");
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
