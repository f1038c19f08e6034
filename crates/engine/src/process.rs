// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One agent's runtime state and its stdout pump.
//!
//! Each live child gets a pump task that owns line parsing and event
//! semantics. The pump is the single writer over the agent's ring buffer,
//! seen-id set, and listener batches; everything else reads snapshots.
//! Listener delivery happens once per pump turn with whatever accumulated,
//! so a slow listener never backpressures the child's stdout.

use crate::batch::{EventBatcher, StateSaver};
use crate::sanitize::SecretRedactor;
use crate::workspace::RepoContext;
use chrono::Utc;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warden_adapters::ChildOutput;
use warden_core::{
    AgentId, AgentRecord, AgentStatus, EventRing, Replay, StreamEvent,
};
use warden_storage::EventLogStore;

/// Per-agent tunables.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub ring_capacity: usize,
    pub ring_bytes: usize,
    pub seen_ids_cap: usize,
    pub stall_tick: Duration,
    pub stall_threshold: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            ring_capacity: warden_core::DEFAULT_RING_CAPACITY,
            ring_bytes: warden_core::DEFAULT_RING_BYTE_BUDGET,
            seen_ids_cap: 4096,
            stall_tick: Duration::from_secs(60),
            stall_threshold: 3,
        }
    }
}

/// Callback receiving event batches.
pub type Listener = Arc<dyn Fn(&[StreamEvent]) + Send + Sync>;

/// Engine hooks invoked by the pump.
#[derive(Clone)]
pub struct ProcessHooks {
    /// Agent transitioned into idle.
    pub on_idle: Arc<dyn Fn(&AgentId) + Send + Sync>,
    /// Child exited; `was_destroy` when a destroy was in progress.
    pub on_exit: Arc<dyn Fn(&AgentId, Option<i32>, bool) + Send + Sync>,
    /// Stall detector escalated; the agent should be reaped.
    pub request_reap: Arc<dyn Fn(&AgentId) + Send + Sync>,
}

impl Default for ProcessHooks {
    fn default() -> Self {
        Self {
            on_idle: Arc::new(|_| {}),
            on_exit: Arc::new(|_, _, _| {}),
            request_reap: Arc::new(|_| {}),
        }
    }
}

/// Handle for removing a listener. Unsubscribing is idempotent; dropping
/// the handle does not unsubscribe.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Vec<(u64, Listener)>>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Runtime state for one agent.
pub struct AgentProcess {
    id: AgentId,
    record: Mutex<AgentRecord>,
    repo: Option<RepoContext>,
    ring: Mutex<EventRing>,
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_listener_id: AtomicU64,
    seen_message_ids: Mutex<IndexSet<String>>,
    delivery_lock: AtomicBool,
    live: AtomicBool,
    /// Set while an interrupt preemption kills the child; the exit is then
    /// treated as end-of-turn instead of a failure.
    interrupt_pending: AtomicBool,
    /// Serializes mutating manager operations on this agent.
    pub(crate) op_lock: tokio::sync::Mutex<()>,
    saver: StateSaver,
    batcher: EventBatcher,
    event_store: Arc<EventLogStore>,
    redactor: Arc<SecretRedactor>,
    hooks: ProcessHooks,
    config: ProcessConfig,
    stall_count: AtomicU32,
    seen_since_tick: AtomicBool,
}

impl AgentProcess {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        record: AgentRecord,
        repo: Option<RepoContext>,
        saver: StateSaver,
        batcher: EventBatcher,
        event_store: Arc<EventLogStore>,
        redactor: Arc<SecretRedactor>,
        hooks: ProcessHooks,
        config: ProcessConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: record.id.clone(),
            record: Mutex::new(record),
            repo,
            ring: Mutex::new(EventRing::new(config.ring_capacity, config.ring_bytes)),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
            seen_message_ids: Mutex::new(IndexSet::new()),
            delivery_lock: AtomicBool::new(false),
            live: AtomicBool::new(false),
            interrupt_pending: AtomicBool::new(false),
            op_lock: tokio::sync::Mutex::new(()),
            saver,
            batcher,
            event_store,
            redactor,
            hooks,
            config,
            stall_count: AtomicU32::new(0),
            seen_since_tick: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn repo(&self) -> Option<&RepoContext> {
        self.repo.as_ref()
    }

    pub fn snapshot(&self) -> AgentRecord {
        self.record.lock().clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.record.lock().status
    }

    /// Mutate the record and hand the new snapshot to the state saver.
    pub fn update_record<F: FnOnce(&mut AgentRecord)>(&self, f: F) -> AgentRecord {
        let snapshot = {
            let mut record = self.record.lock();
            f(&mut record);
            record.clone()
        };
        self.saver.save(snapshot.clone());
        snapshot
    }

    pub fn set_status(&self, status: AgentStatus) -> AgentRecord {
        self.update_record(|record| {
            record.status = status;
            record.last_activity = Utc::now();
        })
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Mark the next child exit as an interrupt preemption.
    pub fn set_interrupt_pending(&self) {
        self.interrupt_pending.store(true, Ordering::SeqCst);
    }

    // ── Delivery lock ───────────────────────────────────────────────────────

    pub fn try_delivery_lock(&self) -> bool {
        self.delivery_lock
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release_delivery_lock(&self) {
        self.delivery_lock.store(false, Ordering::SeqCst);
    }

    pub fn delivery_locked(&self) -> bool {
        self.delivery_lock.load(Ordering::SeqCst)
    }

    // ── Fan-out ─────────────────────────────────────────────────────────────

    /// Register a listener; with `after`, replay history first.
    ///
    /// Replay prefers the in-memory ring. When the requested offset has
    /// been evicted, the pending batch is flushed and the on-disk JSONL is
    /// read from the start instead.
    pub fn subscribe(&self, listener: Listener, after: Option<u64>) -> Subscription {
        if let Some(after) = after {
            let replay = { self.ring.lock().replay(after) };
            match replay {
                Replay::Events(events) => {
                    if !events.is_empty() {
                        listener(&events);
                    }
                }
                Replay::Truncated { earliest } => {
                    tracing::debug!(
                        agent = %self.id,
                        after,
                        earliest,
                        "ring truncated, replaying from event log"
                    );
                    self.batcher.flush();
                    match self.event_store.read_all(self.id.as_str()) {
                        Ok(all) => {
                            let events: Vec<StreamEvent> =
                                all.into_iter().skip(after as usize).collect();
                            if !events.is_empty() {
                                listener(&events);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(agent = %self.id, error = %e, "event log replay failed");
                        }
                    }
                }
            }
        }

        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((id, listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn clear_listeners(&self) {
        self.listeners.lock().clear();
    }

    /// Total events ever emitted by this agent.
    pub fn events_total(&self) -> u64 {
        self.ring.lock().total_appended()
    }

    /// Append events to the ring and persist batch, then deliver the batch
    /// to every listener.
    pub fn dispatch(&self, events: &[StreamEvent]) {
        if events.is_empty() {
            return;
        }
        {
            let mut ring = self.ring.lock();
            for event in events {
                let line = serde_json::to_string(event).unwrap_or_default();
                ring.push(event.clone(), line.len());
                self.batcher.append(&line);
            }
        }

        let listeners: Vec<Listener> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(events);
        }
    }

    /// Flush pending persistence (state + events).
    pub fn flush_persistence(&self) {
        self.batcher.flush();
        self.saver.flush();
    }

    // ── Event semantics ─────────────────────────────────────────────────────

    /// Record a message id; false means duplicate (drop the event).
    fn mark_seen(&self, message_id: &str) -> bool {
        let mut seen = self.seen_message_ids.lock();
        if seen.contains(message_id) {
            return false;
        }
        seen.insert(message_id.to_string());
        while seen.len() > self.config.seen_ids_cap {
            seen.shift_remove_index(0);
        }
        true
    }

    /// Parse, sanitize, and apply one stdout line. Accepted events are
    /// pushed onto `batch`; `went_idle` is set on a running→idle result.
    fn ingest_line(&self, line: &str, batch: &mut Vec<StreamEvent>, went_idle: &mut bool) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(agent = %self.id, error = %e, "dropping unparseable stdout line");
                return;
            }
        };
        let event = match StreamEvent::from_value(value) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(agent = %self.id, error = %e, "dropping malformed event");
                return;
            }
        };
        let event = self.redactor.sanitize_event(&event);

        if let Some(message_id) = event.message_id() {
            if !self.mark_seen(message_id) {
                tracing::debug!(agent = %self.id, message_id, "dropping duplicate event");
                return;
            }
        }
        self.seen_since_tick.store(true, Ordering::SeqCst);

        if event.is_system_init() {
            let session_id = event.session_id().map(String::from);
            self.update_record(|record| {
                record.session_id = session_id;
                record.last_activity = Utc::now();
                if record.status == AgentStatus::Starting {
                    record.status = AgentStatus::Running;
                }
            });
        } else if let Some(usage) = event.result_usage() {
            let mut became_idle = false;
            self.update_record(|record| {
                record
                    .usage
                    .accumulate(usage.input_tokens, usage.output_tokens, usage.total_cost_usd);
                record.last_activity = Utc::now();
                if record.status == AgentStatus::Running {
                    record.status = AgentStatus::Idle;
                    became_idle = true;
                }
            });
            if became_idle {
                *went_idle = true;
            }
        } else {
            self.update_record(|record| {
                record.last_activity = Utc::now();
            });
        }

        batch.push(event);
    }

    fn handle_exit(&self, code: Option<i32>) {
        self.live.store(false, Ordering::SeqCst);
        let status = self.status();
        let was_destroy = matches!(status, AgentStatus::Killing | AgentStatus::Destroying);
        let exit_code = i64::from(code.unwrap_or(-1));

        if was_destroy {
            self.dispatch(&[StreamEvent::done(exit_code)]);
        } else if self.interrupt_pending.swap(false, Ordering::SeqCst) {
            // Preempted for an interrupt: the turn is over, not failed.
            // on_idle is deliberately not fired; the interrupt injection
            // follows immediately.
            self.dispatch(&[StreamEvent::done(exit_code)]);
            self.set_status(AgentStatus::Idle);
        } else {
            let mut events = Vec::new();
            // Non-zero exit after a silent stall window also surfaces as a stall
            if code != Some(0) && self.stall_count.load(Ordering::SeqCst) >= 1 {
                events.push(StreamEvent::stalled());
            }
            events.push(StreamEvent::done(exit_code));
            self.dispatch(&events);

            let new_status = if code == Some(0) {
                AgentStatus::Idle
            } else {
                AgentStatus::Error
            };
            self.set_status(new_status);
            if new_status == AgentStatus::Idle && status != AgentStatus::Idle {
                (self.hooks.on_idle)(&self.id);
            }
        }

        self.stall_count.store(0, Ordering::SeqCst);
        (self.hooks.on_exit)(&self.id, code, was_destroy);
    }

    fn handle_disconnect(&self) {
        self.live.store(false, Ordering::SeqCst);
        let status = self.status();
        let was_destroy = matches!(status, AgentStatus::Killing | AgentStatus::Destroying);
        tracing::warn!(agent = %self.id, "output channel closed without exit notification");
        if !was_destroy {
            self.set_status(AgentStatus::Disconnected);
        }
        (self.hooks.on_exit)(&self.id, None, was_destroy);
    }

    fn stall_tick(&self) {
        let status = self.status();
        if !matches!(status, AgentStatus::Running | AgentStatus::Stalled) {
            self.stall_count.store(0, Ordering::SeqCst);
            self.seen_since_tick.store(false, Ordering::SeqCst);
            return;
        }
        if self.seen_since_tick.swap(false, Ordering::SeqCst) {
            self.stall_count.store(0, Ordering::SeqCst);
            return;
        }

        let ticks = self.stall_count.fetch_add(1, Ordering::SeqCst) + 1;
        if ticks == self.config.stall_threshold && status == AgentStatus::Running {
            tracing::warn!(agent = %self.id, ticks, "agent stalled");
            self.dispatch(&[StreamEvent::stalled()]);
            self.set_status(AgentStatus::Stalled);
        } else if ticks > self.config.stall_threshold {
            tracing::warn!(agent = %self.id, ticks, "stall grace expired, reaping");
            self.set_status(AgentStatus::Error);
            (self.hooks.request_reap)(&self.id);
        }
    }
}

/// Start the pump for a freshly spawned child.
///
/// Lines already queued when the pump wakes are processed together and
/// delivered to listeners as one batch.
pub(crate) fn spawn_pump(
    process: Arc<AgentProcess>,
    mut output_rx: mpsc::Receiver<ChildOutput>,
) -> JoinHandle<()> {
    process.live.store(true, Ordering::SeqCst);
    process.stall_count.store(0, Ordering::SeqCst);
    process.seen_since_tick.store(false, Ordering::SeqCst);

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + process.config.stall_tick;
        let mut ticker = tokio::time::interval_at(start, process.config.stall_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                output = output_rx.recv() => {
                    let mut batch = Vec::new();
                    let mut went_idle = false;
                    let mut exit: Option<Option<i32>> = None;

                    let mut next = output;
                    loop {
                        match next {
                            Some(ChildOutput::Stdout(line)) => {
                                process.ingest_line(&line, &mut batch, &mut went_idle);
                            }
                            Some(ChildOutput::Stderr(line)) => {
                                if !line.trim().is_empty() {
                                    tracing::debug!(agent = %process.id, "child stderr: {line}");
                                }
                            }
                            Some(ChildOutput::Exited(code)) => {
                                exit = Some(code);
                                break;
                            }
                            None => {
                                if !batch.is_empty() {
                                    process.dispatch(&batch);
                                }
                                process.handle_disconnect();
                                return;
                            }
                        }
                        // Keep draining whatever is already queued this turn
                        match output_rx.try_recv() {
                            Ok(item) => next = Some(item),
                            Err(_) => break,
                        }
                    }

                    if !batch.is_empty() {
                        process.dispatch(&batch);
                    }
                    if went_idle {
                        (process.hooks.on_idle)(&process.id);
                    }
                    if let Some(code) = exit {
                        process.handle_exit(code);
                        return;
                    }
                }
                _ = ticker.tick() => {
                    process.stall_tick();
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
