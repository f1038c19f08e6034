// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write coalescing for state files and event logs.
//!
//! `StateSaver` implements the save policy: meaningful status transitions
//! are written immediately (atomic rename), everything else is coalesced
//! behind a debounce window where the latest payload wins. `EventBatcher`
//! accumulates JSONL lines and appends them in one write per flush timer
//! tick (or earlier when the batch grows past its byte limit).
//!
//! Disk errors are logged and retried on the next flush; they are never
//! fatal to the agent.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use warden_core::{AgentRecord, AgentStatus};
use warden_storage::{EventLogStore, StateStore};

/// Default debounce window for coalesced state writes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default flush timer for the event batch.
pub const DEFAULT_EVENT_FLUSH: Duration = Duration::from_millis(16);

/// Default byte limit forcing an immediate event batch flush.
pub const DEFAULT_EVENT_BATCH_MAX: usize = 256 * 1024;

/// Debounced per-agent state writer.
#[derive(Clone)]
pub struct StateSaver {
    store: Arc<StateStore>,
    state: Arc<Mutex<SaverState>>,
    debounce: Duration,
}

struct SaverState {
    pending: Option<AgentRecord>,
    armed: bool,
    last_written_status: Option<AgentStatus>,
}

impl StateSaver {
    pub fn new(store: Arc<StateStore>, debounce: Duration) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(SaverState {
                pending: None,
                armed: false,
                last_written_status: None,
            })),
            debounce,
        }
    }

    /// Save under the debounce policy.
    ///
    /// A status in the immediate set that differs from the last written
    /// status is persisted synchronously; any other change replaces the
    /// pending payload and is written when the window closes.
    pub fn save(&self, record: AgentRecord) {
        let write_now = {
            let state = self.state.lock();
            record.status.persists_immediately()
                && state.last_written_status != Some(record.status)
        };

        if write_now {
            self.write(&record);
            let mut state = self.state.lock();
            state.pending = None;
            return;
        }

        let arm = {
            let mut state = self.state.lock();
            state.pending = Some(record);
            if state.armed {
                false
            } else {
                state.armed = true;
                true
            }
        };

        if arm {
            let saver = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(saver.debounce).await;
                saver.flush();
            });
        }
    }

    /// Write any pending payload now. Guaranteed to run before `dispose`
    /// returns.
    pub fn flush(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.armed = false;
            state.pending.take()
        };
        if let Some(record) = pending {
            self.write(&record);
        }
    }

    fn write(&self, record: &AgentRecord) {
        match self.store.save(record) {
            Ok(()) => {
                self.state.lock().last_written_status = Some(record.status);
            }
            Err(e) => {
                // Keep the payload; the next save or flush retries
                warn!(agent = %record.id, error = %e, "state write failed, will retry");
                let mut state = self.state.lock();
                if state.pending.is_none() {
                    state.pending = Some(record.clone());
                }
            }
        }
    }
}

/// Batched appender for one agent's event JSONL.
#[derive(Clone)]
pub struct EventBatcher {
    store: Arc<EventLogStore>,
    agent_id: String,
    state: Arc<Mutex<BatchState>>,
    flush_after: Duration,
    max_bytes: usize,
}

struct BatchState {
    buf: String,
    armed: bool,
}

impl EventBatcher {
    pub fn new(
        store: Arc<EventLogStore>,
        agent_id: impl Into<String>,
        flush_after: Duration,
        max_bytes: usize,
    ) -> Self {
        Self {
            store,
            agent_id: agent_id.into(),
            state: Arc::new(Mutex::new(BatchState {
                buf: String::new(),
                armed: false,
            })),
            flush_after,
            max_bytes,
        }
    }

    /// Queue one serialized event line (without trailing newline).
    pub fn append(&self, line: &str) {
        let action = {
            let mut state = self.state.lock();
            state.buf.push_str(line);
            state.buf.push('\n');
            if state.buf.len() >= self.max_bytes {
                Action::FlushNow
            } else if state.armed {
                Action::None
            } else {
                state.armed = true;
                Action::Arm
            }
        };

        match action {
            Action::FlushNow => self.flush(),
            Action::Arm => {
                let batcher = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(batcher.flush_after).await;
                    batcher.flush();
                });
            }
            Action::None => {}
        }
    }

    /// Write the accumulated batch with a single append.
    pub fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            state.armed = false;
            if state.buf.is_empty() {
                return;
            }
            std::mem::take(&mut state.buf)
        };

        if let Err(e) = self.store.append_batch(&self.agent_id, &batch) {
            // Requeue in front so ordering is preserved for the retry
            warn!(agent = %self.agent_id, error = %e, "event batch append failed, requeueing");
            let mut state = self.state.lock();
            let tail = std::mem::take(&mut state.buf);
            state.buf = batch;
            state.buf.push_str(&tail);
        }
    }
}

enum Action {
    FlushNow,
    Arm,
    None,
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
