// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide emergency halt.
//!
//! Activation is a one-way sweep within its lifecycle: persist the flag,
//! rotate the signing key (invalidating every outstanding token), destroy
//! all agents with no grace, write the tombstone that blocks startup
//! restore, broadcast an interrupt, then clear the bus. While the flag is
//! set, every mutating manager operation and all auto-delivery fail fast.

use crate::auth::TokenService;
use crate::bus::MessageBus;
use crate::manager::AgentManager;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use warden_adapters::ChildAdapter;
use warden_core::{AgentId, MessageKind, NewMessage, SupervisorError};
use warden_storage::{KillSwitchRecord, KillSwitchStore, StateStore};

/// Cheap shared flag consulted on every mutating path.
#[derive(Debug, Default)]
pub struct KillSwitchFlag {
    killed: AtomicBool,
}

impl KillSwitchFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn set(&self, killed: bool) {
        self.killed.store(killed, Ordering::SeqCst);
    }
}

/// Controller executing the activation/deactivation sequences.
pub struct KillSwitch<A: ChildAdapter> {
    flag: Arc<KillSwitchFlag>,
    store: KillSwitchStore,
    state_store: Arc<StateStore>,
    bus: Arc<MessageBus>,
    manager: AgentManager<A>,
    tokens: Arc<TokenService>,
}

impl<A: ChildAdapter> KillSwitch<A> {
    pub fn new(
        flag: Arc<KillSwitchFlag>,
        store: KillSwitchStore,
        state_store: Arc<StateStore>,
        bus: Arc<MessageBus>,
        manager: AgentManager<A>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            flag,
            store,
            state_store,
            bus,
            manager,
            tokens,
        }
    }

    /// Load the persisted record into the in-memory flag at startup.
    pub fn load_persisted(&self) {
        let record = self.store.load();
        if record.killed {
            warn!(reason = ?record.reason, "kill switch was active at startup");
            self.flag.set(true);
        }
    }

    pub fn is_active(&self) -> bool {
        self.flag.is_active()
    }

    pub fn record(&self) -> KillSwitchRecord {
        self.store.load()
    }

    /// Emergency halt.
    pub async fn activate(&self, reason: &str) {
        error!(reason, "kill switch activated");

        // 1. Flag first so no new work can start mid-sweep
        self.flag.set(true);
        let record = KillSwitchRecord {
            killed: true,
            reason: Some(reason.to_string()),
            activated_at: Some(Utc::now()),
        };
        if let Err(e) = self.store.save(&record) {
            error!(error = %e, "failed to persist kill-switch record");
        }

        // 2. Invalidate every outstanding token
        self.tokens.rotate_signing_key();

        // 3. Destroy all agents, forced (SIGKILL, no grace). The public
        // destroy entry points fail fast while the flag is set, so the
        // sweep goes through the unchecked path.
        let ids: Vec<AgentId> = self.manager.list().into_iter().map(|r| r.id).collect();
        for id in ids {
            self.manager.destroy_forced_unchecked(&id).await;
        }

        // 4. Tombstone blocks rehydration until an operator clears it
        if let Err(e) = self.state_store.write_tombstone() {
            error!(error = %e, "failed to write tombstone");
        }

        // 5. Tell anything still listening, then drop the backlog
        if let Err(e) = self.bus.post(NewMessage::broadcast(
            "system",
            MessageKind::Interrupt,
            format!("kill switch activated: {reason}"),
        )) {
            warn!(error = %e, "kill-switch broadcast failed");
        }
        let dropped = self.bus.clear_all();
        info!(dropped, "kill switch sweep complete");
    }

    /// Allow agent creation again. The tombstone is cleared here and only
    /// here.
    pub fn deactivate(&self) -> Result<(), SupervisorError> {
        self.store.save(&KillSwitchRecord::default()).map_err(|e| {
            SupervisorError::Misconfigured(format!("cannot persist kill-switch record: {e}"))
        })?;
        self.state_store
            .clear_tombstone()
            .map_err(|e| SupervisorError::Misconfigured(format!("cannot clear tombstone: {e}")))?;
        self.flag.set(false);
        info!("kill switch deactivated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "killswitch_tests.rs"]
mod tests;
