// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor services object.
//!
//! One `Supervisor` per process: constructs and owns the redactor, token
//! service, stores, bus, manager, and kill switch, then runs recovery and
//! starts the background couplers. Tests construct it with the fake child
//! adapter and a throwaway state root.

use crate::auth::{AuthError, TokenService};
use crate::bus::MessageBus;
use crate::delivery::AutoDelivery;
use crate::killswitch::{KillSwitch, KillSwitchFlag};
use crate::manager::{AgentManager, ManagerConfig};
use crate::recovery::{run_recovery, RecoveryReport};
use crate::sanitize::SecretRedactor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use warden_adapters::ChildAdapter;
use warden_core::SupervisorError;
use warden_storage::{EventLogStore, KillSwitchStore, StateStore};

/// Top-level configuration, typically loaded from the environment by the
/// daemon.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Token signing secret; startup fails without it.
    pub signing_secret: Option<String>,
    /// Optional API key accepted for token exchange.
    pub api_key: Option<String>,
    /// Root for state files, event logs, and the kill-switch record.
    pub state_root: PathBuf,
    /// Shared context directory swept at recovery.
    pub context_dir: PathBuf,
    /// Auto-delivery settle delay after an idle transition.
    pub settle_delay: Duration,
    pub manager: ManagerConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let state_root = PathBuf::from("/tmp/warden");
        Self {
            signing_secret: None,
            api_key: None,
            context_dir: state_root.join("context"),
            state_root,
            settle_delay: Duration::from_millis(300),
            manager: ManagerConfig::default(),
        }
    }
}

/// The wired-up engine.
pub struct Supervisor<A: ChildAdapter> {
    config: SupervisorConfig,
    pub redactor: Arc<SecretRedactor>,
    pub tokens: Arc<TokenService>,
    pub state_store: Arc<StateStore>,
    pub event_store: Arc<EventLogStore>,
    pub bus: Arc<MessageBus>,
    pub manager: AgentManager<A>,
    pub kill_switch: KillSwitch<A>,
    kill_flag: Arc<KillSwitchFlag>,
    delivery: parking_lot::Mutex<Option<AutoDelivery>>,
    ttl_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<A: ChildAdapter> Supervisor<A> {
    /// Construct all components. Fails fast on a missing signing secret or
    /// an unusable state root.
    pub fn new(config: SupervisorConfig, adapter: A) -> Result<Self, SupervisorError> {
        let redactor = Arc::new(SecretRedactor::new());
        let tokens = TokenService::new(
            config.signing_secret.as_deref(),
            config.api_key.clone(),
            Arc::clone(&redactor),
        )
        .map_err(|e: AuthError| SupervisorError::Misconfigured(e.to_string()))?;
        let tokens = Arc::new(tokens);

        let state_store = Arc::new(StateStore::open(&config.state_root).map_err(|e| {
            SupervisorError::Misconfigured(format!("cannot open state root: {e}"))
        })?);
        let event_store = Arc::new(EventLogStore::open(&config.state_root).map_err(|e| {
            SupervisorError::Misconfigured(format!("cannot open event log root: {e}"))
        })?);

        let bus = Arc::new(MessageBus::new());
        let kill_flag = Arc::new(KillSwitchFlag::new());
        let manager = AgentManager::new(
            config.manager.clone(),
            adapter,
            Arc::clone(&tokens),
            Arc::clone(&redactor),
            Arc::clone(&state_store),
            Arc::clone(&event_store),
            Arc::clone(&kill_flag),
        );
        let kill_switch = KillSwitch::new(
            Arc::clone(&kill_flag),
            KillSwitchStore::open(&config.state_root),
            Arc::clone(&state_store),
            Arc::clone(&bus),
            manager.clone(),
            Arc::clone(&tokens),
        );

        Ok(Self {
            config,
            redactor,
            tokens,
            state_store,
            event_store,
            bus,
            manager,
            kill_switch,
            kill_flag,
            delivery: parking_lot::Mutex::new(None),
            ttl_task: parking_lot::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Run recovery, then start auto-delivery and the TTL sweep.
    pub async fn start(&self) -> Result<RecoveryReport, SupervisorError> {
        self.kill_switch.load_persisted();

        let report = run_recovery(
            &self.manager,
            &self.state_store,
            &self.event_store,
            &self.config.manager.workspace_root,
            &self.config.context_dir,
            &self.config.manager.cli_bin,
        )
        .await?;

        *self.delivery.lock() = Some(AutoDelivery::start(
            Arc::clone(&self.bus),
            self.manager.clone(),
            Arc::clone(&self.kill_flag),
            self.config.settle_delay,
        ));
        *self.ttl_task.lock() = Some(self.manager.start_ttl_sweep());

        Ok(report)
    }

    /// Destroy every agent, flush persistence, and stop background tasks.
    pub async fn shutdown(&self) {
        if let Some(delivery) = self.delivery.lock().take() {
            delivery.stop();
        }
        if let Some(task) = self.ttl_task.lock().take() {
            task.abort();
        }
        self.manager.dispose().await;
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
