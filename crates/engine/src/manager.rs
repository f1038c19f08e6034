// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry and lifecycle operations.
//!
//! The manager exclusively owns the process table. Mutating operations on
//! one agent serialize on that agent's op lock; listing works on a
//! snapshot of the registry map. Destroying a parent cascades to its
//! children, deepest first.

use crate::auth::TokenService;
use crate::batch::{EventBatcher, StateSaver};
use crate::killswitch::KillSwitchFlag;
use crate::process::{spawn_pump, AgentProcess, Listener, ProcessConfig, ProcessHooks, Subscription};
use crate::sanitize::SecretRedactor;
use crate::workspace;
pub use crate::workspace::{Attachment, RepoContext};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use warden_adapters::{ChildAdapter, ChildAdapterError, ChildSpawnConfig, CliInvocation};
use warden_core::{
    sanitize_agent_name, AgentId, AgentModel, AgentRecord, AgentStatus, StreamEvent,
    SupervisorError,
};
use warden_storage::{EventLogStore, StateStore};

/// Manager-level tunables and caps.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Child CLI binary.
    pub cli_bin: String,
    /// Parent directory for per-agent workspaces.
    pub workspace_root: PathBuf,
    pub max_agents: usize,
    pub max_children_per_agent: usize,
    pub max_depth: u32,
    pub max_prompt_len: usize,
    /// Idle/restored agents older than this are destroyed by the sweep.
    pub session_ttl: Duration,
    pub ttl_sweep_interval: Duration,
    /// SIGTERM-to-SIGKILL window on graceful destroy.
    pub destroy_grace: Duration,
    /// Debounce window for coalesced state writes.
    pub debounce: Duration,
    /// Event JSONL flush timer.
    pub event_flush: Duration,
    /// Byte limit forcing an immediate event batch flush.
    pub event_batch_max: usize,
    pub process: ProcessConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cli_bin: "claude".to_string(),
            workspace_root: PathBuf::from("/tmp/warden-workspaces"),
            max_agents: 50,
            max_children_per_agent: 8,
            max_depth: 3,
            max_prompt_len: 100_000,
            session_ttl: Duration::from_secs(4 * 60 * 60),
            ttl_sweep_interval: Duration::from_secs(60),
            destroy_grace: Duration::from_secs(5),
            debounce: crate::batch::DEFAULT_DEBOUNCE,
            event_flush: crate::batch::DEFAULT_EVENT_FLUSH,
            event_batch_max: crate::batch::DEFAULT_EVENT_BATCH_MAX,
            process: ProcessConfig::default(),
        }
    }
}

/// Parameters for creating an agent.
#[derive(Debug, Clone, Default)]
pub struct CreateAgentSpec {
    pub name: String,
    pub prompt: String,
    pub model: Option<String>,
    pub role: Option<String>,
    pub capabilities: BTreeSet<String>,
    pub current_task: Option<String>,
    pub parent_id: Option<AgentId>,
    pub max_turns: Option<u32>,
    pub dangerously_skip_permissions: bool,
    pub repo: Option<RepoContext>,
    pub attachments: Vec<Attachment>,
}

type IdGenFn = Arc<dyn Fn() -> String + Send + Sync>;
type PressureFn = Arc<dyn Fn() -> bool + Send + Sync>;
type IdleCallback = Arc<dyn Fn(&AgentId) + Send + Sync>;

/// Registry of agents plus their lifecycle operations.
pub struct AgentManager<A: ChildAdapter> {
    inner: Arc<ManagerInner<A>>,
}

impl<A: ChildAdapter> Clone for AgentManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ManagerInner<A: ChildAdapter> {
    config: ManagerConfig,
    adapter: A,
    tokens: Arc<TokenService>,
    redactor: Arc<SecretRedactor>,
    state_store: Arc<StateStore>,
    event_store: Arc<EventLogStore>,
    registry: Mutex<HashMap<AgentId, Arc<AgentProcess>>>,
    idle_callbacks: Mutex<Vec<IdleCallback>>,
    kill_flag: Arc<KillSwitchFlag>,
    memory_pressure: Mutex<Option<PressureFn>>,
    id_gen: IdGenFn,
}

fn adapter_err(err: ChildAdapterError) -> SupervisorError {
    match err {
        ChildAdapterError::SpawnFailed(msg) => SupervisorError::Spawn(msg),
        ChildAdapterError::NotFound(id) => SupervisorError::NotFound(id),
        ChildAdapterError::SignalFailed(msg) => SupervisorError::Conflict(msg),
    }
}

impl<A: ChildAdapter> AgentManager<A> {
    pub fn new(
        config: ManagerConfig,
        adapter: A,
        tokens: Arc<TokenService>,
        redactor: Arc<SecretRedactor>,
        state_store: Arc<StateStore>,
        event_store: Arc<EventLogStore>,
        kill_flag: Arc<KillSwitchFlag>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                adapter,
                tokens,
                redactor,
                state_store,
                event_store,
                registry: Mutex::new(HashMap::new()),
                idle_callbacks: Mutex::new(Vec::new()),
                kill_flag,
                memory_pressure: Mutex::new(None),
                id_gen: Arc::new(|| uuid::Uuid::new_v4().to_string()),
            }),
        }
    }

    /// Replace the id generator (deterministic ids in tests).
    pub fn with_id_gen(self, id_gen: IdGenFn) -> Self {
        // Only safe before any agent exists; used by test setup
        let inner = Arc::try_unwrap(self.inner);
        match inner {
            Ok(mut inner) => {
                inner.id_gen = id_gen;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("with_id_gen called on a shared manager, ignoring");
                Self { inner }
            }
        }
    }

    /// Install the memory-pressure predicate consulted before spawns.
    pub fn set_memory_pressure(&self, predicate: PressureFn) {
        *self.inner.memory_pressure.lock() = Some(predicate);
    }

    fn ensure_not_killed(&self) -> Result<(), SupervisorError> {
        if self.inner.kill_flag.is_active() {
            return Err(SupervisorError::KillSwitchActive);
        }
        Ok(())
    }

    fn get_process(&self, id: &AgentId) -> Result<Arc<AgentProcess>, SupervisorError> {
        self.inner
            .registry
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    fn validate_prompt(&self, prompt: &str) -> Result<(), SupervisorError> {
        if prompt.trim().is_empty() {
            return Err(SupervisorError::Validation("prompt is empty".to_string()));
        }
        if prompt.len() > self.inner.config.max_prompt_len {
            return Err(SupervisorError::Validation(format!(
                "prompt exceeds {} chars",
                self.inner.config.max_prompt_len
            )));
        }
        Ok(())
    }

    fn hooks(&self) -> ProcessHooks {
        let weak = Arc::downgrade(&self.inner);
        ProcessHooks {
            on_idle: {
                let weak = weak.clone();
                Arc::new(move |id: &AgentId| {
                    if let Some(inner) = weak.upgrade() {
                        let callbacks = inner.idle_callbacks.lock().clone();
                        for callback in callbacks {
                            callback(id);
                        }
                    }
                })
            },
            on_exit: {
                let weak = weak.clone();
                Arc::new(move |id: &AgentId, _code: Option<i32>, was_destroy: bool| {
                    if was_destroy {
                        if let Some(inner) = weak.upgrade() {
                            let id = id.clone();
                            tokio::spawn(async move {
                                finalize_destroy(inner, id).await;
                            });
                        }
                    }
                })
            },
            request_reap: {
                let weak = weak.clone();
                Arc::new(move |id: &AgentId| {
                    if let Some(inner) = weak.upgrade() {
                        let adapter = inner.adapter.clone();
                        let id = id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = adapter.kill(&id, None).await {
                                warn!(agent = %id, error = %e, "stall reap failed");
                            }
                        });
                    }
                })
            },
        }
    }

    fn make_process(&self, record: AgentRecord, repo: Option<RepoContext>) -> Arc<AgentProcess> {
        let inner = &self.inner;
        let saver = StateSaver::new(Arc::clone(&inner.state_store), inner.config.debounce);
        let batcher = EventBatcher::new(
            Arc::clone(&inner.event_store),
            record.id.as_str(),
            inner.config.event_flush,
            inner.config.event_batch_max,
        );
        AgentProcess::new(
            record,
            repo,
            saver,
            batcher,
            Arc::clone(&inner.event_store),
            Arc::clone(&inner.redactor),
            self.hooks(),
            inner.config.process.clone(),
        )
    }

    async fn spawn_child(
        &self,
        process: &Arc<AgentProcess>,
        prompt: &str,
        max_turns: Option<u32>,
    ) -> Result<(), SupervisorError> {
        let record = process.snapshot();
        let invocation = CliInvocation {
            skip_permissions: record.dangerously_skip_permissions,
            resume: record.session_id.clone(),
            max_turns,
            model: Some(record.model.cli_name().to_string()),
            prompt: prompt.to_string(),
        };
        let spawn_config = ChildSpawnConfig {
            agent_id: record.id.clone(),
            program: self.inner.config.cli_bin.clone(),
            args: invocation.build_args(),
            env: self.inner.tokens.build_child_env(&record.id),
            cwd: record.workspace_dir.clone(),
        };

        let (output_tx, output_rx) = mpsc::channel(256);
        self.inner.adapter.spawn(spawn_config, output_tx).await.map_err(adapter_err)?;
        spawn_pump(Arc::clone(process), output_rx);
        Ok(())
    }

    fn fail_spawn(&self, process: &Arc<AgentProcess>, err: SupervisorError) -> SupervisorError {
        warn!(agent = %process.id(), error = %err, "child spawn failed");
        process.dispatch(&[StreamEvent::done(-1)]);
        process.set_status(AgentStatus::Error);
        err
    }

    /// Create an agent and spawn its first child.
    pub async fn create(&self, spec: CreateAgentSpec) -> Result<AgentRecord, SupervisorError> {
        self.ensure_not_killed()?;
        if let Some(pressure) = self.inner.memory_pressure.lock().clone() {
            if pressure() {
                return Err(SupervisorError::Overloaded(
                    "memory pressure too high to spawn".to_string(),
                ));
            }
        }
        self.validate_prompt(&spec.prompt)?;
        let model = match spec.model.as_deref() {
            Some(m) => AgentModel::parse(m)?,
            None => AgentModel::default(),
        };
        let name = sanitize_agent_name(&spec.name);
        let config = &self.inner.config;

        let (id, depth) = {
            let registry = self.inner.registry.lock();
            if registry.len() >= config.max_agents {
                return Err(SupervisorError::Capacity(format!(
                    "max agents reached ({})",
                    config.max_agents
                )));
            }
            let depth = match &spec.parent_id {
                Some(parent_id) => {
                    let parent = registry
                        .get(parent_id)
                        .ok_or_else(|| SupervisorError::NotFound(parent_id.to_string()))?;
                    let parent_depth = parent.snapshot().depth;
                    if parent_depth + 1 > config.max_depth {
                        return Err(SupervisorError::Capacity(format!(
                            "max agent depth reached ({})",
                            config.max_depth
                        )));
                    }
                    let children = registry
                        .values()
                        .filter(|p| p.snapshot().parent_id.as_ref() == Some(parent_id))
                        .count();
                    if children >= config.max_children_per_agent {
                        return Err(SupervisorError::Capacity(format!(
                            "max children reached ({})",
                            config.max_children_per_agent
                        )));
                    }
                    parent_depth + 1
                }
                None => 1,
            };
            (AgentId::new((self.inner.id_gen)()), depth)
        };

        let workspace_dir =
            workspace::prepare_workspace(&config.workspace_root, id.as_str(), spec.repo.as_ref())
                .await?;
        workspace::write_attachments(&workspace_dir, &spec.attachments).await?;

        let mut record = AgentRecord::new(id.clone(), name, workspace_dir, Utc::now());
        record.model = model;
        record.role = spec.role.clone();
        record.capabilities = spec.capabilities.clone();
        record.current_task = spec.current_task.clone();
        record.parent_id = spec.parent_id.clone();
        record.depth = depth;
        record.dangerously_skip_permissions = spec.dangerously_skip_permissions;

        let process = self.make_process(record, spec.repo.clone());
        // Persist the starting state before the child exists
        process.update_record(|_| {});
        self.inner
            .registry
            .lock()
            .insert(id.clone(), Arc::clone(&process));
        info!(agent = %id, depth, "agent created");

        match self.spawn_child(&process, &spec.prompt, spec.max_turns).await {
            Ok(()) => Ok(process.snapshot()),
            Err(e) => Err(self.fail_spawn(&process, e)),
        }
    }

    /// Send a new message to an idle or restored agent.
    ///
    /// Spawns a fresh child, resuming the recorded session when one exists.
    /// `session_id` overrides the recorded session for this and subsequent
    /// turns.
    pub async fn message(
        &self,
        id: &AgentId,
        prompt: &str,
        max_turns: Option<u32>,
        session_id: Option<String>,
    ) -> Result<AgentRecord, SupervisorError> {
        self.ensure_not_killed()?;
        self.validate_prompt(prompt)?;
        let process = self.get_process(id)?;
        let _guard = process.op_lock.lock().await;

        let status = process.status();
        if !status.accepts_messages() {
            return Err(SupervisorError::Conflict(format!(
                "agent is {status}, must be idle or restored"
            )));
        }

        process.update_record(|record| {
            record.status = AgentStatus::Running;
            record.last_activity = Utc::now();
            if let Some(session_id) = session_id {
                record.session_id = Some(session_id);
            }
        });
        match self.spawn_child(&process, prompt, max_turns).await {
            Ok(()) => Ok(process.snapshot()),
            Err(e) => Err(self.fail_spawn(&process, e)),
        }
    }

    /// Register a listener; with `after`, replay history first.
    pub fn subscribe(
        &self,
        id: &AgentId,
        listener: Listener,
        after: Option<u64>,
    ) -> Result<Subscription, SupervisorError> {
        let process = self.get_process(id)?;
        Ok(process.subscribe(listener, after))
    }

    /// Graceful destroy. Returns true if the agent existed.
    pub async fn destroy(&self, id: &AgentId) -> Result<bool, SupervisorError> {
        self.ensure_not_killed()?;
        Ok(self.destroy_with(id, false).await)
    }

    /// Forced destroy: SIGKILL immediately, no grace.
    pub async fn destroy_forced(&self, id: &AgentId) -> Result<bool, SupervisorError> {
        self.ensure_not_killed()?;
        Ok(self.destroy_with(id, true).await)
    }

    /// Forced destroy that skips the kill-switch gate. Only the kill
    /// switch itself uses this, while sweeping agents after the flag is
    /// already set.
    pub(crate) async fn destroy_forced_unchecked(&self, id: &AgentId) -> bool {
        self.destroy_with(id, true).await
    }

    /// Subtree of `id` (excluding `id`), deepest first.
    fn subtree(&self, id: &AgentId) -> Vec<AgentId> {
        let registry = self.inner.registry.lock();
        let mut ordered = Vec::new();
        let mut frontier = vec![id.clone()];
        while let Some(current) = frontier.pop() {
            for (child_id, process) in registry.iter() {
                if process.snapshot().parent_id.as_ref() == Some(&current) {
                    ordered.push(child_id.clone());
                    frontier.push(child_id.clone());
                }
            }
        }
        ordered.reverse();
        ordered
    }

    async fn destroy_with(&self, id: &AgentId, forced: bool) -> bool {
        // Children go first so a parent never outlives its subtree
        for child in self.subtree(id) {
            self.destroy_one(&child, forced).await;
        }
        self.destroy_one(id, forced).await
    }

    async fn destroy_one(&self, id: &AgentId, forced: bool) -> bool {
        let Some(process) = self.inner.registry.lock().get(id).cloned() else {
            return false;
        };
        let _guard = process.op_lock.lock().await;

        let status = if forced {
            AgentStatus::Destroying
        } else {
            AgentStatus::Killing
        };
        process.set_status(status);

        if process.is_live() {
            let grace = if forced {
                None
            } else {
                Some(self.inner.config.destroy_grace)
            };
            match self.inner.adapter.kill(id, grace).await {
                // The pump observes the exit and triggers finalization
                Ok(()) => {}
                Err(e) => {
                    warn!(agent = %id, error = %e, "kill failed, finalizing directly");
                    finalize_destroy(Arc::clone(&self.inner), id.clone()).await;
                }
            }
        } else {
            finalize_destroy(Arc::clone(&self.inner), id.clone()).await;
        }
        true
    }

    /// Preempt a running agent for an interrupt: kill its child with no
    /// grace and wait for the stream to wind down, leaving the agent idle
    /// so the interrupt prompt can be injected immediately.
    pub async fn preempt(&self, id: &AgentId) -> Result<(), SupervisorError> {
        self.ensure_not_killed()?;
        let process = self.get_process(id)?;
        let _guard = process.op_lock.lock().await;
        if process.status() != AgentStatus::Running || !process.is_live() {
            return Err(SupervisorError::Conflict(format!(
                "agent is {}, cannot be preempted",
                process.status()
            )));
        }

        process.set_interrupt_pending();
        self.inner.adapter.kill(id, None).await.map_err(adapter_err)?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while process.is_live() {
            if tokio::time::Instant::now() >= deadline {
                return Err(SupervisorError::Conflict(
                    "child did not exit for interrupt".to_string(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    /// SIGSTOP a running agent.
    pub async fn pause(&self, id: &AgentId) -> Result<(), SupervisorError> {
        self.ensure_not_killed()?;
        let process = self.get_process(id)?;
        let _guard = process.op_lock.lock().await;
        if process.status() != AgentStatus::Running {
            return Err(SupervisorError::Conflict(format!(
                "agent is {}, must be running to pause",
                process.status()
            )));
        }
        self.inner.adapter.pause(id).await.map_err(adapter_err)?;
        process.set_status(AgentStatus::Paused);
        Ok(())
    }

    /// SIGCONT a paused agent.
    pub async fn resume(&self, id: &AgentId) -> Result<(), SupervisorError> {
        self.ensure_not_killed()?;
        let process = self.get_process(id)?;
        let _guard = process.op_lock.lock().await;
        if process.status() != AgentStatus::Paused {
            return Err(SupervisorError::Conflict(format!(
                "agent is {}, must be paused to resume",
                process.status()
            )));
        }
        self.inner.adapter.resume(id).await.map_err(adapter_err)?;
        process.set_status(AgentStatus::Running);
        Ok(())
    }

    /// Drop the recorded session while keeping cumulative usage; the next
    /// message starts a fresh conversation.
    pub async fn clear_context(&self, id: &AgentId) -> Result<(), SupervisorError> {
        self.ensure_not_killed()?;
        let process = self.get_process(id)?;
        let _guard = process.op_lock.lock().await;
        if process.status() != AgentStatus::Idle {
            return Err(SupervisorError::Conflict(format!(
                "agent is {}, must be idle to clear context",
                process.status()
            )));
        }
        process.update_record(|record| {
            record.session_id = None;
            record.last_activity = Utc::now();
        });
        process.flush_persistence();
        Ok(())
    }

    /// Update `last_activity` without a status change (debounced persist).
    pub fn touch(&self, id: &AgentId) -> Result<(), SupervisorError> {
        let process = self.get_process(id)?;
        process.update_record(|record| {
            record.last_activity = Utc::now();
        });
        Ok(())
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        let processes: Vec<Arc<AgentProcess>> =
            self.inner.registry.lock().values().cloned().collect();
        processes.iter().map(|p| p.snapshot()).collect()
    }

    pub fn get(&self, id: &AgentId) -> Option<AgentRecord> {
        self.inner.registry.lock().get(id).map(|p| p.snapshot())
    }

    pub fn agent_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    pub fn get_active_workspace_dirs(&self) -> Vec<PathBuf> {
        self.list().into_iter().map(|r| r.workspace_dir).collect()
    }

    // ── Capability predicates (used by auto-delivery) ───────────────────────

    /// Agent exists, is idle/restored, and is not mid-delivery.
    pub fn can_deliver(&self, id: &AgentId) -> bool {
        match self.inner.registry.lock().get(id) {
            Some(process) => process.status().accepts_messages() && !process.delivery_locked(),
            None => false,
        }
    }

    /// Agent exists, is running, and has a live child.
    pub fn can_interrupt(&self, id: &AgentId) -> bool {
        match self.inner.registry.lock().get(id) {
            Some(process) => process.status() == AgentStatus::Running && process.is_live(),
            None => false,
        }
    }

    /// Acquire the per-agent delivery lock.
    pub fn try_delivery_lock(&self, id: &AgentId) -> bool {
        match self.inner.registry.lock().get(id) {
            Some(process) => process.try_delivery_lock(),
            None => false,
        }
    }

    /// Clear the per-agent delivery lock.
    pub fn delivery_done(&self, id: &AgentId) {
        if let Some(process) = self.inner.registry.lock().get(id) {
            process.release_delivery_lock();
        }
    }

    /// Invoke `callback` whenever an agent transitions into idle.
    pub fn on_idle(&self, callback: IdleCallback) {
        self.inner.idle_callbacks.lock().push(callback);
    }

    /// Register a rehydrated agent without spawning a child.
    pub fn register_restored(&self, mut record: AgentRecord) -> Arc<AgentProcess> {
        record.status = AgentStatus::Restored;
        let process = self.make_process(record, None);
        process.update_record(|_| {});
        process.flush_persistence();
        self.inner
            .registry
            .lock()
            .insert(process.id().clone(), Arc::clone(&process));
        process
    }

    /// Destroy idle/restored agents whose last activity predates the TTL.
    pub async fn sweep_expired(&self) {
        let Ok(ttl) = chrono::Duration::from_std(self.inner.config.session_ttl) else {
            return;
        };
        let cutoff = Utc::now() - ttl;
        let expired: Vec<AgentId> = {
            let registry = self.inner.registry.lock();
            registry
                .values()
                .filter_map(|process| {
                    let record = process.snapshot();
                    let idle = matches!(
                        record.status,
                        AgentStatus::Idle | AgentStatus::Restored
                    );
                    (idle && record.last_activity < cutoff).then_some(record.id)
                })
                .collect()
        };
        for id in expired {
            info!(agent = %id, "session TTL expired, destroying");
            self.destroy_with(&id, false).await;
        }
    }

    /// Periodic TTL sweep task.
    pub fn start_ttl_sweep(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.inner.config.ttl_sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // immediate first tick
            loop {
                interval.tick().await;
                manager.sweep_expired().await;
            }
        })
    }

    /// Destroy every agent and flush all pending persistence.
    pub async fn dispose(&self) {
        let ids: Vec<AgentId> = self.inner.registry.lock().keys().cloned().collect();
        for id in ids {
            self.destroy_with(&id, false).await;
        }

        // Live children finalize from their pump; wait for the table to drain
        let deadline =
            tokio::time::Instant::now() + self.inner.config.destroy_grace + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if self.inner.registry.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let remaining: Vec<Arc<AgentProcess>> =
            self.inner.registry.lock().values().cloned().collect();
        for process in remaining {
            warn!(agent = %process.id(), "agent did not finalize before dispose deadline");
            process.flush_persistence();
        }
    }
}

/// Post-exit destroy finalization: terminal event, listener teardown,
/// persistence flush, state removal, workspace cleanup, deregistration.
async fn finalize_destroy<A: ChildAdapter>(inner: Arc<ManagerInner<A>>, id: AgentId) {
    let Some(process) = inner.registry.lock().remove(&id) else {
        return;
    };
    process.dispatch(&[StreamEvent::destroyed()]);
    process.clear_listeners();
    process.flush_persistence();

    if let Err(e) = inner.state_store.remove(&id) {
        warn!(agent = %id, error = %e, "state file removal failed");
    }
    let record = process.snapshot();
    workspace::cleanup_workspace(&record.workspace_dir, process.repo()).await;
    info!(agent = %id, "agent destroyed");
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
