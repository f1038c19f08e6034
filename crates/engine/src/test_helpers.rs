// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for engine tests: a manager + bus wired to the fake
//! child adapter over a temp state root.

use crate::auth::TokenService;
use crate::bus::MessageBus;
use crate::killswitch::KillSwitchFlag;
use crate::manager::{AgentManager, CreateAgentSpec, ManagerConfig};
use crate::sanitize::SecretRedactor;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use warden_adapters::{FakeChildAdapter, FakeStep};
use warden_storage::{EventLogStore, KillSwitchStore, StateStore};

pub struct Harness {
    pub manager: AgentManager<FakeChildAdapter>,
    pub adapter: FakeChildAdapter,
    pub bus: Arc<MessageBus>,
    pub kill_flag: Arc<KillSwitchFlag>,
    pub state_store: Arc<StateStore>,
    pub event_store: Arc<EventLogStore>,
    pub tokens: Arc<TokenService>,
    pub _dir: TempDir,
}

impl Harness {
    pub fn kill_store(&self) -> KillSwitchStore {
        KillSwitchStore::open(self._dir.path())
    }
}

pub fn harness() -> Harness {
    harness_with(ManagerConfig::default())
}

pub fn harness_with(mut config: ManagerConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    config.workspace_root = dir.path().join("workspaces");
    let state_store = Arc::new(StateStore::open(dir.path()).unwrap());
    let event_store = Arc::new(EventLogStore::open(dir.path()).unwrap());
    let redactor = Arc::new(SecretRedactor::new());
    let tokens =
        Arc::new(TokenService::new(Some("test-secret"), None, Arc::clone(&redactor)).unwrap());
    let kill_flag = Arc::new(KillSwitchFlag::new());
    let adapter = FakeChildAdapter::new();

    let counter = Arc::new(AtomicUsize::new(0));
    let manager = AgentManager::new(
        config,
        adapter.clone(),
        Arc::clone(&tokens),
        redactor,
        Arc::clone(&state_store),
        Arc::clone(&event_store),
        Arc::clone(&kill_flag),
    )
    .with_id_gen(Arc::new(move || {
        format!("a-{}", counter.fetch_add(1, Ordering::SeqCst) + 1)
    }));

    Harness {
        manager,
        adapter,
        bus: Arc::new(MessageBus::new()),
        kill_flag,
        state_store,
        event_store,
        tokens,
        _dir: dir,
    }
}

pub fn spec(name: &str, prompt: &str) -> CreateAgentSpec {
    CreateAgentSpec {
        name: name.to_string(),
        prompt: prompt.to_string(),
        ..Default::default()
    }
}

/// init → assistant → result(10 in / 20 out, $0.001) → exit 0.
pub fn happy_script(session: &str) -> Vec<FakeStep> {
    vec![
        FakeStep::event(json!({"type": "system", "subtype": "init", "session_id": session})),
        FakeStep::event(json!({"type": "assistant", "message": {"id": "m-1", "content": [{"type": "text", "text": "hi"}]}})),
        FakeStep::event(json!({
            "type": "result",
            "num_turns": 1,
            "duration_ms": 50,
            "total_cost_usd": 0.001,
            "usage": {"input_tokens": 10, "output_tokens": 20},
        })),
        FakeStep::Exit(0),
    ]
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}
