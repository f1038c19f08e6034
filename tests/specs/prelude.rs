//! Shared harness for the behavioral specs.

use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use warden_adapters::{FakeChildAdapter, FakeStep};
use warden_engine::{CreateAgentSpec, ManagerConfig, Supervisor, SupervisorConfig};

pub struct SpecHarness {
    pub supervisor: Supervisor<FakeChildAdapter>,
    pub adapter: FakeChildAdapter,
    pub dir: TempDir,
}

pub fn build_harness() -> SpecHarness {
    build_harness_at(TempDir::new().unwrap())
}

/// Build a harness over an existing state root (restart simulation).
pub fn build_harness_at(dir: TempDir) -> SpecHarness {
    let config = SupervisorConfig {
        signing_secret: Some("spec-signing-secret".to_string()),
        api_key: None,
        state_root: dir.path().to_path_buf(),
        context_dir: dir.path().join("context"),
        settle_delay: Duration::ZERO,
        manager: ManagerConfig {
            workspace_root: dir.path().join("workspaces"),
            ..Default::default()
        },
    };
    let adapter = FakeChildAdapter::new();
    let supervisor = Supervisor::new(config, adapter.clone()).unwrap();
    SpecHarness {
        supervisor,
        adapter,
        dir,
    }
}

/// Build and start a harness (recovery + auto-delivery + TTL sweep).
pub async fn start_harness() -> SpecHarness {
    let harness = build_harness();
    harness.supervisor.start().await.unwrap();
    harness
}

pub fn agent_spec(name: &str, prompt: &str) -> CreateAgentSpec {
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
        FakeStep::event(json!({
            "type": "assistant",
            "message": {"id": "m-1", "content": [{"type": "text", "text": "working on it"}]},
        })),
        FakeStep::event(json!({
            "type": "result",
            "num_turns": 1,
            "duration_ms": 120,
            "total_cost_usd": 0.001,
            "usage": {"input_tokens": 10, "output_tokens": 20},
        })),
        FakeStep::Exit(0),
    ]
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}
