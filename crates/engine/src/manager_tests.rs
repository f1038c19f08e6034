// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{happy_script, harness, harness_with, settle, spec};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use warden_adapters::ChildCall;

#[tokio::test]
async fn create_runs_happy_path_to_idle() {
    let h = harness();
    h.adapter.push_script(happy_script("S-1"));

    let record = h.manager.create(spec("builder", "hello")).await.unwrap();
    assert_eq!(record.id, "a-1");
    assert_eq!(record.status, AgentStatus::Starting);
    assert_eq!(record.depth, 1);
    assert!(record.workspace_dir.is_dir());

    settle().await;
    let record = h.manager.get(&record.id).unwrap();
    assert_eq!(record.status, AgentStatus::Idle);
    assert_eq!(record.session_id, Some("S-1".to_string()));
    assert_eq!(record.usage.tokens_in, 10);
    assert_eq!(record.usage.tokens_out, 20);
    assert!((record.usage.estimated_cost - 0.001).abs() < 1e-9);

    // State file exists and matches
    let persisted = h.state_store.load_all().unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].status, AgentStatus::Idle);
}

#[tokio::test]
async fn create_validates_prompt_and_model() {
    let h = harness();
    assert!(matches!(
        h.manager.create(spec("x", "")).await,
        Err(SupervisorError::Validation(_))
    ));

    let mut bad_model = spec("x", "hi");
    bad_model.model = Some("gpt-9".to_string());
    assert!(matches!(
        h.manager.create(bad_model).await,
        Err(SupervisorError::Validation(_))
    ));

    let mut long = spec("x", "hi");
    long.prompt = "p".repeat(100_001);
    assert!(matches!(
        h.manager.create(long).await,
        Err(SupervisorError::Validation(_))
    ));
}

#[tokio::test]
async fn create_sanitizes_name() {
    let h = harness();
    h.adapter.push_script(happy_script("S"));
    let record = h.manager.create(spec("my agent!", "hi")).await.unwrap();
    assert_eq!(record.name, "my-agent");
}

#[tokio::test]
async fn max_agents_cap_is_enforced() {
    let h = harness_with(ManagerConfig {
        max_agents: 1,
        ..Default::default()
    });
    h.adapter.push_script(happy_script("S"));
    h.manager.create(spec("one", "hi")).await.unwrap();

    assert!(matches!(
        h.manager.create(spec("two", "hi")).await,
        Err(SupervisorError::Capacity(_))
    ));
}

#[tokio::test]
async fn child_depth_is_parent_plus_one_and_capped() {
    let h = harness_with(ManagerConfig {
        max_depth: 2,
        ..Default::default()
    });
    h.adapter.push_script(happy_script("S-1"));
    let parent = h.manager.create(spec("parent", "hi")).await.unwrap();

    h.adapter.push_script(happy_script("S-2"));
    let mut child_spec = spec("child", "hi");
    child_spec.parent_id = Some(parent.id.clone());
    let child = h.manager.create(child_spec).await.unwrap();
    assert_eq!(child.depth, 2);
    assert_eq!(child.parent_id, Some(parent.id.clone()));

    let mut grandchild_spec = spec("grandchild", "hi");
    grandchild_spec.parent_id = Some(child.id.clone());
    assert!(matches!(
        h.manager.create(grandchild_spec).await,
        Err(SupervisorError::Capacity(_))
    ));
}

#[tokio::test]
async fn unknown_parent_is_not_found() {
    let h = harness();
    let mut orphan = spec("x", "hi");
    orphan.parent_id = Some(AgentId::new("ghost"));
    assert!(matches!(
        h.manager.create(orphan).await,
        Err(SupervisorError::NotFound(_))
    ));
}

#[tokio::test]
async fn max_children_cap_is_enforced() {
    let h = harness_with(ManagerConfig {
        max_children_per_agent: 1,
        ..Default::default()
    });
    h.adapter.push_script(happy_script("S-1"));
    let parent = h.manager.create(spec("parent", "hi")).await.unwrap();

    h.adapter.push_script(happy_script("S-2"));
    let mut first = spec("c1", "hi");
    first.parent_id = Some(parent.id.clone());
    h.manager.create(first).await.unwrap();

    let mut second = spec("c2", "hi");
    second.parent_id = Some(parent.id.clone());
    assert!(matches!(
        h.manager.create(second).await,
        Err(SupervisorError::Capacity(_))
    ));
}

#[tokio::test]
async fn memory_pressure_rejects_before_spawn() {
    let h = harness();
    let high = Arc::new(AtomicBool::new(true));
    h.manager.set_memory_pressure({
        let high = Arc::clone(&high);
        Arc::new(move || high.load(Ordering::SeqCst))
    });

    assert!(matches!(
        h.manager.create(spec("x", "hi")).await,
        Err(SupervisorError::Overloaded(_))
    ));
    assert!(h.adapter.calls().is_empty());

    high.store(false, Ordering::SeqCst);
    h.adapter.push_script(happy_script("S"));
    assert!(h.manager.create(spec("x", "hi")).await.is_ok());
}

#[tokio::test]
async fn spawn_failure_marks_agent_error() {
    let h = harness();
    h.adapter.set_spawn_error("binary missing");

    let result = h.manager.create(spec("x", "hi")).await;
    assert!(matches!(result, Err(SupervisorError::Spawn(_))));

    // The agent exists, errored, with a done(-1) in history
    let records = h.manager.list();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AgentStatus::Error);
}

#[tokio::test]
async fn message_requires_idle_or_restored() {
    let h = harness();
    // Unscripted child: stays running
    h.manager.create(spec("x", "hi")).await.unwrap();
    settle().await;

    let id = AgentId::new("a-1");
    assert!(matches!(
        h.manager.message(&id, "again", None, None).await,
        Err(SupervisorError::Conflict(_))
    ));
    assert!(matches!(
        h.manager.message(&AgentId::new("ghost"), "x", None, None).await,
        Err(SupervisorError::NotFound(_))
    ));
}

#[tokio::test]
async fn message_resumes_recorded_session() {
    let h = harness();
    h.adapter.push_script(happy_script("S-77"));
    let record = h.manager.create(spec("x", "hello")).await.unwrap();
    settle().await;
    assert_eq!(h.manager.get(&record.id).unwrap().status, AgentStatus::Idle);

    h.adapter.push_script(happy_script("S-77"));
    h.manager.message(&record.id, "continue", None, None).await.unwrap();
    settle().await;

    let args = h.adapter.last_spawn_args().unwrap();
    let resume_pos = args.iter().position(|a| a == "--resume").unwrap();
    assert_eq!(args[resume_pos + 1], "S-77");
    assert_eq!(args.last().unwrap(), "continue");
}

#[tokio::test]
async fn first_spawn_has_no_resume_flag() {
    let h = harness();
    h.adapter.push_script(happy_script("S"));
    h.manager.create(spec("x", "hello")).await.unwrap();

    let args = h.adapter.last_spawn_args().unwrap();
    assert!(!args.contains(&"--resume".to_string()));
    assert_eq!(args.last().unwrap(), "hello");
}

#[tokio::test]
async fn destroy_returns_whether_agent_existed() {
    let h = harness();
    h.adapter.push_script(happy_script("S"));
    let record = h.manager.create(spec("x", "hi")).await.unwrap();
    settle().await;

    assert!(h.manager.destroy(&record.id).await.unwrap());
    settle().await;
    assert!(h.manager.get(&record.id).is_none());
    assert!(h.state_store.load_all().unwrap().is_empty());
    assert!(!record.workspace_dir.exists());

    assert!(!h.manager.destroy(&record.id).await.unwrap());
}

#[tokio::test]
async fn destroy_emits_destroyed_to_subscribers() {
    let h = harness();
    h.adapter.push_script(happy_script("S"));
    let record = h.manager.create(spec("x", "hi")).await.unwrap();
    settle().await;

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let listener: crate::process::Listener = {
        let seen = Arc::clone(&seen);
        Arc::new(move |events: &[StreamEvent]| {
            seen.lock()
                .extend(events.iter().map(|e| e.kind().as_str().to_string()));
        })
    };
    h.manager.subscribe(&record.id, listener, None).unwrap();

    h.manager.destroy(&record.id).await.unwrap();
    settle().await;

    assert_eq!(seen.lock().last().map(String::as_str), Some("destroyed"));
}

#[tokio::test]
async fn destroying_parent_cascades_to_children() {
    let h = harness();
    h.adapter.push_script(happy_script("S-1"));
    let parent = h.manager.create(spec("parent", "hi")).await.unwrap();

    h.adapter.push_script(happy_script("S-2"));
    let mut child_spec = spec("child", "hi");
    child_spec.parent_id = Some(parent.id.clone());
    let child = h.manager.create(child_spec).await.unwrap();
    settle().await;

    h.manager.destroy(&parent.id).await.unwrap();
    settle().await;

    assert!(h.manager.get(&parent.id).is_none());
    assert!(h.manager.get(&child.id).is_none());
    assert_eq!(h.manager.agent_count(), 0);
}

#[tokio::test]
async fn pause_and_resume_toggle_status() {
    let h = harness();
    // Unscripted child stays running
    let record = h.manager.create(spec("x", "hi")).await.unwrap();
    let id = record.id.clone();
    settle().await;

    // Fake child has no init event, status is still starting; nudge to running
    h.adapter
        .emit_event(&id, json!({"type": "system", "subtype": "init", "session_id": "S"}))
        .await;
    settle().await;
    assert_eq!(h.manager.get(&id).unwrap().status, AgentStatus::Running);

    h.manager.pause(&id).await.unwrap();
    assert_eq!(h.manager.get(&id).unwrap().status, AgentStatus::Paused);
    assert!(matches!(
        h.manager.pause(&id).await,
        Err(SupervisorError::Conflict(_))
    ));

    h.manager.resume(&id).await.unwrap();
    assert_eq!(h.manager.get(&id).unwrap().status, AgentStatus::Running);
    assert!(matches!(
        h.manager.resume(&id).await,
        Err(SupervisorError::Conflict(_))
    ));

    let calls = h.adapter.calls();
    assert!(calls.iter().any(|c| matches!(c, ChildCall::Pause { .. })));
    assert!(calls.iter().any(|c| matches!(c, ChildCall::Resume { .. })));
}

#[tokio::test]
async fn clear_context_drops_session_keeps_usage() {
    let h = harness();
    h.adapter.push_script(happy_script("S-9"));
    let record = h.manager.create(spec("x", "hi")).await.unwrap();
    settle().await;

    h.manager.clear_context(&record.id).await.unwrap();
    let cleared = h.manager.get(&record.id).unwrap();
    assert_eq!(cleared.session_id, None);
    assert_eq!(cleared.usage.tokens_in, 10);

    // Next message spawns without --resume
    h.adapter.push_script(happy_script("S-10"));
    h.manager.message(&record.id, "fresh", None, None).await.unwrap();
    let args = h.adapter.last_spawn_args().unwrap();
    assert!(!args.contains(&"--resume".to_string()));
}

#[tokio::test]
async fn clear_context_rejected_unless_idle() {
    let h = harness();
    h.manager.create(spec("x", "hi")).await.unwrap();
    settle().await;
    assert!(matches!(
        h.manager.clear_context(&AgentId::new("a-1")).await,
        Err(SupervisorError::Conflict(_))
    ));
}

#[tokio::test]
async fn kill_switch_blocks_mutations() {
    let h = harness();
    h.adapter.push_script(happy_script("S"));
    let record = h.manager.create(spec("x", "hi")).await.unwrap();
    settle().await;

    h.kill_flag.set(true);
    assert!(matches!(
        h.manager.create(spec("y", "hi")).await,
        Err(SupervisorError::KillSwitchActive)
    ));
    assert!(matches!(
        h.manager.message(&record.id, "x", None, None).await,
        Err(SupervisorError::KillSwitchActive)
    ));
    assert!(matches!(
        h.manager.clear_context(&record.id).await,
        Err(SupervisorError::KillSwitchActive)
    ));
    assert!(matches!(
        h.manager.destroy(&record.id).await,
        Err(SupervisorError::KillSwitchActive)
    ));
    assert!(matches!(
        h.manager.destroy_forced(&record.id).await,
        Err(SupervisorError::KillSwitchActive)
    ));
    // The agent survived both attempts
    assert!(h.manager.get(&record.id).is_some());

    h.kill_flag.set(false);
    assert!(h.manager.message(&record.id, "x", None, None).await.is_ok());
}

#[tokio::test]
async fn can_deliver_and_can_interrupt_track_status() {
    let h = harness();
    let record = h.manager.create(spec("x", "hi")).await.unwrap();
    let id = record.id.clone();
    h.adapter
        .emit_event(&id, json!({"type": "system", "subtype": "init", "session_id": "S"}))
        .await;
    settle().await;

    // Running: interruptible, not deliverable
    assert!(h.manager.can_interrupt(&id));
    assert!(!h.manager.can_deliver(&id));

    h.adapter
        .emit_event(
            &id,
            json!({"type": "result", "num_turns": 1, "usage": {"input_tokens": 1, "output_tokens": 1}}),
        )
        .await;
    h.adapter.emit_exit(&id, 0).await;
    settle().await;

    // Idle: deliverable, not interruptible
    assert!(h.manager.can_deliver(&id));
    assert!(!h.manager.can_interrupt(&id));

    // Delivery lock removes deliverability until released
    assert!(h.manager.try_delivery_lock(&id));
    assert!(!h.manager.can_deliver(&id));
    h.manager.delivery_done(&id);
    assert!(h.manager.can_deliver(&id));
}

#[tokio::test]
async fn on_idle_fires_after_result() {
    let h = harness();
    let fired = Arc::new(AtomicUsize::new(0));
    h.manager.on_idle({
        let fired = Arc::clone(&fired);
        Arc::new(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    });

    h.adapter.push_script(happy_script("S"));
    h.manager.create(spec("x", "hi")).await.unwrap();
    settle().await;

    assert!(fired.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn ttl_sweep_destroys_only_stale_idle_agents() {
    let h = harness_with(ManagerConfig {
        session_ttl: Duration::ZERO,
        ..Default::default()
    });

    // One idle agent, one still running
    h.adapter.push_script(happy_script("S"));
    let idle = h.manager.create(spec("idle", "hi")).await.unwrap();
    let running = h.manager.create(spec("running", "hi")).await.unwrap();
    let running_id = running.id.clone();
    h.adapter
        .emit_event(&running_id, json!({"type": "system", "subtype": "init", "session_id": "R"}))
        .await;
    settle().await;

    h.manager.sweep_expired().await;
    settle().await;

    assert!(h.manager.get(&idle.id).is_none());
    assert!(h.manager.get(&running_id).is_some());
}

#[tokio::test]
async fn dispose_destroys_everything() {
    let h = harness();
    h.adapter.push_script(happy_script("S-1"));
    h.adapter.push_script(happy_script("S-2"));
    h.manager.create(spec("one", "hi")).await.unwrap();
    h.manager.create(spec("two", "hi")).await.unwrap();
    settle().await;

    h.manager.dispose().await;
    assert_eq!(h.manager.agent_count(), 0);
    assert!(h.state_store.load_all().unwrap().is_empty());
}

#[tokio::test]
async fn register_restored_keeps_agent_addressable() {
    let h = harness();
    let mut record = warden_core::test_support::test_record("a-9");
    record.session_id = Some("S-old".to_string());
    record.status = AgentStatus::Idle;

    h.manager.register_restored(record);
    let restored = h.manager.get(&AgentId::new("a-9")).unwrap();
    assert_eq!(restored.status, AgentStatus::Restored);
    assert!(h.manager.can_deliver(&AgentId::new("a-9")));

    // Messaging a restored agent resumes its old session
    h.adapter.push_script(happy_script("S-old"));
    h.manager
        .message(&AgentId::new("a-9"), "wake up", None, None)
        .await
        .unwrap();
    let args = h.adapter.last_spawn_args().unwrap();
    let resume_pos = args.iter().position(|a| a == "--resume").unwrap();
    assert_eq!(args[resume_pos + 1], "S-old");
}
