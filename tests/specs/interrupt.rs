//! Scenario: an interrupt message preempts a running agent.

use crate::prelude::*;
use serde_json::json;
use warden_core::{AgentId, MessageKind, NewMessage};

#[tokio::test]
async fn interrupt_wins_over_a_running_turn() {
    let h = start_harness().await;

    // Unscripted child: stays busy after the handshake
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "long task"))
        .await
        .unwrap();
    let id = record.id.clone();
    h.adapter
        .emit_event(&id, json!({"type": "system", "subtype": "init", "session_id": "S"}))
        .await;
    settle().await;
    assert!(h.supervisor.manager.can_interrupt(&id));

    h.adapter.push_script(happy_script("S"));
    h.supervisor
        .bus
        .post(NewMessage::to_agent(
            "a-ops",
            id.clone(),
            MessageKind::Interrupt,
            "STOP",
        ))
        .unwrap();
    settle().await;

    // A new child was spawned with the interrupt prompt
    let args = h.adapter.last_spawn_args().unwrap();
    let prompt = args.last().unwrap();
    assert!(prompt.starts_with("[INTERRUPT from a-ops]"), "got: {prompt}");
    assert!(prompt.contains("<message-content>\nSTOP\n</message-content>"));
    assert!(prompt.contains("(Reply by sending a message back to agent ID: a-ops)"));

    // The delivery lock was never toggled by the interrupt path
    assert!(h.supervisor.manager.try_delivery_lock(&id));
    h.supervisor.manager.delivery_done(&id);

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn interrupt_to_idle_agent_goes_through_normal_delivery() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S"));
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "task"))
        .await
        .unwrap();
    settle().await;

    // Idle target: not interruptible, so the coupler uses the lock path,
    // still with the interrupt prompt
    h.adapter.push_script(happy_script("S"));
    h.supervisor
        .bus
        .post(NewMessage::to_agent(
            "a-ops",
            record.id.clone(),
            MessageKind::Interrupt,
            "note this",
        ))
        .unwrap();
    settle().await;

    let args = h.adapter.last_spawn_args().unwrap();
    assert!(args.last().unwrap().starts_with("[INTERRUPT from a-ops]"));

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn interrupt_for_unknown_agent_stays_queued() {
    let h = start_harness().await;
    let posted = h
        .supervisor
        .bus
        .post(NewMessage::to_agent(
            "a-ops",
            AgentId::new("ghost"),
            MessageKind::Interrupt,
            "STOP",
        ))
        .unwrap();
    settle().await;

    assert!(h.adapter.calls().is_empty());
    let stored = h.supervisor.bus.query(&Default::default());
    assert!(stored.iter().any(|m| m.id == posted.id && m.read_by.is_empty()));

    h.supervisor.shutdown().await;
}
