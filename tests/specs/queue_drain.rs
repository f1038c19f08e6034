//! Scenario: a message posted to a busy agent queues, then drains when
//! the agent idles.

use crate::prelude::*;
use serde_json::json;
use warden_core::{MessageKind, NewMessage};

#[tokio::test]
async fn queued_message_delivers_after_idle() {
    let h = start_harness().await;

    // Busy agent: unscripted child, handshake only
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "task"))
        .await
        .unwrap();
    let id = record.id.clone();
    h.adapter
        .emit_event(&id, json!({"type": "system", "subtype": "init", "session_id": "S"}))
        .await;
    settle().await;

    // Posted while running: no delivery yet
    let posted = h
        .supervisor
        .bus
        .post(NewMessage::to_agent("a-9", id.clone(), MessageKind::Info, "X"))
        .unwrap();
    settle().await;
    let spawns_so_far = h.adapter.calls().len();

    // Child finishes its turn; the idle drain kicks in
    h.adapter.push_script(happy_script("S"));
    h.adapter
        .emit_event(
            &id,
            json!({"type": "result", "num_turns": 1, "usage": {"input_tokens": 1, "output_tokens": 2}}),
        )
        .await;
    h.adapter.emit_exit(&id, 0).await;
    settle().await;
    settle().await;

    assert!(h.adapter.calls().len() > spawns_so_far, "a delivery spawn happened");
    let args = h.adapter.last_spawn_args().unwrap();
    let prompt = args.last().unwrap();
    assert!(prompt.starts_with("[Message from a-9 - type: info]"));
    assert!(prompt.contains("<message-content>\nX\n</message-content>"));

    // The recipient is now in readBy
    let stored = h.supervisor.bus.query(&Default::default());
    assert!(stored
        .iter()
        .any(|m| m.id == posted.id && m.is_read_by(id.as_str())));

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn queued_messages_drain_oldest_first() {
    let h = start_harness().await;

    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "task"))
        .await
        .unwrap();
    let id = record.id.clone();
    h.adapter
        .emit_event(&id, json!({"type": "system", "subtype": "init", "session_id": "S"}))
        .await;
    settle().await;

    h.supervisor
        .bus
        .post(NewMessage::to_agent("a-9", id.clone(), MessageKind::Info, "first"))
        .unwrap();
    h.supervisor
        .bus
        .post(NewMessage::to_agent("a-9", id.clone(), MessageKind::Info, "second"))
        .unwrap();

    h.adapter.push_script(happy_script("S"));
    h.adapter
        .emit_event(
            &id,
            json!({"type": "result", "num_turns": 1, "usage": {"input_tokens": 1, "output_tokens": 2}}),
        )
        .await;
    h.adapter.emit_exit(&id, 0).await;
    settle().await;
    settle().await;

    // The drain delivered the oldest pending message
    let delivered: Vec<String> = h
        .adapter
        .calls()
        .iter()
        .filter_map(|c| match c {
            warden_adapters::ChildCall::Spawn { args, .. } => args.last().cloned(),
            _ => None,
        })
        .filter(|prompt| prompt.starts_with("[Message from"))
        .collect();
    assert!(!delivered.is_empty());
    assert!(delivered[0].contains("first"));

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn status_messages_are_never_auto_delivered() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S"));
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "task"))
        .await
        .unwrap();
    settle().await;
    let spawns_before = h.adapter.calls().len();

    h.supervisor
        .bus
        .post(NewMessage::to_agent(
            "a-9",
            record.id.clone(),
            MessageKind::Status,
            "heartbeat",
        ))
        .unwrap();
    settle().await;

    assert_eq!(h.adapter.calls().len(), spawns_before);
    h.supervisor.shutdown().await;
}
