//! Scenario: late subscribers replay history from the given offset.

use crate::prelude::*;
use serde_json::json;
use std::sync::Arc;
use warden_core::StreamEvent;

fn collector() -> (
    Arc<parking_lot::Mutex<Vec<StreamEvent>>>,
    warden_engine::process::Listener,
) {
    let seen: Arc<parking_lot::Mutex<Vec<StreamEvent>>> = Default::default();
    let listener: warden_engine::process::Listener = {
        let seen = Arc::clone(&seen);
        Arc::new(move |events: &[StreamEvent]| {
            seen.lock().extend_from_slice(events);
        })
    };
    (seen, listener)
}

#[tokio::test]
async fn attach_after_offset_replays_missed_events() {
    let h = start_harness().await;
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "task"))
        .await
        .unwrap();
    let id = record.id.clone();

    for i in 0..5 {
        h.adapter
            .emit_event(&id, json!({"type": "assistant", "message": {"id": format!("m-{i}")}, "n": i}))
            .await;
    }
    settle().await;

    // Replay from absolute index 2: events 2, 3, 4
    let (seen, listener) = collector();
    h.supervisor.manager.subscribe(&id, listener, Some(2)).unwrap();
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].fields()["n"], 2);
        assert_eq!(seen[2].fields()["n"], 4);
    }

    // Live events continue after the replay
    h.adapter
        .emit_event(&id, json!({"type": "assistant", "message": {"id": "m-9"}, "n": 9}))
        .await;
    settle().await;
    assert_eq!(seen.lock().last().unwrap().fields()["n"], 9);

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn unsubscribed_listener_gets_nothing_further() {
    let h = start_harness().await;
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "task"))
        .await
        .unwrap();
    let id = record.id.clone();

    let (seen, listener) = collector();
    let subscription = h.supervisor.manager.subscribe(&id, listener, None).unwrap();

    h.adapter
        .emit_event(&id, json!({"type": "assistant", "message": {"id": "m-1"}}))
        .await;
    settle().await;
    assert_eq!(seen.lock().len(), 1);

    subscription.unsubscribe();
    h.adapter
        .emit_event(&id, json!({"type": "assistant", "message": {"id": "m-2"}}))
        .await;
    settle().await;
    assert_eq!(seen.lock().len(), 1);

    h.supervisor.shutdown().await;
}
