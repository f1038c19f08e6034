//! Scenario: secrets from the environment never reach subscribers or the
//! persisted event log.

use crate::prelude::*;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use warden_core::StreamEvent;

#[tokio::test]
#[serial]
async fn env_secret_is_redacted_in_fanout_and_on_disk() {
    std::env::set_var("ANTHROPIC_API_KEY", "sk-abcdefgh");
    let h = start_harness().await;

    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "task"))
        .await
        .unwrap();
    let id = record.id.clone();

    let seen: Arc<parking_lot::Mutex<Vec<StreamEvent>>> = Default::default();
    h.supervisor
        .manager
        .subscribe(&id, {
            let seen = Arc::clone(&seen);
            Arc::new(move |events: &[StreamEvent]| {
                seen.lock().extend_from_slice(events);
            })
        }, None)
        .unwrap();

    h.adapter
        .emit_event(
            &id,
            json!({
                "type": "assistant",
                "message": {"id": "m-1", "content": [{"type": "text", "text": "the key is sk-abcdefgh"}]},
            }),
        )
        .await;
    h.adapter.emit_exit(&id, 0).await;
    settle().await;

    // Fan-out saw the redacted text
    let seen = seen.lock();
    let assistant = seen
        .iter()
        .find(|e| e.kind().as_str() == "assistant")
        .unwrap();
    let text = assistant.fields()["message"]["content"][0]["text"]
        .as_str()
        .unwrap();
    assert_eq!(text, "the key is [REDACTED]");
    drop(seen);

    // And so did the event log
    let logged = h.supervisor.event_store.read_all(id.as_str()).unwrap();
    let log_json = serde_json::to_string(&logged).unwrap();
    assert!(!log_json.contains("sk-abcdefgh"));
    assert!(log_json.contains("[REDACTED]"));

    std::env::remove_var("ANTHROPIC_API_KEY");
    h.supervisor.shutdown().await;
}

#[tokio::test]
#[serial]
async fn key_rotation_resets_the_secret_cache() {
    std::env::set_var("ANTHROPIC_API_KEY", "sk-first-secret");
    let h = start_harness().await;

    // Prime the cache
    assert_eq!(
        h.supervisor.redactor.sanitize_str("sk-first-secret"),
        "[REDACTED]"
    );

    // The environment changes, but the cache still holds the old value
    std::env::set_var("ANTHROPIC_API_KEY", "sk-second-secret");
    assert_eq!(
        h.supervisor.redactor.sanitize_str("sk-second-secret"),
        "sk-second-secret"
    );

    // Rotation invalidates the cache; sanitize reflects the current env
    h.supervisor.tokens.rotate_signing_key();
    assert_eq!(
        h.supervisor.redactor.sanitize_str("sk-second-secret"),
        "[REDACTED]"
    );

    std::env::remove_var("ANTHROPIC_API_KEY");
    h.supervisor.shutdown().await;
}
