//! Scenario: create an agent, let the child run one turn to completion.

use crate::prelude::*;
use warden_core::AgentStatus;
use warden_storage::StateStore;

#[tokio::test]
async fn create_hello_reaches_idle_with_usage_and_state_file() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S"));

    let record = h
        .supervisor
        .manager
        .create(agent_spec("greeter", "hello"))
        .await
        .unwrap();
    settle().await;

    let agent = h.supervisor.manager.get(&record.id).unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(agent.session_id, Some("S".to_string()));
    assert_eq!(agent.usage.tokens_in, 10);
    assert_eq!(agent.usage.tokens_out, 20);
    assert_eq!(agent.usage.total_tokens_spent, 30);
    assert!((agent.usage.estimated_cost - 0.001).abs() < 1e-9);

    // Persisted state file exists and parses back to the same agent
    let store = StateStore::open(h.dir.path()).unwrap();
    let persisted = store.load_all().unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].id, agent.id);
    assert_eq!(persisted[0].status, AgentStatus::Idle);
    assert_eq!(persisted[0].usage, agent.usage);

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn child_invocation_uses_stream_json_wire_format() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S"));

    h.supervisor
        .manager
        .create(agent_spec("greeter", "hello"))
        .await
        .unwrap();

    let args = h.adapter.last_spawn_args().unwrap();
    let joined = args.join(" ");
    assert!(joined.contains("--input-format stream-json"));
    assert!(joined.contains("--output-format stream-json"));
    assert_eq!(args.last().unwrap(), "hello");

    // The child env carries the injected contract
    let env = h.adapter.last_spawn_env().unwrap();
    assert_eq!(env.get("SHELL"), Some(&"/bin/sh".to_string()));
    assert_eq!(
        env.get("CLAUDE_CODE_DISABLE_NONESSENTIAL_TRAFFIC"),
        Some(&"1".to_string())
    );
    let token = env.get("AGENT_AUTH_TOKEN").unwrap();
    assert!(h.supervisor.tokens.verify_token(token).is_some());

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn events_are_persisted_to_the_agent_log() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S"));

    let record = h
        .supervisor
        .manager
        .create(agent_spec("greeter", "hello"))
        .await
        .unwrap();
    settle().await;

    let events = h.supervisor.event_store.read_all(record.id.as_str()).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind().as_str()).collect();
    assert_eq!(kinds, vec!["system", "assistant", "result", "done"]);

    h.supervisor.shutdown().await;
}
