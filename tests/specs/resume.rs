//! Scenario: a follow-up message resumes the recorded session.

use crate::prelude::*;
use warden_core::AgentStatus;

#[tokio::test]
async fn message_on_idle_agent_spawns_with_resume() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S"));
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "start"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        h.supervisor.manager.get(&record.id).unwrap().status,
        AgentStatus::Idle
    );

    h.adapter.push_script(happy_script("S"));
    h.supervisor
        .manager
        .message(&record.id, "continue", None, None)
        .await
        .unwrap();

    // `--resume S` with the session id immediately before the format flags,
    // prompt as the final positional argument
    let args = h.adapter.last_spawn_args().unwrap();
    let resume_pos = args.iter().position(|a| a == "--resume").unwrap();
    assert_eq!(args[resume_pos + 1], "S");
    assert_eq!(args[resume_pos + 2], "--input-format");
    assert_eq!(args.last().unwrap(), "continue");

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn clear_context_starts_a_fresh_session() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S-1"));
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "start"))
        .await
        .unwrap();
    settle().await;

    h.supervisor.manager.clear_context(&record.id).await.unwrap();

    h.adapter.push_script(happy_script("S-2"));
    h.supervisor
        .manager
        .message(&record.id, "fresh start", None, None)
        .await
        .unwrap();
    settle().await;

    let args = h.adapter.last_spawn_args().unwrap();
    assert!(!args.contains(&"--resume".to_string()));

    // Usage survived the context clear; the new session id replaced the old
    let agent = h.supervisor.manager.get(&record.id).unwrap();
    assert_eq!(agent.session_id, Some("S-2".to_string()));
    assert_eq!(agent.usage.tokens_in, 20);

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn restart_rehydrates_agents_for_resume() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S-77"));
    let record = h
        .supervisor
        .manager
        .create(agent_spec("worker", "start"))
        .await
        .unwrap();
    settle().await;
    let id = record.id.clone();

    // Simulate a crash: drop the supervisor without dispose, then boot a
    // fresh one over the same state root
    drop(h.supervisor);
    let adapter = h.adapter.clone();
    let config = warden_engine::SupervisorConfig {
        signing_secret: Some("spec-signing-secret".to_string()),
        api_key: None,
        state_root: h.dir.path().to_path_buf(),
        context_dir: h.dir.path().join("context"),
        settle_delay: std::time::Duration::ZERO,
        manager: warden_engine::ManagerConfig {
            workspace_root: h.dir.path().join("workspaces"),
            ..Default::default()
        },
    };
    let supervisor = warden_engine::Supervisor::new(config, adapter.clone()).unwrap();
    let report = supervisor.start().await.unwrap();
    assert_eq!(report.restored, 1);

    let restored = supervisor.manager.get(&id).unwrap();
    assert_eq!(restored.status, AgentStatus::Restored);

    // Messaging the restored shell resumes the old session
    adapter.push_script(happy_script("S-77"));
    supervisor.manager.message(&id, "welcome back", None, None).await.unwrap();
    let args = adapter.last_spawn_args().unwrap();
    let resume_pos = args.iter().position(|a| a == "--resume").unwrap();
    assert_eq!(args[resume_pos + 1], "S-77");

    supervisor.shutdown().await;
}
