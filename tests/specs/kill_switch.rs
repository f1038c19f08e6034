//! Scenario: emergency halt wipes agents, tokens, and the bus, and the
//! tombstone blocks restore until the operator clears it.

use crate::prelude::*;
use warden_core::SupervisorError;

#[tokio::test]
async fn activation_sweeps_everything() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S-1"));
    h.adapter.push_script(happy_script("S-2"));
    h.supervisor
        .manager
        .create(agent_spec("one", "hi"))
        .await
        .unwrap();
    h.supervisor
        .manager
        .create(agent_spec("two", "hi"))
        .await
        .unwrap();
    settle().await;

    let token = h.supervisor.tokens.sign_user_token("operator");
    assert!(h.supervisor.tokens.verify_token(&token).is_some());

    h.supervisor.kill_switch.activate("incident").await;
    settle().await;

    // No agents, tombstone present, every outstanding token fails verify
    assert_eq!(h.supervisor.manager.agent_count(), 0);
    assert!(h.supervisor.state_store.has_tombstone());
    assert!(h.supervisor.tokens.verify_token(&token).is_none());
    assert!(h.supervisor.bus.is_empty());

    // Mutations fail fast while killed, destroy included
    assert!(matches!(
        h.supervisor.manager.create(agent_spec("x", "hi")).await,
        Err(SupervisorError::KillSwitchActive)
    ));
    assert!(matches!(
        h.supervisor
            .manager
            .destroy(&warden_core::AgentId::new("any"))
            .await,
        Err(SupervisorError::KillSwitchActive)
    ));

    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn tombstone_blocks_restore_on_next_boot() {
    let h = start_harness().await;
    h.adapter.push_script(happy_script("S"));
    h.supervisor
        .manager
        .create(agent_spec("one", "hi"))
        .await
        .unwrap();
    settle().await;
    h.supervisor.kill_switch.activate("incident").await;

    // Next boot over the same root
    drop(h.supervisor);
    let harness = crate::prelude::build_harness_at(h.dir);
    let report = harness.supervisor.start().await.unwrap();

    assert!(report.tombstoned);
    assert_eq!(report.restored, 0);
    assert!(harness.supervisor.kill_switch.is_active());

    // Operator clears the switch; creates are allowed again
    harness.supervisor.kill_switch.deactivate().unwrap();
    harness.adapter.push_script(happy_script("S"));
    assert!(harness
        .supervisor
        .manager
        .create(agent_spec("fresh", "hi"))
        .await
        .is_ok());

    harness.supervisor.shutdown().await;
}
