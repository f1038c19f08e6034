// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{AgentId, AgentRecord, StreamEvent};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::path::PathBuf;

// ── Stream event factories ──────────────────────────────────────────────────

pub fn system_init_event(session_id: &str) -> StreamEvent {
    stream_event(json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
    }))
}

pub fn assistant_event(message_id: &str, text: &str) -> StreamEvent {
    stream_event(json!({
        "type": "assistant",
        "message": {
            "id": message_id,
            "content": [{"type": "text", "text": text}],
        },
    }))
}

pub fn result_event(num_turns: u64, cost_usd: f64, input: u64, output: u64) -> StreamEvent {
    stream_event(json!({
        "type": "result",
        "num_turns": num_turns,
        "duration_ms": 1000,
        "total_cost_usd": cost_usd,
        "usage": {"input_tokens": input, "output_tokens": output},
    }))
}

pub fn stream_event(value: serde_json::Value) -> StreamEvent {
    #[allow(clippy::unwrap_used)]
    StreamEvent::from_value(value).unwrap()
}

// ── Record factories ────────────────────────────────────────────────────────

pub fn test_record(id: &str) -> AgentRecord {
    let now = Utc
        .timestamp_millis_opt(1_700_000_000_000)
        .single()
        .unwrap_or_default();
    AgentRecord::new(
        AgentId::new(id),
        format!("agent-{id}"),
        PathBuf::from(format!("/tmp/warden-workspaces/workspace-{id}")),
        now,
    )
}
