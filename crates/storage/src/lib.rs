// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-storage: on-disk persistence for the warden agent supervisor.
//!
//! Everything here is synchronous and side-effect-only; write scheduling
//! (debounce, batching) is the engine's job. Two directories live under a
//! common root: `agents/` with one atomically-written JSON state file per
//! agent, and `events/` with one append-only JSONL file per agent.

pub mod events;
pub mod killswitch;
pub mod state;

pub use events::EventLogStore;
pub use killswitch::{KillSwitchRecord, KillSwitchStore};
pub use state::StateStore;

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
