// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy surfaced at the supervisor boundary

use thiserror::Error;

/// Errors surfaced to callers of the agent manager and message bus.
///
/// Local recoveries (malformed stdout lines, transient disk errors,
/// misbehaving listeners) are logged and swallowed inside the engine and
/// never reach this type.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("kill switch is active")]
    KillSwitchActive,
    #[error("overloaded: {0}")]
    Overloaded(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("misconfigured: {0}")]
    Misconfigured(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
