// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-engine: the agent supervisor proper.
//!
//! Owns agent lifecycles (spawn, stream multiplexing, persistence,
//! destruction), the inter-agent message bus with targeted auto-delivery,
//! the token service, the secret sanitizer, the kill switch, and startup
//! recovery. The daemon crate wires this up from environment config; the
//! transport layer that drives it is out of scope here.

pub mod auth;
pub mod batch;
pub mod bus;
pub mod delivery;
pub mod killswitch;
pub mod manager;
pub mod process;
pub mod recovery;
pub mod sanitize;
pub mod supervisor;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use auth::{AuthError, Claims, TokenKind, TokenService};
pub use batch::{EventBatcher, StateSaver};
pub use bus::{MessageBus, MessageQuery};
pub use delivery::{format_delivery_prompt, format_interrupt_prompt, AutoDelivery};
pub use killswitch::{KillSwitch, KillSwitchFlag};
pub use manager::{
    AgentManager, Attachment, CreateAgentSpec, ManagerConfig, RepoContext,
};
pub use process::{AgentProcess, Subscription};
pub use recovery::{run_recovery, RecoveryReport};
pub use sanitize::SecretRedactor;
pub use supervisor::{Supervisor, SupervisorConfig};
