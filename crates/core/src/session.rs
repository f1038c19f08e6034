// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifier type.
//!
//! SessionId is the child CLI's own notion of a conversation, reported as an
//! opaque string in the child's first `system:init` event. It is distinct
//! from AgentId, which identifies the logical agent instance.

crate::define_id! {
    /// Opaque conversation id minted by the child CLI.
    ///
    /// Passed back via `--resume` to continue a conversation in a fresh
    /// child process.
    pub struct SessionId;
}
