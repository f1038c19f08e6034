// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-adapters: process-level adapters for the warden supervisor.
//!
//! The [`child::ChildAdapter`] trait is the seam between the engine and
//! the operating system: the real implementation spawns the LLM CLI with
//! tokio and signals it with nix; the fake implementation scripts child
//! behavior for deterministic tests.

pub mod child;

pub use child::{
    ChildAdapter, ChildAdapterError, ChildOutput, ChildSpawnConfig, CliChildAdapter, CliInvocation,
};

#[cfg(any(test, feature = "test-support"))]
pub use child::fake::{ChildCall, FakeChildAdapter, FakeStep};
