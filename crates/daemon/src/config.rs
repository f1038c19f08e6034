// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-driven daemon configuration.
//!
//! Everything is a `WARDEN_*` variable; only the signing secret is
//! required. The state root defaults to `/tmp/warden` when no persistent
//! root is configured.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use warden_engine::{ManagerConfig, SupervisorConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("WARDEN_JWT_SECRET must be set")]
    MissingSecret,
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
    }
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(&|key| std::env::var(key).ok())
    }

    /// Load through an environment accessor (injectable for tests).
    pub fn from_env(get: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let signing_secret = get("WARDEN_JWT_SECRET").filter(|s| !s.is_empty());
        if signing_secret.is_none() {
            return Err(ConfigError::MissingSecret);
        }

        let state_root = get("WARDEN_STATE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/warden"));
        let context_dir = get("WARDEN_CONTEXT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| state_root.join("context"));

        let mut manager = ManagerConfig::default();
        if let Some(cli_bin) = get("WARDEN_AGENT_CLI") {
            manager.cli_bin = cli_bin;
        }
        if let Some(root) = get("WARDEN_WORKSPACE_ROOT") {
            manager.workspace_root = PathBuf::from(root);
        }
        if let Some(max_agents) = parse(get, "WARDEN_MAX_AGENTS")? {
            manager.max_agents = max_agents;
        }
        if let Some(max_children) = parse(get, "WARDEN_MAX_CHILDREN")? {
            manager.max_children_per_agent = max_children;
        }
        if let Some(max_depth) = parse(get, "WARDEN_MAX_DEPTH")? {
            manager.max_depth = max_depth;
        }
        if let Some(ttl_hours) = parse::<u64>(get, "WARDEN_SESSION_TTL_HOURS")? {
            manager.session_ttl = Duration::from_secs(ttl_hours * 60 * 60);
        }

        let settle_delay = parse::<u64>(get, "WARDEN_SETTLE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(300));

        Ok(Self {
            log_path: state_root.join("daemon.log"),
            lock_path: state_root.join("daemon.lock"),
            supervisor: SupervisorConfig {
                signing_secret,
                api_key: get("WARDEN_API_KEY").filter(|s| !s.is_empty()),
                context_dir,
                state_root,
                settle_delay,
                manager,
            },
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
