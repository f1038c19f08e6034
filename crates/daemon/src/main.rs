// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warden Daemon (wardend)
//!
//! Long-running agent supervisor: spawns and multiplexes child LLM-CLI
//! processes, persists their state, and routes inter-agent messages. The
//! transport layer (HTTP/SSE) connects through the engine crate and is
//! not part of this binary.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;

use crate::config::{Config, ConfigError};
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use warden_adapters::CliChildAdapter;
use warden_engine::Supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("wardend {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("wardend {}", env!("CARGO_PKG_VERSION"));
                println!("Warden Daemon - supervises child LLM-CLI agent processes");
                println!();
                println!("USAGE:");
                println!("    wardend");
                println!();
                println!("Configuration comes from WARDEN_* environment variables;");
                println!("WARDEN_JWT_SECRET is required.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: wardend [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    // Missing signing secret is fatal at startup
    let config = match Config::load() {
        Ok(config) => config,
        Err(e @ ConfigError::MissingSecret) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    std::fs::create_dir_all(&config.supervisor.state_root)?;

    // Single instance per state root
    let lock_file = File::create(&config.lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        let pid = std::fs::read_to_string(&config.lock_path).unwrap_or_default();
        eprintln!("wardend is already running");
        if !pid.trim().is_empty() {
            eprintln!("  pid: {}", pid.trim());
        }
        std::process::exit(1);
    }
    std::fs::write(&config.lock_path, format!("{}\n", std::process::id()))?;

    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let _log_guard = setup_logging(&config)?;

    info!("starting warden daemon");

    let supervisor = match Supervisor::new(config.supervisor.clone(), CliChildAdapter::new()) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("failed to construct supervisor: {e}");
            return Err(e.into());
        }
    };

    let report = supervisor.start().await?;
    if report.tombstoned {
        info!("kill-switch tombstone present; agents will not restore until it is cleared");
    } else {
        info!(
            restored = report.restored,
            orphans = report.orphans_killed,
            "recovery complete"
        );
    }

    // Signal ready for the parent process (e.g. systemd, a supervisor CLI)
    println!("READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    supervisor.shutdown().await;
    info!("daemon stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently
/// ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Startup marker written to the log before tracing is installed, so an
/// operator can find where the current attempt begins.
const STARTUP_MARKER_PREFIX: &str = "--- wardend: starting (pid: ";

fn write_startup_marker(config: &Config) -> std::io::Result<()> {
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent"))?;
    std::fs::create_dir_all(parent)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
