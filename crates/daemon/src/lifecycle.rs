// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use mx_core::{Endpoint, EndpointError, MutexRegistry};
use thiserror::Error;
use tracing::{info, warn};

use crate::server::{CoordinationServer, ServerError};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the coordination server listens
    pub endpoint: Endpoint,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
}

impl Config {
    /// Build configuration from the environment.
    ///
    /// `MX_ENDPOINT` selects the listen address; otherwise the daemon listens
    /// on `mx.sock` inside the socket directory.
    pub fn from_env() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        Ok(Self::in_dir(state_dir, default_endpoint()?))
    }

    /// Configuration rooted at an explicit state directory
    pub fn in_dir(state_dir: PathBuf, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
        }
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub server: CoordinationServer,
    /// When daemon started
    pub start_time: Instant,
}

impl DaemonState {
    /// Shutdown the daemon gracefully
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        // 1. Terminate connections and release the socket
        self.server.close().await?;

        // 2. Remove PID file (lock itself is released when lock_file drops)
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Daemon shutdown complete"
        );
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Invalid MX_ENDPOINT: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        Err(e) => {
            cleanup_on_failure(config, &e);
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory
    if let Some(parent) = config.lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire lock file FIRST - prevents two daemons fighting over the socket
    // (no truncation until the lock is ours, so a running daemon's PID survives)
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Bind (LAST - only after the lock is ours)
    let registry = Arc::new(MutexRegistry::new());
    let mut server = CoordinationServer::new(registry, config.endpoint.clone());
    let local = server.open().await?;

    info!(endpoint = %local, "Daemon started");

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        server,
        start_time: Instant::now(),
    })
}

/// Endpoint from `MX_ENDPOINT`, falling back to `mx.sock` in the socket directory
pub fn default_endpoint() -> Result<Endpoint, EndpointError> {
    match std::env::var("MX_ENDPOINT") {
        Ok(raw) => raw.parse(),
        Err(_) => Ok(Endpoint::Unix(socket_dir().join("mx.sock"))),
    }
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config, error: &LifecycleError) {
    // Another daemon owns the PID file; leave it alone
    if matches!(error, LifecycleError::LockFailed(_)) {
        return;
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// Get the state directory for mx
fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("MX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }

    // Use XDG_STATE_HOME or default to ~/.local/state
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("mx"));
    }

    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/mx"))
}

/// Get the socket directory for mx
///
/// Uses /tmp/mx by default to keep paths short (macOS SUN_LEN = 104).
/// Can be overridden with MX_SOCKET_DIR.
fn socket_dir() -> PathBuf {
    match std::env::var("MX_SOCKET_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from("/tmp/mx"),
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
