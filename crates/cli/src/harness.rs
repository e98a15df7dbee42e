// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end test orchestration
//!
//! Prepares the database, brings up the update-master coordination server and
//! the backend, runs the feature suite against the backend and tears
//! everything down again.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mx_core::{Endpoint, MutexRegistry};
use mx_daemon::{CoordinationServer, ServerError};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Time the backend gets to flush trailing events after the suite finishes
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(2500);

/// Database used by the backend under test.
///
/// Constructing the implementation is the connect step; `close` ends it.
#[async_trait]
pub trait Database: Send + Sync {
    /// Drop and recreate the schema
    async fn reset(&self) -> Result<(), BoxError>;
    /// Load seed data
    async fn seed(&self) -> Result<(), BoxError>;
    async fn close(&self) -> Result<(), BoxError>;
}

/// Backend service the feature suite talks to
#[async_trait]
pub trait Backend: Send + Sync {
    async fn open(&self) -> Result<(), BoxError>;
    async fn close(&self) -> Result<(), BoxError>;
}

/// Runs every feature in a directory against the backend
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn run(&self, dir: &Path, connection: &ConnectionDescriptor) -> Result<Report, BoxError>;
}

/// How features reach the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub encryption: Option<String>,
    /// Operating mode, uppercased
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub name: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub executions: Vec<Execution>,
}

impl Report {
    /// Errors of the failed executions, in run order
    pub fn failures(&self) -> Vec<String> {
        self.executions
            .iter()
            .filter_map(|e| e.error.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(Vec<String>),
}

impl From<&Report> for Outcome {
    fn from(report: &Report) -> Self {
        let failures = report.failures();
        if failures.is_empty() {
            Outcome::Success
        } else {
            Outcome::Failed(failures)
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub mode: Option<String>,
    pub skip_reset: bool,
    pub features_dir: PathBuf,
    pub api_port: u16,
    pub encryption: Option<String>,
    /// Where the coordination server listens
    pub endpoint: Endpoint,
    pub settle: Duration,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("database {step} failed: {source}")]
    Database {
        step: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("backend {step} failed: {source}")]
    Backend {
        step: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("test execution failed: {0}")]
    Executor(#[source] BoxError),

    #[error("coordination server: {0}")]
    Server(#[from] ServerError),
}

pub struct Harness<D, B, E> {
    database: D,
    backend: B,
    executor: E,
}

impl<D: Database, B: Backend, E: TestExecutor> Harness<D, B, E> {
    pub fn new(database: D, backend: B, executor: E) -> Self {
        Self {
            database,
            backend,
            executor,
        }
    }

    /// Run the suite once.
    ///
    /// Teardown is attempted for everything that was started, even when an
    /// earlier step or close failed; the first error is returned.
    pub async fn run(&self, options: &HarnessOptions) -> Result<Outcome, HarnessError> {
        let mut server =
            CoordinationServer::new(Arc::new(MutexRegistry::new()), options.endpoint.clone());
        let mut backend_open = false;

        let result = self.execute(options, &mut server, &mut backend_open).await;
        let teardown = self.teardown(&mut server, backend_open).await;

        let report = result?;
        teardown?;
        Ok(Outcome::from(&report))
    }

    async fn execute(
        &self,
        options: &HarnessOptions,
        server: &mut CoordinationServer,
        backend_open: &mut bool,
    ) -> Result<Report, HarnessError> {
        let mode = options.mode.as_deref().map(str::to_uppercase);
        if let Some(mode) = &mode {
            info!(mode = %mode, "running in mode");
        }

        if !options.skip_reset {
            timed("reset database", self.database.reset())
                .await
                .map_err(|source| HarnessError::Database {
                    step: "reset",
                    source,
                })?;
            timed("seed data", self.database.seed())
                .await
                .map_err(|source| HarnessError::Database {
                    step: "seed",
                    source,
                })?;
        }

        let endpoint = server.open().await?;
        info!(%endpoint, "update-master server open");

        self.backend
            .open()
            .await
            .map_err(|source| HarnessError::Backend {
                step: "open",
                source,
            })?;
        *backend_open = true;

        let connection = ConnectionDescriptor {
            host: format!("http://127.0.0.1:{}", options.api_port),
            encryption: options.encryption.clone(),
            mode,
        };
        let report = timed(
            "run features",
            self.executor.run(&options.features_dir, &connection),
        )
        .await
        .map_err(HarnessError::Executor)?;
        for execution in &report.executions {
            if let Some(error) = &execution.error {
                warn!(feature = %execution.name, error = %error, "feature failed");
            }
        }
        info!(
            executions = report.executions.len(),
            failures = report.failures().len(),
            "features finished"
        );

        tokio::time::sleep(options.settle).await;
        Ok(report)
    }

    async fn teardown(
        &self,
        server: &mut CoordinationServer,
        backend_open: bool,
    ) -> Result<(), HarnessError> {
        let mut errors = Vec::new();

        if backend_open {
            if let Err(source) = self.backend.close().await {
                warn!(error = %source, "backend close failed");
                errors.push(HarnessError::Backend {
                    step: "close",
                    source,
                });
            }
        }

        if let Err(source) = self.database.close().await {
            warn!(error = %source, "database close failed");
            errors.push(HarnessError::Database {
                step: "close",
                source,
            });
        }

        if let Err(e) = server.close().await {
            warn!(error = %e, "update-master server close failed");
            errors.push(HarnessError::Server(e));
        }

        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run `step` inside a span and log how long it took
async fn timed<T, F>(name: &'static str, step: F) -> Result<T, BoxError>
where
    F: Future<Output = Result<T, BoxError>>,
{
    let span = info_span!("harness.step", step = name);
    async {
        let start = Instant::now();
        let result = step.await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(elapsed_ms, "done"),
            Err(e) => warn!(elapsed_ms, error = %e, "failed"),
        }
        result
    }
    .instrument(span)
    .await
}

#[cfg(test)]
#[path = "harness_tests.rs"]
mod tests;
