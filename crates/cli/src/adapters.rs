// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness collaborators shipped with the CLI

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::harness::{Backend, BoxError, ConnectionDescriptor, Database, Execution, Report, TestExecutor};

/// Database that does nothing.
///
/// Used when the backend manages its own storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDatabase;

#[async_trait]
impl Database for NoopDatabase {
    async fn reset(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn seed(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Backend that does nothing; the service under test is started elsewhere
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBackend;

#[async_trait]
impl Backend for NoopBackend {
    async fn open(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Runs a shell command once per feature file.
///
/// The feature path and connection details are passed through the
/// environment (`MX_TEST_FEATURE`, `MX_TEST_HOST`, `MX_TEST_ENCRYPTION`,
/// `MX_MODE`). A non-zero exit marks the feature as failed.
#[derive(Clone, Debug)]
pub struct CommandExecutor {
    command: String,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    async fn run_feature(
        &self,
        feature: &Path,
        connection: &ConnectionDescriptor,
    ) -> Result<Execution, BoxError> {
        let name = feature
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| feature.display().to_string());

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env("MX_TEST_FEATURE", feature)
            .env("MX_TEST_HOST", &connection.host);
        if let Some(encryption) = &connection.encryption {
            cmd.env("MX_TEST_ENCRYPTION", encryption);
        }
        if let Some(mode) = &connection.mode {
            cmd.env("MX_MODE", mode);
        }

        let output = cmd.output().await?;
        debug!(feature = %name, status = %output.status, "feature finished");

        let error = if output.status.success() {
            None
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            Some(if detail.is_empty() {
                format!("{}: {}", name, output.status)
            } else {
                format!("{}: {}", name, detail)
            })
        };

        Ok(Execution { name, error })
    }
}

#[async_trait]
impl TestExecutor for CommandExecutor {
    async fn run(&self, dir: &Path, connection: &ConnectionDescriptor) -> Result<Report, BoxError> {
        let features = list_features(dir)?;
        info!(dir = %dir.display(), count = features.len(), "running features");

        let mut report = Report::default();
        for feature in features {
            report
                .executions
                .push(self.run_feature(&feature, connection).await?);
        }
        Ok(report)
    }
}

/// Files directly inside `dir`, sorted by name
fn list_features(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut features = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            features.push(path);
        }
    }
    features.sort();
    Ok(features)
}

#[cfg(test)]
#[path = "adapters_tests.rs"]
mod tests;
