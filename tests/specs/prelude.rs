//! Shared fixtures for the behavioral specs

#![allow(dead_code)]

pub use mx_client::{campaign, elect, locate, ClientError, Election, MutexClient, UPDATE_MASTER_KEY};
pub use mx_core::{Endpoint, MutexRegistry};
pub use mx_daemon::CoordinationServer;
pub use serde_json::json;
pub use std::sync::Arc;
pub use std::time::Duration;

use tempfile::TempDir;

/// A coordination server on a temporary Unix socket
pub struct Cluster {
    _dir: TempDir,
    pub server: CoordinationServer,
    pub endpoint: Endpoint,
}

impl Cluster {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut server = CoordinationServer::new(
            Arc::new(MutexRegistry::new()),
            Endpoint::Unix(dir.path().join("mx.sock")),
        );
        let endpoint = server.open().await.unwrap();
        Self {
            _dir: dir,
            server,
            endpoint,
        }
    }

    /// Connect a new worker
    pub async fn worker(&self) -> MutexClient {
        MutexClient::connect(&self.endpoint).await.unwrap()
    }

    pub fn registry(&self) -> &MutexRegistry {
        self.server.registry()
    }

    pub async fn stop(mut self) {
        self.server.close().await.unwrap();
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}
