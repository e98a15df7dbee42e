// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master election over a well-known key
//!
//! Workers race `try_lock` on the key. The winner publishes a handle (how to
//! reach it) as the key's value and keeps the lock for as long as its client
//! stays connected. Everyone else reads the handle to find the master.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::client::{ClientError, MutexClient};

/// Key contended by update workers
pub const UPDATE_MASTER_KEY: &str = "update-master";

/// Outcome of an election attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Election {
    /// This client holds the key and has published its handle
    Master,
    /// Another connection holds the key
    Follower,
}

impl Election {
    pub fn is_master(self) -> bool {
        self == Election::Master
    }
}

/// Try once to become master of `key`, publishing `handle` on success.
pub async fn elect<T: Serialize>(
    client: &MutexClient,
    key: &str,
    handle: &T,
) -> Result<Election, ClientError> {
    if !client.try_lock(key).await? {
        return Ok(Election::Follower);
    }

    client.set_value_as(key, handle).await?;
    info!(key, endpoint = %client.endpoint(), "elected master");
    Ok(Election::Master)
}

/// Wait until `key` is free, take it and publish `handle`.
///
/// For followers that should take over when the current master goes away.
pub async fn campaign<T: Serialize>(
    client: &MutexClient,
    key: &str,
    handle: &T,
) -> Result<(), ClientError> {
    client.lock(key).await?;
    client.set_value_as(key, handle).await?;
    info!(key, endpoint = %client.endpoint(), "took over as master");
    Ok(())
}

/// Handle published by the current master, `None` if there is no master
pub async fn locate<T: DeserializeOwned>(
    client: &MutexClient,
    key: &str,
) -> Result<Option<T>, ClientError> {
    client.get_value_as(key).await
}

#[cfg(test)]
#[path = "election_tests.rs"]
mod tests;
