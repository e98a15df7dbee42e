// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection identity

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Server-assigned identity of a client connection.
///
/// Ownership checks in the registry compare these ids; they are never taken
/// from client input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sequential connection id generator
///
/// Clones share the same counter, so one generator can be handed to every
/// accept loop of a server.
#[derive(Clone, Debug)]
pub struct ConnectionIdGen {
    counter: Arc<AtomicU64>,
}

impl ConnectionIdGen {
    pub fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for ConnectionIdGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
