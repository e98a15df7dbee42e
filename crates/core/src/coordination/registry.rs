// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutex registry: authoritative map of resource keys to lock state
//!
//! Every mutation runs inside one critical section, so waiter promotion is
//! exact FIFO and `get_value` never observes a half-finished release. The
//! registry is an owned value; servers receive it as `Arc<MutexRegistry>`.

use super::lock::{Grant, LockMode, LockState};
use crate::id::ConnectionId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Protocol misuse by a client. Never affects other keys or clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection already holds or is waiting for '{0}'")]
    AlreadyHeld(String),

    #[error("connection does not hold '{0}'")]
    NotHolder(String),
}

/// Outcome of a blocking acquisition
#[derive(Debug)]
pub enum Acquire {
    Granted,
    /// Queued behind the current holder; the grant arrives asynchronously
    Queued(Grant),
}

/// Outcome of a non-blocking acquisition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TryAcquire {
    Granted,
    Rejected,
}

/// What `on_disconnect` cleaned up
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisconnectSummary {
    /// Keys the connection held, each handed to its next waiter or unlocked
    pub released: Vec<String>,
    /// Number of queued acquisitions dropped without a grant
    pub cancelled: usize,
}

#[derive(Debug, Default)]
pub struct MutexRegistry {
    locks: Mutex<HashMap<String, LockState>>,
}

impl MutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, LockState>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire `key` for `conn`, queueing behind the current holder if needed.
    pub fn acquire(&self, key: &str, conn: ConnectionId) -> Result<Acquire, RegistryError> {
        let mut locks = self.locks();
        let lock = locks.entry(key.to_string()).or_default();

        if lock.is_held_by(conn) || lock.is_waiting(conn) {
            return Err(RegistryError::AlreadyHeld(key.to_string()));
        }

        match lock.mode() {
            LockMode::Unlocked => {
                lock.grant(conn);
                debug!(key, %conn, "lock granted");
                Ok(Acquire::Granted)
            }
            LockMode::Exclusive => {
                let grant = lock.enqueue(conn);
                debug!(key, %conn, queued = lock.waiters().len(), "lock queued");
                Ok(Acquire::Queued(grant))
            }
        }
    }

    /// Acquire `key` only if it is free right now.
    pub fn try_acquire(&self, key: &str, conn: ConnectionId) -> Result<TryAcquire, RegistryError> {
        let mut locks = self.locks();

        match locks.get_mut(key) {
            Some(lock) if lock.is_held_by(conn) || lock.is_waiting(conn) => {
                Err(RegistryError::AlreadyHeld(key.to_string()))
            }
            Some(lock) if lock.mode() == LockMode::Exclusive => Ok(TryAcquire::Rejected),
            Some(lock) => {
                lock.grant(conn);
                debug!(key, %conn, "lock granted");
                Ok(TryAcquire::Granted)
            }
            None => {
                let mut lock = LockState::new();
                lock.grant(conn);
                locks.insert(key.to_string(), lock);
                debug!(key, %conn, "lock granted");
                Ok(TryAcquire::Granted)
            }
        }
    }

    /// Release `key`. Clears its value and promotes the next waiter.
    pub fn release(&self, key: &str, conn: ConnectionId) -> Result<(), RegistryError> {
        let mut locks = self.locks();

        let Some(lock) = locks.get_mut(key).filter(|l| l.is_held_by(conn)) else {
            return Err(RegistryError::NotHolder(key.to_string()));
        };

        match lock.hand_off() {
            Some(next) => debug!(key, from = %conn, to = %next, "lock handed off"),
            None => debug!(key, %conn, "lock released"),
        }

        if lock.is_vacant() {
            locks.remove(key);
        }
        Ok(())
    }

    /// Attach `value` to `key`. Only the current holder may do this.
    pub fn set_value(
        &self,
        key: &str,
        conn: ConnectionId,
        value: Option<Value>,
    ) -> Result<(), RegistryError> {
        let mut locks = self.locks();

        match locks.get_mut(key).filter(|l| l.is_held_by(conn)) {
            Some(lock) => {
                lock.set_value(value);
                Ok(())
            }
            None => Err(RegistryError::NotHolder(key.to_string())),
        }
    }

    /// Value attached by the current holder, readable by anyone
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.locks().get(key).and_then(|l| l.value().cloned())
    }

    /// Release everything `conn` holds and withdraw everything it waits for.
    pub fn on_disconnect(&self, conn: ConnectionId) -> DisconnectSummary {
        let mut locks = self.locks();
        let mut summary = DisconnectSummary::default();

        for (key, lock) in locks.iter_mut() {
            summary.cancelled += lock.remove_waiter(conn);

            if lock.is_held_by(conn) {
                if let Some(next) = lock.hand_off() {
                    debug!(key = key.as_str(), from = %conn, to = %next, "lock handed off on disconnect");
                }
                summary.released.push(key.clone());
            }
        }

        locks.retain(|_, lock| !lock.is_vacant());
        summary.released.sort();
        summary
    }

    pub fn mode(&self, key: &str) -> LockMode {
        self.locks()
            .get(key)
            .map_or(LockMode::Unlocked, |l| l.mode())
    }

    pub fn holder(&self, key: &str) -> Option<ConnectionId> {
        self.locks().get(key).and_then(|l| l.holder())
    }

    /// Queued connections for `key`, in grant order
    pub fn waiters(&self, key: &str) -> Vec<ConnectionId> {
        self.locks()
            .get(key)
            .map(|l| l.waiters())
            .unwrap_or_default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.locks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
