// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key lock state: exclusive holder, FIFO waiters, attached value
//!
//! `LockState` carries no synchronization of its own; the registry owns every
//! instance behind a single critical section.

use crate::id::ConnectionId;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Lock mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Unlocked,
    Exclusive,
}

/// A queued acquisition, completed by sending on `notify`
#[derive(Debug)]
struct Waiter {
    conn: ConnectionId,
    notify: oneshot::Sender<()>,
}

/// Handle for a queued acquisition.
///
/// Resolves once the waiter has been promoted to holder. If the waiter is
/// removed without a grant (its connection closed) the handle resolves to
/// `false`.
#[derive(Debug)]
pub struct Grant {
    rx: oneshot::Receiver<()>,
}

impl Grant {
    /// Wait until granted. Returns `false` if the wait was cancelled.
    pub async fn granted(self) -> bool {
        self.rx.await.is_ok()
    }

    /// Non-blocking check: `None` while still queued
    pub fn try_granted(&mut self) -> Option<bool> {
        match self.rx.try_recv() {
            Ok(()) => Some(true),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(false),
        }
    }
}

/// State of one named resource
#[derive(Debug, Default)]
pub struct LockState {
    holder: Option<ConnectionId>,
    waiters: VecDeque<Waiter>,
    value: Option<Value>,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> LockMode {
        match self.holder {
            Some(_) => LockMode::Exclusive,
            None => LockMode::Unlocked,
        }
    }

    pub fn holder(&self) -> Option<ConnectionId> {
        self.holder
    }

    pub fn is_held_by(&self, conn: ConnectionId) -> bool {
        self.holder == Some(conn)
    }

    pub fn is_waiting(&self, conn: ConnectionId) -> bool {
        self.waiters.iter().any(|w| w.conn == conn)
    }

    /// Waiting connections in grant order
    pub fn waiters(&self) -> Vec<ConnectionId> {
        self.waiters.iter().map(|w| w.conn).collect()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// True when the entry carries no holder, waiter or value and can be dropped
    pub fn is_vacant(&self) -> bool {
        self.holder.is_none() && self.waiters.is_empty() && self.value.is_none()
    }

    /// Take ownership of a free lock. Caller checks `mode()` first.
    pub(crate) fn grant(&mut self, conn: ConnectionId) {
        debug_assert!(self.holder.is_none());
        self.holder = Some(conn);
    }

    /// Append a waiter at the back of the queue
    pub(crate) fn enqueue(&mut self, conn: ConnectionId) -> Grant {
        let (notify, rx) = oneshot::channel();
        self.waiters.push_back(Waiter { conn, notify });
        Grant { rx }
    }

    pub(crate) fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }

    /// Release the current holder and promote the next live waiter.
    ///
    /// The value is cleared with the outgoing holder. Waiters whose `Grant`
    /// was dropped are skipped. Returns the new holder, if any.
    pub(crate) fn hand_off(&mut self) -> Option<ConnectionId> {
        self.holder = None;
        self.value = None;

        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.notify.send(()).is_ok() {
                self.holder = Some(waiter.conn);
                return Some(waiter.conn);
            }
        }
        None
    }

    /// Drop every queued request from `conn` without granting. Returns how many were removed.
    pub(crate) fn remove_waiter(&mut self, conn: ConnectionId) -> usize {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.conn != conn);
        before - self.waiters.len()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
