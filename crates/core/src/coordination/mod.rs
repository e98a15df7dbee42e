// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination primitives for exclusive access to named resources
//!
//! This module provides:
//! - **LockState** - Holder, FIFO waiters and attached value for one key
//! - **MutexRegistry** - Thread-safe map of keys to lock state, with
//!   connection-scoped cleanup

pub mod lock;
pub mod registry;

pub use lock::{Grant, LockMode, LockState};
pub use registry::{Acquire, DisconnectSummary, MutexRegistry, RegistryError, TryAcquire};
