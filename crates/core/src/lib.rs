// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mx-core: shared building blocks for the mx coordination service
//!
//! This crate provides:
//! - The mutex registry (exclusive locks with FIFO waiters and attached values)
//! - Connection identities
//! - Server endpoints

pub mod coordination;
pub mod endpoint;
pub mod id;

pub use coordination::{
    Acquire, DisconnectSummary, Grant, LockMode, LockState, MutexRegistry, RegistryError,
    TryAcquire,
};
pub use endpoint::{Endpoint, EndpointError};
pub use id::{ConnectionId, ConnectionIdGen};
