// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mx-client: connect to the coordination server, take locks, elect a master

pub mod client;
pub mod election;

pub use client::{timeout_connect, timeout_ipc, ClientError, MutexClient};
pub use election::{campaign, elect, locate, Election, UPDATE_MASTER_KEY};
