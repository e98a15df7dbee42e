// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mx-daemon: the coordination server and its wire protocol

pub mod connection;
pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use connection::{Connection, ConnectionState};
pub use lifecycle::{Config, DaemonState, LifecycleError};
pub use protocol::{ErrorKind, ProtocolError, Request, RequestEnvelope, Response, ResponseEnvelope};
pub use server::{CoordinationServer, ServerError};
