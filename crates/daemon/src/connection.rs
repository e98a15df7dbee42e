// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection request handling and lifecycle
//!
//! A `Connection` binds every request to the server-assigned connection id.
//! `lock` requests that have to wait are parked in a task owned by the
//! connection; their reply is pushed onto the outgoing channel once granted.
//! Closing the connection always runs registry cleanup.

use std::sync::Arc;

use mx_core::{Acquire, ConnectionId, DisconnectSummary, MutexRegistry, RegistryError, TryAcquire};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::protocol::{ErrorKind, Request, RequestEnvelope, Response, ResponseEnvelope, PROTOCOL_VERSION};

/// Connection lifecycle: `Connecting → Open → Closing → Closed`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

pub struct Connection {
    id: ConnectionId,
    registry: Arc<MutexRegistry>,
    state: ConnectionState,
    /// Channel to the connection's writer, used for deferred lock grants
    replies: mpsc::UnboundedSender<ResponseEnvelope>,
    /// Suspended `lock` requests
    waits: JoinSet<()>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        registry: Arc<MutexRegistry>,
        replies: mpsc::UnboundedSender<ResponseEnvelope>,
    ) -> Self {
        Self {
            id,
            registry,
            state: ConnectionState::Connecting,
            replies,
            waits: JoinSet::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transport is established; start accepting requests
    pub fn open(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
        }
    }

    /// Stop accepting requests. Cleanup happens in `close`.
    pub fn begin_close(&mut self) {
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            self.state = ConnectionState::Closing;
        }
    }

    /// Handle one request.
    ///
    /// Returns the reply for requests that complete immediately. A `lock` that
    /// has to wait returns `None`; its reply is sent on the replies channel
    /// when granted, and never if the connection closes first.
    pub fn handle(&mut self, envelope: RequestEnvelope) -> Option<ResponseEnvelope> {
        // Reap finished waits
        while self.waits.try_join_next().is_some() {}

        let RequestEnvelope { id, request } = envelope;

        if self.state != ConnectionState::Open {
            return Some(ResponseEnvelope {
                id,
                response: Response::error(
                    ErrorKind::ConnectionClosed,
                    format!("{} is not open", self.id),
                ),
            });
        }

        let response = match request {
            Request::Hello { version } => {
                if version == PROTOCOL_VERSION {
                    Response::Hello {
                        version: PROTOCOL_VERSION.to_string(),
                    }
                } else {
                    Response::error(
                        ErrorKind::BadRequest,
                        format!(
                            "unsupported protocol version {} (server speaks {})",
                            version, PROTOCOL_VERSION
                        ),
                    )
                }
            }

            Request::Ping => Response::Pong,

            Request::Lock { key } => match self.registry.acquire(&key, self.id) {
                Ok(Acquire::Granted) => Response::Ok,
                Ok(Acquire::Queued(grant)) => {
                    let replies = self.replies.clone();
                    let conn = self.id;
                    self.waits.spawn(async move {
                        if grant.granted().await {
                            debug!(%conn, key = %key, "lock granted after wait");
                            let _ = replies.send(ResponseEnvelope {
                                id,
                                response: Response::Ok,
                            });
                        }
                    });
                    return None;
                }
                Err(e) => registry_error(e),
            },

            Request::TryLock { key } => match self.registry.try_acquire(&key, self.id) {
                Ok(TryAcquire::Granted) => Response::TryLock { acquired: true },
                Ok(TryAcquire::Rejected) => Response::TryLock { acquired: false },
                Err(e) => registry_error(e),
            },

            Request::Unlock { key } => match self.registry.release(&key, self.id) {
                Ok(()) => Response::Ok,
                Err(e) => registry_error(e),
            },

            Request::SetValue { key, value } => {
                match self.registry.set_value(&key, self.id, value) {
                    Ok(()) => Response::Ok,
                    Err(e) => registry_error(e),
                }
            }

            Request::GetValue { key } => Response::Value {
                value: self.registry.get_value(&key),
            },
        };

        Some(ResponseEnvelope { id, response })
    }

    /// Enter `Closed`: release held keys, withdraw queued locks, stop waits.
    ///
    /// Runs for graceful closes, transport errors and server shutdown alike.
    pub async fn close(&mut self) -> DisconnectSummary {
        if self.state == ConnectionState::Closed {
            return DisconnectSummary::default();
        }
        self.state = ConnectionState::Closing;

        let summary = self.registry.on_disconnect(self.id);
        self.waits.shutdown().await;

        self.state = ConnectionState::Closed;
        summary
    }
}

fn registry_error(e: RegistryError) -> Response {
    let kind = match e {
        RegistryError::AlreadyHeld(_) => ErrorKind::AlreadyHeld,
        RegistryError::NotHolder(_) => ErrorKind::NotHolder,
    };
    Response::error(kind, e.to_string())
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
