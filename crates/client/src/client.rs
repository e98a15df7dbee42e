// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client connection to the coordination server
//!
//! One `MutexClient` is one server-side connection: every lock it takes is
//! owned by it and released when it is closed or dropped. Requests are
//! multiplexed, so a suspended `lock` does not hold up other calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mx_core::Endpoint;
use mx_daemon::protocol::{
    self, ErrorKind, ProtocolError, Request, RequestEnvelope, Response, ResponseEnvelope,
    PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for requests that never suspend (everything except `lock`)
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("MX_TIMEOUT_IPC_MS").unwrap_or(protocol::DEFAULT_TIMEOUT)
}

/// Timeout for establishing a connection and the version handshake
pub fn timeout_connect() -> Duration {
    parse_duration_ms("MX_TIMEOUT_CONNECT_MS").unwrap_or(protocol::DEFAULT_TIMEOUT)
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {0}: {1}")]
    Connect(Endpoint, std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server speaks protocol {server}, client speaks {client}")]
    VersionMismatch { server: String, client: String },

    #[error("{0}")]
    AlreadyHeld(String),

    #[error("{0}")]
    NotHolder(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("Unexpected response from server")]
    UnexpectedResponse,

    #[error("Value does not match the expected type: {0}")]
    Value(#[from] serde_json::Error),
}

/// Requests awaiting a response, keyed by request id
#[derive(Default)]
struct Pending {
    closed: bool,
    requests: HashMap<u64, oneshot::Sender<Response>>,
}

pub struct MutexClient {
    endpoint: Endpoint,
    writer: tokio::sync::Mutex<BoxedWriter>,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
}

impl MutexClient {
    /// Open a connection and perform the version handshake
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, ClientError> {
        let (reader, writer) = tokio::time::timeout(timeout_connect(), open_stream(endpoint))
            .await
            .map_err(|_| ClientError::Timeout)??;

        let pending = Arc::new(Mutex::new(Pending::default()));
        let reader_task = tokio::spawn(read_responses(reader, Arc::clone(&pending)));

        let client = Self {
            endpoint: endpoint.clone(),
            writer: tokio::sync::Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            reader_task,
        };

        let server = client.hello().await?;
        if server != PROTOCOL_VERSION {
            return Err(ClientError::VersionMismatch {
                server,
                client: PROTOCOL_VERSION.to_string(),
            });
        }

        debug!(endpoint = %client.endpoint, "connected");
        Ok(client)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send a request and wait for its response.
    ///
    /// `timeout` of `None` waits indefinitely (used by `lock`).
    async fn send(
        &self,
        request: Request,
        timeout: Option<Duration>,
    ) -> Result<Response, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending();
            if pending.closed {
                return Err(ClientError::ConnectionClosed);
            }
            pending.requests.insert(id, tx);
        }

        let data = protocol::encode(&RequestEnvelope { id, request })?;
        let written = {
            let mut writer = self.writer.lock().await;
            protocol::write_message(&mut *writer, &data).await
        };
        if let Err(e) = written {
            self.pending().requests.remove(&id);
            return Err(match e {
                ProtocolError::Io(_) | ProtocolError::ConnectionClosed => {
                    ClientError::ConnectionClosed
                }
                other => other.into(),
            });
        }

        let response = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result,
                Err(_) => {
                    self.pending().requests.remove(&id);
                    return Err(ClientError::Timeout);
                }
            },
            None => rx.await,
        };

        match response {
            Ok(Response::Error { kind, message }) => Err(match kind {
                ErrorKind::AlreadyHeld => ClientError::AlreadyHeld(message),
                ErrorKind::NotHolder => ClientError::NotHolder(message),
                ErrorKind::ConnectionClosed => ClientError::ConnectionClosed,
                ErrorKind::BadRequest => ClientError::Rejected(message),
            }),
            Ok(response) => Ok(response),
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Version handshake; returns the server's protocol version
    pub async fn hello(&self) -> Result<String, ClientError> {
        let request = Request::Hello {
            version: PROTOCOL_VERSION.to_string(),
        };
        match self.send(request, Some(timeout_connect())).await? {
            Response::Hello { version } => Ok(version),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send(Request::Ping, Some(timeout_ipc())).await? {
            Response::Pong => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Acquire `key`, waiting behind the current holder.
    ///
    /// There is no timeout; wrap the call in `tokio::time::timeout` and drop
    /// the client to give up a queued request.
    pub async fn lock(&self, key: &str) -> Result<(), ClientError> {
        let request = Request::Lock {
            key: key.to_string(),
        };
        match self.send(request, None).await? {
            Response::Ok => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Acquire `key` if nobody holds it. Returns whether it was acquired.
    ///
    /// On `ClientError::Timeout` the server may still have granted the key to
    /// this connection; close the client rather than retrying on it.
    pub async fn try_lock(&self, key: &str) -> Result<bool, ClientError> {
        let request = Request::TryLock {
            key: key.to_string(),
        };
        match self.send(request, Some(timeout_ipc())).await? {
            Response::TryLock { acquired } => Ok(acquired),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn unlock(&self, key: &str) -> Result<(), ClientError> {
        let request = Request::Unlock {
            key: key.to_string(),
        };
        match self.send(request, Some(timeout_ipc())).await? {
            Response::Ok => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Attach `value` to a key this client holds (`None` clears it)
    pub async fn set_value(&self, key: &str, value: Option<Value>) -> Result<(), ClientError> {
        let request = Request::SetValue {
            key: key.to_string(),
            value,
        };
        match self.send(request, Some(timeout_ipc())).await? {
            Response::Ok => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Value attached to `key` by its current holder
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>, ClientError> {
        let request = Request::GetValue {
            key: key.to_string(),
        };
        match self.send(request, Some(timeout_ipc())).await? {
            Response::Value { value } => Ok(value),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn set_value_as<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ClientError> {
        self.set_value(key, Some(serde_json::to_value(value)?)).await
    }

    pub async fn get_value_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ClientError> {
        match self.get_value(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Close the connection. The server releases everything this client held.
    pub async fn close(self) -> Result<(), ClientError> {
        let result = self.writer.lock().await.shutdown().await;
        self.reader_task.abort();
        match result {
            Ok(()) => Ok(()),
            // Peer already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(ProtocolError::Io(e).into()),
        }
    }
}

impl Drop for MutexClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn open_stream(endpoint: &Endpoint) -> Result<(BoxedReader, BoxedWriter), ClientError> {
    match endpoint {
        Endpoint::Unix(path) => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| ClientError::Connect(endpoint.clone(), e))?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| ClientError::Connect(endpoint.clone(), e))?;
            stream
                .set_nodelay(true)
                .map_err(|e| ClientError::Connect(endpoint.clone(), e))?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
    }
}

/// Route responses to their requests until the connection ends
async fn read_responses(mut reader: BoxedReader, pending: Arc<Mutex<Pending>>) {
    loop {
        let bytes = match protocol::read_message(&mut reader).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::ConnectionClosed) => {
                debug!("server closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read response");
                break;
            }
        };

        let envelope: ResponseEnvelope = match protocol::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed response");
                continue;
            }
        };

        let waiter = pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .requests
            .remove(&envelope.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(envelope.response);
            }
            None => debug!(id = envelope.id, response = ?envelope.response, "unsolicited response"),
        }
    }

    // Fail everything still in flight
    let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
    pending.closed = true;
    pending.requests.clear();
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
