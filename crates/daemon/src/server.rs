// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination server: socket listener and connection handling.

use std::path::Path;
use std::sync::Arc;

use mx_core::{ConnectionId, ConnectionIdGen, Endpoint, MutexRegistry};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::protocol::{
    self, ErrorKind, ProtocolError, RequestEnvelope, Response, ResponseEnvelope, DEFAULT_TIMEOUT,
};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server is already open on {0}")]
    AlreadyOpen(Endpoint),

    #[error("Failed to bind {0}: {1}")]
    Bind(Endpoint, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves a `MutexRegistry` to clients over Unix or TCP sockets.
///
/// Lock ownership is bound to connections: when a connection ends, for any
/// reason, everything it held is released and everything it waited for is
/// withdrawn.
pub struct CoordinationServer {
    registry: Arc<MutexRegistry>,
    endpoint: Endpoint,
    ids: ConnectionIdGen,
    running: Option<Running>,
}

struct Running {
    local: Endpoint,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl CoordinationServer {
    pub fn new(registry: Arc<MutexRegistry>, endpoint: Endpoint) -> Self {
        Self {
            registry,
            endpoint,
            ids: ConnectionIdGen::new(),
            running: None,
        }
    }

    pub fn registry(&self) -> &Arc<MutexRegistry> {
        &self.registry
    }

    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound (TCP port 0 resolved), while open
    pub fn local_endpoint(&self) -> Option<&Endpoint> {
        self.running.as_ref().map(|r| &r.local)
    }

    /// Bind the listener and start accepting connections.
    pub async fn open(&mut self) -> Result<Endpoint, ServerError> {
        if let Some(running) = &self.running {
            return Err(ServerError::AlreadyOpen(running.local.clone()));
        }

        let (listener, local) = Listener::bind(&self.endpoint).await?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            self.ids.clone(),
            shutdown_rx,
        ));

        info!(endpoint = %local, "coordination server listening");
        self.running = Some(Running {
            local: local.clone(),
            shutdown,
            accept_task,
        });
        Ok(local)
    }

    /// Stop accepting, terminate every connection and release the socket.
    ///
    /// A no-op when the server is not open.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        info!(endpoint = %running.local, "closing coordination server");
        let _ = running.shutdown.send(true);
        if let Err(e) = running.accept_task.await {
            error!("Accept loop failed: {}", e);
        }

        if let Endpoint::Unix(path) = &running.local {
            remove_socket(path)?;
        }

        info!("coordination server closed");
        Ok(())
    }
}

enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    async fn bind(endpoint: &Endpoint) -> Result<(Self, Endpoint), ServerError> {
        match endpoint {
            Endpoint::Unix(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                ensure_socket_free(endpoint, path).await?;
                let listener = UnixListener::bind(path)
                    .map_err(|e| ServerError::Bind(endpoint.clone(), e))?;
                Ok((Listener::Unix(listener), endpoint.clone()))
            }
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|e| ServerError::Bind(endpoint.clone(), e))?;
                let local = listener.local_addr()?;
                Ok((Listener::Tcp(listener), Endpoint::Tcp(local)))
            }
        }
    }

    async fn accept(&self) -> std::io::Result<(BoxedReader, BoxedWriter)> {
        match self {
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                debug!(%peer, "tcp connection");
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }
}

/// Refuse a path another server is listening on; clear a stale socket left by a previous run
async fn ensure_socket_free(endpoint: &Endpoint, path: &Path) -> Result<(), ServerError> {
    match UnixStream::connect(path).await {
        Ok(_) => Err(ServerError::Bind(
            endpoint.clone(),
            std::io::ErrorKind::AddrInUse.into(),
        )),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            ) =>
        {
            remove_socket(path)?;
            Ok(())
        }
        Err(e) => Err(ServerError::Bind(endpoint.clone(), e)),
    }
}

fn remove_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn accept_loop(
    listener: Listener,
    registry: Arc<MutexRegistry>,
    ids: ConnectionIdGen,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            result = listener.accept() => {
                match result {
                    Ok((reader, writer)) => {
                        let id = ids.next();
                        info!(conn = %id, "connection opened");
                        connections.spawn(handle_connection(
                            id,
                            reader,
                            writer,
                            Arc::clone(&registry),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            Some(result) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = result {
                    error!("Connection task failed: {}", e);
                }
            }
        }
    }

    // Stop accepting before tearing down live connections
    drop(listener);
    while let Some(result) = connections.join_next().await {
        if let Err(e) = result {
            error!("Connection task failed: {}", e);
        }
    }
}

/// Serve one client until it disconnects or the server shuts down
async fn handle_connection(
    id: ConnectionId,
    mut reader: BoxedReader,
    writer: BoxedWriter,
    registry: Arc<MutexRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (replies, outgoing) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_replies(id, writer, outgoing));

    let mut conn = Connection::new(id, registry, replies.clone());
    conn.open();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(conn = %id, "server shutting down connection");
                break;
            }

            frame = protocol::read_message(&mut reader) => {
                let bytes = match frame {
                    Ok(bytes) => bytes,
                    Err(ProtocolError::ConnectionClosed) => {
                        debug!(conn = %id, "client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(conn = %id, error = %e, "failed to read request");
                        break;
                    }
                };

                let reply = match protocol::decode::<RequestEnvelope>(&bytes) {
                    Ok(envelope) => {
                        debug!(conn = %id, request_id = envelope.id, request = ?envelope.request, "received request");
                        conn.handle(envelope)
                    }
                    Err(e) => {
                        warn!(conn = %id, error = %e, "malformed request");
                        Some(ResponseEnvelope {
                            id: 0,
                            response: Response::error(ErrorKind::BadRequest, e.to_string()),
                        })
                    }
                };

                if let Some(reply) = reply {
                    if replies.send(reply).is_err() {
                        // Writer is gone; the transport is unusable
                        break;
                    }
                }
            }
        }
    }

    conn.begin_close();
    let summary = conn.close().await;
    info!(
        conn = %id,
        released = summary.released.len(),
        cancelled = summary.cancelled,
        "connection closed"
    );

    // Writer drains queued replies, then exits once every sender is gone
    drop(conn);
    drop(replies);
    if let Err(e) = writer_task.await {
        error!(conn = %id, "Writer task failed: {}", e);
    }
}

async fn write_replies(
    id: ConnectionId,
    mut writer: BoxedWriter,
    mut outgoing: mpsc::UnboundedReceiver<ResponseEnvelope>,
) {
    while let Some(reply) = outgoing.recv().await {
        debug!(conn = %id, request_id = reply.id, response = ?reply.response, "sending response");
        if let Err(e) = protocol::write_response(&mut writer, &reply, DEFAULT_TIMEOUT).await {
            warn!(conn = %id, error = %e, "failed to write response");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
