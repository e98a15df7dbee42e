// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listen/connect addresses for the coordination server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Where a coordination server listens and clients connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket at a filesystem path
    Unix(PathBuf),
    /// TCP socket address
    Tcp(SocketAddr),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("empty endpoint")]
    Empty,

    #[error("invalid tcp address '{0}'")]
    InvalidTcp(String),
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Accepts `tcp://host:port`, `unix:///path`, a bare `ip:port`, or a bare path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EndpointError::Empty);
        }

        if let Some(addr) = s.strip_prefix("tcp://") {
            return addr
                .parse()
                .map(Endpoint::Tcp)
                .map_err(|_| EndpointError::InvalidTcp(addr.to_string()));
        }

        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(EndpointError::Empty);
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        match s.parse::<SocketAddr>() {
            Ok(addr) => Ok(Endpoint::Tcp(addr)),
            Err(_) => Ok(Endpoint::Unix(PathBuf::from(s))),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
