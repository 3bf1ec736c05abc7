// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot request connection handling.
//!
//! A member opens a connection, writes one request and waits for the reply.
//! The tracker takes the first read that returns data as the whole request,
//! so the member may or may not shut down its write half. The tracker
//! answers and closes.

use groupcast::{ProtocolError, Request};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// An accepted connection whose request has been read.
pub struct RequestConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl RequestConnection {
    /// Read one request from `stream`: the first chunk of data, bounded by
    /// `timeout` and `max_size`.
    ///
    /// The connection is returned alongside the decode result so a reply
    /// can still be written for malformed requests.
    pub async fn read_request(
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        timeout: Duration,
        max_size: usize,
    ) -> Result<(Self, Result<Request, ProtocolError>), ConnectionError> {
        // One extra byte tells an oversized request apart from an exact fit.
        let mut buf = vec![0u8; max_size.saturating_add(1)];

        let n = tokio::time::timeout(timeout, stream.read(&mut buf))
            .await
            .map_err(|_| ConnectionError::Timeout(peer_addr))??;

        if n == 0 {
            return Err(ConnectionError::Empty(peer_addr));
        }
        if n > max_size {
            return Err(ConnectionError::TooLarge {
                size: n,
                max: max_size,
            });
        }
        buf.truncate(n);

        let request = std::str::from_utf8(&buf)
            .map_err(|_| ProtocolError::InvalidRequest("request is not UTF-8".into()))
            .and_then(Request::decode);

        Ok((Self { stream, peer_addr }, request))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Write the reply and close the connection.
    pub async fn reply(mut self, reply: &str) -> Result<(), ConnectionError> {
        self.stream.write_all(reply.as_bytes()).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Connection error types.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out reading request from {0}")]
    Timeout(SocketAddr),

    #[error("Connection from {0} closed without a request")]
    Empty(SocketAddr),

    #[error("Request too large: {size} > {max}")]
    TooLarge { size: usize, max: usize },
}
