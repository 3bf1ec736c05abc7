// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer sockets: a UDP socket for group messages and a TCP listener for
//! tracker notifications. Both are closed when the transport is dropped.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::debug;

/// Largest datagram or notification accepted.
pub const MAX_PAYLOAD: usize = 4096;

pub struct PeerTransport {
    udp: UdpSocket,
    control: TcpListener,
}

impl PeerTransport {
    /// Bind both sockets on `ip`. Port 0 picks an ephemeral port.
    pub async fn bind(ip: IpAddr, udp_port: u16, tcp_port: u16) -> io::Result<Self> {
        let udp = UdpSocket::bind(SocketAddr::new(ip, udp_port)).await?;
        let control = TcpListener::bind(SocketAddr::new(ip, tcp_port)).await?;
        debug!(
            "Transport bound: udp {}, control {}",
            udp.local_addr()?,
            control.local_addr()?
        );
        Ok(Self { udp, control })
    }

    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn control_addr(&self) -> io::Result<SocketAddr> {
        self.control.local_addr()
    }

    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.udp.send_to(payload, target).await
    }

    /// Receive one datagram. Cancel safe.
    pub async fn recv(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_PAYLOAD];
        let (len, from) = self.udp.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }

    /// Accept the next notification connection. Cancel safe.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.control.accept().await
    }

    /// Accept one notification connection and read it.
    pub async fn accept_notification(&self, timeout: Duration) -> io::Result<String> {
        let (stream, _) = self.accept().await?;
        read_notification(stream, timeout).await
    }
}

/// Read one notification: everything the tracker writes before closing.
pub async fn read_notification(mut stream: TcpStream, timeout: Duration) -> io::Result<String> {
    let mut buf = Vec::with_capacity(256);
    tokio::time::timeout(
        timeout,
        (&mut stream).take(MAX_PAYLOAD as u64).read_to_end(&mut buf),
    )
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "notification read timed out"))??;

    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
