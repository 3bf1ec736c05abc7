// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Push notifications to member control listeners.
//!
//! Each notification travels on its own short-lived connection:
//! connect, write, close. There is no acknowledgment and no retry.

use super::state::Notice;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Notification statistics.
#[derive(Debug, Default, Clone)]
pub struct NotifyStats {
    /// Notifications written to a listener.
    pub sent: u64,
    /// Notifications that could not be delivered.
    pub failed: u64,
}

/// Delivers notices one at a time.
pub struct Notifier {
    timeout: Duration,
    stats: NotifyStats,
}

impl Notifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            stats: NotifyStats::default(),
        }
    }

    /// Deliver one notice. The whole exchange is bounded by the timeout.
    pub async fn deliver(&mut self, notice: &Notice) -> Result<(), NotifyError> {
        let addr = notice.target.control_addr();
        let payload = notice.notification.encode();

        let result = match tokio::time::timeout(self.timeout, push(addr, payload.as_bytes())).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(addr)),
        };

        match &result {
            Ok(()) => {
                self.stats.sent += 1;
                debug!("Notified {} at {}: {}", notice.target.username, addr, payload);
            }
            Err(_) => self.stats.failed += 1,
        }
        result
    }

    pub fn stats(&self) -> &NotifyStats {
        &self.stats
    }
}

async fn push(addr: SocketAddr, payload: &[u8]) -> Result<(), NotifyError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| NotifyError::Unreachable(addr, e))?;
    stream.write_all(payload).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Listener {0} unreachable: {1}")]
    Unreachable(SocketAddr, std::io::Error),

    #[error("Timed out notifying {0}")]
    Timeout(SocketAddr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
