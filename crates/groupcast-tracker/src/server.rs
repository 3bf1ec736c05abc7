// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracker server core implementation.

use crate::config::{ConfigError, TrackerConfig};
use groupcast::control::REPLY_INVALID_REQUEST;
use groupcast::{ProtocolError, Request};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub mod connection;
pub mod directory;
pub mod notifier;
pub mod registry;
pub mod state;

pub use connection::{ConnectionError, RequestConnection};
pub use directory::GroupDirectory;
pub use notifier::{Notifier, NotifyError};
pub use registry::MembershipRegistry;
pub use state::{Notice, Outcome, RequestError, TrackerState};

type ReadResult = Result<(RequestConnection, Result<Request, ProtocolError>), ConnectionError>;

/// Tracker statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackerStats {
    /// Requests decoded and handled.
    pub requests_served: u64,
    /// Connections dropped or answered `invalid request`.
    pub requests_rejected: u64,
    /// Notifications delivered.
    pub notifications_sent: u64,
    /// Notifications that could not be delivered.
    pub notifications_failed: u64,
    /// Members removed because their listener was unreachable.
    pub evictions: u64,
}

/// Rendezvous tracker. Owns all membership state; a single loop services
/// one completed request at a time.
pub struct TrackerServer {
    config: TrackerConfig,
    listener: TcpListener,
    state: TrackerState,
    notifier: Notifier,
    stats: TrackerStats,
    shutdown: Arc<Notify>,
}

impl TrackerServer {
    /// Validate the config and bind the listening socket.
    pub async fn bind(config: TrackerConfig) -> Result<Self, TrackerError> {
        config.validate()?;

        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TrackerError::Bind(addr, e))?;

        Ok(Self {
            notifier: Notifier::new(config.notify_timeout()),
            config,
            listener,
            state: TrackerState::new(),
            stats: TrackerStats::default(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TrackerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops [`run`](Self::run) when notified.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn stats(&self) -> TrackerStats {
        let notify = self.notifier.stats();
        TrackerStats {
            notifications_sent: notify.sent,
            notifications_failed: notify.failed,
            ..self.stats.clone()
        }
    }

    /// Run until the shutdown handle is notified.
    pub async fn run(&mut self) -> Result<(), TrackerError> {
        info!("Tracker listening on {}", self.local_addr()?);

        let timeout = self.config.request_timeout();
        let max_size = self.config.max_request_size;
        let mut reads: JoinSet<ReadResult> = JoinSet::new();
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            debug!("Connection from {}", peer_addr);
                            reads.spawn(RequestConnection::read_request(
                                stream, peer_addr, timeout, max_size,
                            ));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(joined) = reads.join_next() => {
                    match joined {
                        Ok(Ok((conn, request))) => self.service(conn, request).await,
                        Ok(Err(e)) => {
                            warn!("Dropping connection: {}", e);
                            self.stats.requests_rejected += 1;
                        }
                        Err(e) => {
                            error!("Request read task failed: {}", e);
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        reads.shutdown().await;

        let stats = self.stats();
        info!(
            "Tracker stopped: {} requests served, {} rejected, {} notifications sent, {} failed, {} evictions",
            stats.requests_served,
            stats.requests_rejected,
            stats.notifications_sent,
            stats.notifications_failed,
            stats.evictions
        );
        Ok(())
    }

    /// Handle one request: reply, close, then push its notifications.
    async fn service(&mut self, conn: RequestConnection, request: Result<Request, ProtocolError>) {
        let peer_addr = conn.peer_addr();

        let outcome = match request {
            Ok(request) => {
                debug!("Request from {}: {:?}", peer_addr, request);
                self.stats.requests_served += 1;
                self.state.handle(request)
            }
            Err(e) => {
                warn!("Malformed request from {}: {}", peer_addr, e);
                self.stats.requests_rejected += 1;
                Outcome {
                    reply: REPLY_INVALID_REQUEST.to_string(),
                    notices: Vec::new(),
                }
            }
        };

        debug!("Reply to {}: {}", peer_addr, outcome.reply);
        if let Err(e) = conn.reply(&outcome.reply).await {
            warn!("Failed to reply to {}: {}", peer_addr, e);
        }

        self.notify(outcome.notices).await;
    }

    /// Deliver notices in order. An unreachable target is evicted when
    /// enabled, and the resulting notices join the queue.
    async fn notify(&mut self, notices: Vec<Notice>) {
        let mut queue: VecDeque<Notice> = notices.into();

        while let Some(notice) = queue.pop_front() {
            let Err(e) = self.notifier.deliver(&notice).await else {
                continue;
            };
            warn!(
                "Notification to {} ({}) failed: {}",
                notice.target.username, notice.target.id, e
            );

            let target = notice.target.id;
            if self.config.evict_unreachable && self.state.registry().get(target).is_some() {
                self.stats.evictions += 1;
                queue.retain(|n| n.target.id != target);
                queue.extend(self.state.evict(target));
            }
        }
    }
}

/// Tracker error types.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
