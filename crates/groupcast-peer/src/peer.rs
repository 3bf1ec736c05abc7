// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer event loop.
//!
//! A [`Peer`] owns its sockets, its control client, its local group view,
//! its ordering engine and its metrics. Everything is mutated from one task:
//! each iteration waits for exactly one ready source (datagram, tracker
//! notification, idle tick, command, shutdown) and services it to
//! completion before waiting again.

use crate::command::{Command, CommandError};
use crate::config::{ConfigError, PeerConfig};
use crate::control::{ControlClient, ControlError};
use crate::transport::{read_notification, PeerTransport};
use groupcast::{
    validate_username, LocalGroupView, Member, Message, Metrics, MetricsReport, Notification,
    OrderingEngine, OrderingError, ProtocolError, ViewChange, ViewError,
};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Peer error types.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    View(#[from] ViewError),

    #[error("{0}")]
    Command(#[from] CommandError),

    #[error("Not registered with the tracker")]
    NotRegistered,

    #[error("No group selected, use !w <group> to choose one")]
    NoGroupSelected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PeerError {
    /// Fatal errors end the peer; the others are reported and the loop goes on.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Control(e) => matches!(
                e,
                ControlError::Timeout(_) | ControlError::Io(_) | ControlError::Protocol(_)
            ),
            Self::Protocol(_) | Self::Io(_) | Self::Config(_) => true,
            Self::View(_) | Self::Command(_) | Self::NotRegistered | Self::NoGroupSelected => {
                false
            }
        }
    }
}

/// What one serviced source produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A datagram went through the ordering engine. `delivered` is empty
    /// when it was held.
    Datagram { delivered: Vec<Message> },
    /// A datagram was dropped (undecodable or stale).
    Discarded { reason: String },
    /// A tracker notification was applied to the local view.
    Membership(ViewChange),
    /// Idle tick. Total order may have flushed its buffer.
    Idle { delivered: Vec<Message> },
}

impl PeerEvent {
    /// Messages handed to the application by this event.
    pub fn delivered(&self) -> &[Message] {
        match self {
            Self::Datagram { delivered } | Self::Idle { delivered } => delivered,
            _ => &[],
        }
    }
}

/// Result of a user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Groups(Vec<String>),
    Members { group: String, usernames: Vec<String> },
    Joined { group: String, members: Vec<Member> },
    Left { group: String, was_member: bool },
    Selected(String),
    Sent { message: Message, datagrams: usize },
    Quit,
}

/// Presentation side of [`Peer::run`].
pub trait Console {
    fn event(&mut self, event: &PeerEvent);
    fn reply(&mut self, reply: &Reply);
    fn error(&mut self, error: &PeerError);
    fn report(&mut self, report: &MetricsReport);
}

/// Source found ready by [`Peer::wait_ready`].
enum Ready {
    Datagram(Vec<u8>, SocketAddr),
    Notification(TcpStream),
    Tick,
}

pub struct Peer {
    config: PeerConfig,
    transport: PeerTransport,
    control: ControlClient,
    member: Option<Member>,
    view: LocalGroupView,
    engine: OrderingEngine,
    metrics: Metrics,
    idle: Interval,
}

impl Peer {
    /// Validate the config and bind the data and control sockets.
    pub async fn bind(config: PeerConfig) -> Result<Self, PeerError> {
        config.validate()?;

        let transport = PeerTransport::bind(config.ip, config.udp_port, config.tcp_port).await?;
        let control = ControlClient::new(config.tracker, config.request_timeout());
        let engine = OrderingEngine::new(config.ordering, config.buffer_capacity, config.warmup());

        let mut idle = tokio::time::interval(config.flush_interval());
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            config,
            transport,
            control,
            member: None,
            view: LocalGroupView::new(),
            engine,
            metrics: Metrics::new(),
            idle,
        })
    }

    pub fn member(&self) -> Option<&Member> {
        self.member.as_ref()
    }

    pub fn view(&self) -> &LocalGroupView {
        &self.view
    }

    pub fn engine(&self) -> &OrderingEngine {
        &self.engine
    }

    pub fn transport(&self) -> &PeerTransport {
        &self.transport
    }

    pub fn report(&self) -> MetricsReport {
        self.metrics.report(self.engine.evicted())
    }

    /// Register with the tracker under `username`.
    pub async fn register(&mut self, username: &str) -> Result<&Member, PeerError> {
        validate_username(username)?;

        let ip = self.config.ip;
        let udp_port = self.transport.udp_addr()?.port();
        let tcp_port = self.transport.control_addr()?.port();
        let id = self
            .control
            .register(ip, udp_port, tcp_port, username)
            .await?;

        info!("Registered as {} ({})", username, id);
        Ok(&*self
            .member
            .insert(Member::new(id, username, ip, udp_port, tcp_port)))
    }

    fn registered(&self) -> Result<&Member, PeerError> {
        self.member.as_ref().ok_or(PeerError::NotRegistered)
    }

    pub async fn execute(&mut self, command: Command) -> Result<Reply, PeerError> {
        match command {
            Command::ListGroups => self.list_groups().await,
            Command::ListMembers(group) => self.list_members(&group).await,
            Command::Join(group) => self.join(&group).await,
            Command::Leave(group) => self.leave(&group).await,
            Command::Select(group) => self.select(&group),
            Command::Send(content) => self.send(&content).await,
            Command::Quit => self.quit().await,
        }
    }

    pub async fn list_groups(&mut self) -> Result<Reply, PeerError> {
        let id = self.registered()?.id;
        Ok(Reply::Groups(self.control.list_groups(id).await?))
    }

    pub async fn list_members(&mut self, group: &str) -> Result<Reply, PeerError> {
        let id = self.registered()?.id;
        let usernames = self.control.list_members(id, group).await?;
        Ok(Reply::Members {
            group: group.to_string(),
            usernames,
        })
    }

    pub async fn join(&mut self, group: &str) -> Result<Reply, PeerError> {
        let id = self.registered()?.id;
        let members = self.control.join(id, group).await?;
        self.view.on_joined(group, members.clone());
        info!("Joined {} ({} members)", group, members.len());
        Ok(Reply::Joined {
            group: group.to_string(),
            members,
        })
    }

    pub async fn leave(&mut self, group: &str) -> Result<Reply, PeerError> {
        let id = self.registered()?.id;
        self.control.leave(id, group).await?;
        let was_member = self.view.on_left(group);
        self.engine.on_left(group);
        info!("Left {}", group);
        Ok(Reply::Left {
            group: group.to_string(),
            was_member,
        })
    }

    pub fn select(&mut self, group: &str) -> Result<Reply, PeerError> {
        self.view.select(group)?;
        Ok(Reply::Selected(group.to_string()))
    }

    /// Multicast `content` to every member of the selected group, self
    /// included. Best effort: a failed datagram is logged, not retried.
    pub async fn send(&mut self, content: &str) -> Result<Reply, PeerError> {
        let username = self.registered()?.username.clone();
        let group = self.view.selected().ok_or(PeerError::NoGroupSelected)?;

        let sequence = self.engine.next_sequence(group.name());
        let message = Message::new(content, group.name(), username, sequence);
        let payload = message.encode();

        let mut datagrams = 0;
        for member in group.members() {
            match self.transport.send_to(&payload, member.udp_addr()).await {
                Ok(_) => datagrams += 1,
                Err(e) => warn!("Send to {} failed: {}", member.username, e),
            }
        }
        debug!(
            "Sent {} seq {} to {} members",
            message.group_name, sequence, datagrams
        );

        self.metrics
            .record_sent(message.id(), datagrams, Instant::now());
        Ok(Reply::Sent { message, datagrams })
    }

    pub async fn quit(&mut self) -> Result<Reply, PeerError> {
        let id = self.registered()?.id;
        self.control.quit(id).await?;
        self.member = None;
        info!("Quit");
        Ok(Reply::Quit)
    }

    /// Wait for one ready source and service it.
    pub async fn step(&mut self) -> Result<PeerEvent, PeerError> {
        let ready = self.wait_ready().await?;
        self.service(ready).await
    }

    /// Cancel safe: only awaits readiness, consumes nothing it cannot return.
    /// Input sources are polled ahead of the idle tick, so a tick only wins
    /// when no datagram or notification is ready.
    async fn wait_ready(&mut self) -> Result<Ready, PeerError> {
        tokio::select! {
            biased;

            received = self.transport.recv() => {
                let (payload, from) = received?;
                Ok(Ready::Datagram(payload, from))
            }
            accepted = self.transport.accept() => {
                let (stream, _) = accepted?;
                Ok(Ready::Notification(stream))
            }
            _ = self.idle.tick() => Ok(Ready::Tick),
        }
    }

    async fn service(&mut self, ready: Ready) -> Result<PeerEvent, PeerError> {
        match ready {
            Ready::Datagram(payload, from) => Ok(self.on_datagram(&payload, from)),
            Ready::Notification(stream) => {
                match read_notification(stream, self.config.request_timeout()).await {
                    Ok(raw) => self.on_notification(&raw),
                    Err(e) => {
                        warn!("Failed to read notification: {}", e);
                        Ok(PeerEvent::Membership(ViewChange::Unchanged))
                    }
                }
            }
            Ready::Tick => {
                let mut delivered = Vec::new();
                let flushed = self.engine.on_idle(Instant::now(), &mut delivered);
                if flushed > 0 {
                    debug!("Idle flush delivered {} messages", flushed);
                }
                self.record_delivered(&delivered);
                Ok(PeerEvent::Idle { delivered })
            }
        }
    }

    fn on_datagram(&mut self, payload: &[u8], from: SocketAddr) -> PeerEvent {
        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping datagram from {}: {}", from, e);
                return PeerEvent::Discarded {
                    reason: e.to_string(),
                };
            }
        };

        let mut delivered = Vec::new();
        match self.engine.on_receive(message, &mut delivered) {
            Ok(_) => {
                self.record_delivered(&delivered);
                PeerEvent::Datagram { delivered }
            }
            Err(e @ OrderingError::Stale { .. }) => {
                debug!("{}", e);
                self.metrics.record_stale();
                PeerEvent::Discarded {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn on_notification(&mut self, raw: &str) -> Result<PeerEvent, PeerError> {
        let notification = Notification::decode(raw).map_err(|e| {
            error!("Malformed notification {:?}: {}", raw, e);
            e
        })?;
        debug!("Notification: {:?}", notification);

        let change = self.view.apply(&notification);
        match &change {
            ViewChange::Added { group, member } => {
                info!("{} joined {}", member.username, group);
            }
            ViewChange::Removed { group, member } => {
                info!("{} left {}", member.username, group);
                let dropped = self.engine.forget_sender(&member.username, group);
                if dropped > 0 {
                    debug!("Dropped {} held messages from {}", dropped, member.username);
                }
            }
            ViewChange::Unchanged => {}
        }
        Ok(PeerEvent::Membership(change))
    }

    fn record_delivered(&mut self, delivered: &[Message]) {
        let now = Instant::now();
        for message in delivered {
            self.metrics.record_delivered(&message.id(), now);
        }
    }

    /// Run until `!q`, end of input, shutdown, or a fatal error. The metrics
    /// report goes to `console` on every exit path.
    pub async fn run<C, F>(
        &mut self,
        mut lines: mpsc::Receiver<String>,
        shutdown: F,
        console: &mut C,
    ) -> Result<MetricsReport, PeerError>
    where
        C: Console,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        info!("Input closed, leaving");
                        break self.leave_tracker().await;
                    };
                    match self.handle_line(&line).await {
                        Ok(Reply::Quit) => {
                            console.reply(&Reply::Quit);
                            break Ok(());
                        }
                        Ok(reply) => console.reply(&reply),
                        Err(e) if e.is_fatal() => break Err(e),
                        Err(e) => console.error(&e),
                    }
                }
                ready = self.wait_ready() => {
                    let event = match ready {
                        Ok(ready) => self.service(ready).await,
                        Err(e) => Err(e),
                    };
                    match event {
                        Ok(event) => console.event(&event),
                        Err(e) if e.is_fatal() => break Err(e),
                        Err(e) => console.error(&e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break self.leave_tracker().await;
                }
            }
        };

        if let Err(e) = &result {
            error!("Peer stopped: {}", e);
        }
        let report = self.report();
        console.report(&report);
        result.map(|_| report)
    }

    async fn handle_line(&mut self, line: &str) -> Result<Reply, PeerError> {
        let command: Command = line.parse()?;
        self.execute(command).await
    }

    /// Best-effort quit on the way out.
    async fn leave_tracker(&mut self) -> Result<(), PeerError> {
        if self.member.is_some() {
            self.quit().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupcast::{MemberId, OrderingMode};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    async fn peer(ordering: OrderingMode) -> Peer {
        let config = PeerConfig {
            ordering,
            warmup_ms: 0,
            ..Default::default()
        };
        Peer::bind(config).await.unwrap()
    }

    fn member(id: u64, name: &str, udp_port: u16) -> Member {
        Member::new(
            MemberId::new(id),
            name,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            udp_port,
            1,
        )
    }

    #[tokio::test]
    async fn test_commands_require_registration() {
        let mut p = peer(OrderingMode::Fifo).await;
        assert!(matches!(p.list_groups().await, Err(PeerError::NotRegistered)));
        assert!(matches!(p.send("hi").await, Err(PeerError::NotRegistered)));
    }

    #[tokio::test]
    async fn test_fifo_datagrams_cascade() {
        let mut p = peer(OrderingMode::Fifo).await;
        let from = p.transport().udp_addr().unwrap();

        let held = p.on_datagram(b"2 in lobby bob says:: second", from);
        assert_eq!(held, PeerEvent::Datagram { delivered: vec![] });

        let event = p.on_datagram(b"1 in lobby bob says:: first", from);
        let contents: Vec<_> = event.delivered().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);

        let stale = p.on_datagram(b"1 in lobby bob says:: first", from);
        assert!(matches!(stale, PeerEvent::Discarded { .. }));
        assert_eq!(p.report().stale_discarded, 1);
        assert_eq!(p.report().messages_received, 2);
    }

    #[tokio::test]
    async fn test_undecodable_datagram_is_dropped() {
        let mut p = peer(OrderingMode::Fifo).await;
        let from = p.transport().udp_addr().unwrap();
        assert!(matches!(
            p.on_datagram(b"not a message", from),
            PeerEvent::Discarded { .. }
        ));
    }

    #[tokio::test]
    async fn test_notifications_update_view() {
        let mut p = peer(OrderingMode::Fifo).await;
        p.view.on_joined("lobby", vec![member(1, "alice", 4000)]);

        let bob = member(2, "bob", 4010);
        let add = format!("add\tlobby\t{}", bob.descriptor());
        assert_eq!(
            p.on_notification(&add).unwrap(),
            PeerEvent::Membership(ViewChange::Added {
                group: "lobby".into(),
                member: bob.clone(),
            })
        );
        // Pushed twice, applied once.
        assert_eq!(
            p.on_notification(&add).unwrap(),
            PeerEvent::Membership(ViewChange::Unchanged)
        );
        assert_eq!(p.view().group("lobby").unwrap().len(), 2);

        p.on_notification("remove\tlobby\tbob").unwrap();
        assert_eq!(p.view().group("lobby").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_notification_is_fatal() {
        let mut p = peer(OrderingMode::Fifo).await;
        let err = p.on_notification("rename\tlobby\tbob").unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_remove_resets_fifo_stream() {
        let mut p = peer(OrderingMode::Fifo).await;
        let from = p.transport().udp_addr().unwrap();
        p.view
            .on_joined("lobby", vec![member(1, "alice", 4000), member(2, "bob", 4010)]);

        p.on_datagram(b"1 in lobby bob says:: one", from);
        p.on_notification("remove\tlobby\tbob").unwrap();

        // A new bob starts from sequence 1 again.
        let event = p.on_datagram(b"1 in lobby bob says:: again", from);
        assert_eq!(event.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_send_loops_back_to_self() {
        let mut p = peer(OrderingMode::Fifo).await;
        let udp_port = p.transport().udp_addr().unwrap().port();
        let me = member(1, "alice", udp_port);
        p.member = Some(me.clone());
        p.view.on_joined("lobby", vec![me]);

        assert!(matches!(p.send("hi").await, Err(PeerError::NoGroupSelected)));
        p.select("lobby").unwrap();

        let reply = p.send("hi").await.unwrap();
        assert!(matches!(reply, Reply::Sent { datagrams: 1, .. }));

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = p.step().await.unwrap();
                if !event.delivered().is_empty() {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.delivered()[0], Message::new("hi", "lobby", "alice", 1));
        assert_eq!(p.report().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_total_order_flushes_on_idle() {
        let mut p = peer(OrderingMode::Total).await;
        let from = p.transport().udp_addr().unwrap();

        assert!(p
            .on_datagram(b"1 in lobby bob says:: b", from)
            .delivered()
            .is_empty());
        assert!(p
            .on_datagram(b"1 in lobby alice says:: a", from)
            .delivered()
            .is_empty());

        let event = p.service(Ready::Tick).await.unwrap();
        let senders: Vec<_> = event
            .delivered()
            .iter()
            .map(|m| m.sender_username.as_str())
            .collect();
        assert_eq!(senders, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_queued_datagrams_are_serviced_before_idle_tick() {
        let mut p = peer(OrderingMode::Total).await;
        let own = p.transport().udp_addr().unwrap();

        for wire in [
            "1 in lobby carol says:: c",
            "1 in lobby bob says:: b",
            "1 in lobby alice says:: a",
        ] {
            p.transport().send_to(wire.as_bytes(), own).await.unwrap();
        }
        // Let the idle tick fall due while the datagrams are queued.
        tokio::time::sleep(Duration::from_millis(200)).await;

        for _ in 0..3 {
            let event = p.step().await.unwrap();
            assert_eq!(event, PeerEvent::Datagram { delivered: vec![] });
        }
        let event = p.step().await.unwrap();
        let senders: Vec<_> = event
            .delivered()
            .iter()
            .map(|m| m.sender_username.as_str())
            .collect();
        assert_eq!(senders, vec!["alice", "bob", "carol"]);
    }
}
