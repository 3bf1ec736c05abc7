// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-peer performance metrics.
//!
//! - Throughput: messages sent per second, measured from the first send to
//!   the last delivery
//! - Latency: send-to-delivery time of this peer's own messages (every
//!   message is also delivered to its sender)
//! - Cost: messages sent, messages received, datagrams on the wire

use crate::message::MessageId;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Metrics {
    messages_sent: u64,
    datagrams_sent: u64,
    messages_received: u64,
    stale_discarded: u64,
    first_send: Option<Instant>,
    last_delivery: Option<Instant>,
    /// Own messages not yet looped back, with their send instant.
    in_flight: HashMap<MessageId, Instant>,
    latency_total: Duration,
    latency_samples: u32,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One application message fanned out as `datagrams` datagrams.
    pub fn record_sent(&mut self, id: MessageId, datagrams: usize, now: Instant) {
        self.messages_sent += 1;
        self.datagrams_sent += datagrams as u64;
        self.first_send.get_or_insert(now);
        self.in_flight.insert(id, now);
    }

    pub fn record_delivered(&mut self, id: &MessageId, now: Instant) {
        self.messages_received += 1;
        self.last_delivery = Some(now);
        if let Some(sent) = self.in_flight.remove(id) {
            self.latency_total += now.saturating_duration_since(sent);
            self.latency_samples += 1;
        }
    }

    pub fn record_stale(&mut self) {
        self.stale_discarded += 1;
    }

    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    #[must_use]
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    fn average_latency(&self) -> Option<Duration> {
        (self.latency_samples > 0).then(|| self.latency_total / self.latency_samples)
    }

    fn throughput(&self) -> f64 {
        match (self.first_send, self.last_delivery) {
            (Some(start), Some(end)) if end > start => {
                self.messages_sent as f64 / end.duration_since(start).as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Snapshot for reporting. `evicted` comes from the ordering engine.
    #[must_use]
    pub fn report(&self, evicted: u64) -> MetricsReport {
        MetricsReport {
            throughput: self.throughput(),
            average_latency_ms: self
                .average_latency()
                .map(|d| d.as_secs_f64() * 1000.0)
                .unwrap_or(0.0),
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            datagrams_sent: self.datagrams_sent,
            stale_discarded: self.stale_discarded,
            evicted,
        }
    }
}

/// Point-in-time metrics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub throughput: f64,
    pub average_latency_ms: f64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub datagrams_sent: u64,
    pub stale_discarded: u64,
    pub evicted: u64,
}

impl MetricsReport {
    #[must_use]
    pub fn total_messages(&self) -> u64 {
        self.messages_sent + self.messages_received
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----- Performance analytics -----")?;
        writeln!(f, "System throughput = {:.3} messages/sec", self.throughput)?;
        writeln!(f, "System latency    = {:.3} ms", self.average_latency_ms)?;
        writeln!(f, "Messages sent     = {}", self.messages_sent)?;
        writeln!(f, "Messages received = {}", self.messages_received)?;
        writeln!(f, "Total messages    = {}", self.total_messages())?;
        writeln!(f, "Datagrams sent    = {}", self.datagrams_sent)?;
        writeln!(f, "Stale discarded   = {}", self.stale_discarded)?;
        write!(f, "Buffer evictions  = {}", self.evicted)
    }
}
