// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message ordering engine.
//!
//! Turns the unordered, unreliable stream of received datagrams into an
//! ordered stream of application messages, using one of two disciplines:
//!
//! - [`FifoOrdering`]: per-sender, per-group send order
//! - [`TotalOrdering`]: one global order derived from Lamport timestamps
//!
//! The discipline is fixed per client. [`OrderingEngine`] is the closed
//! dispatch over both.

mod clock;
mod fifo;
mod total;

pub use clock::LamportClock;
pub use fifo::{FifoOrdering, StreamKey};
pub use total::{flush_order, TotalOrdering};

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Receives messages once they are deliverable.
pub trait DeliverySink {
    fn deliver(&mut self, message: Message);
}

impl DeliverySink for Vec<Message> {
    fn deliver(&mut self, message: Message) {
        self.push(message);
    }
}

/// Ordering errors. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("Stale message from {sender} in {group}: sequence {sequence}, expected {expected}")]
    Stale {
        sender: String,
        group: String,
        sequence: u64,
        expected: u64,
    },
}

/// Delivery discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingMode {
    #[default]
    Fifo,
    Total,
}

impl fmt::Display for OrderingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => write!(f, "fifo"),
            Self::Total => write!(f, "total"),
        }
    }
}

impl FromStr for OrderingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "total" => Ok(Self::Total),
            other => Err(format!("unknown ordering mode {:?} (fifo|total)", other)),
        }
    }
}

/// Ordering engine for one peer.
#[derive(Debug)]
pub enum OrderingEngine {
    Fifo(FifoOrdering),
    Total(TotalOrdering),
}

impl OrderingEngine {
    /// `capacity` bounds the holding buffer; `warmup` only applies to total order.
    #[must_use]
    pub fn new(mode: OrderingMode, capacity: usize, warmup: Duration) -> Self {
        match mode {
            OrderingMode::Fifo => Self::Fifo(FifoOrdering::new(capacity)),
            OrderingMode::Total => Self::Total(TotalOrdering::new(capacity, warmup)),
        }
    }

    #[must_use]
    pub fn mode(&self) -> OrderingMode {
        match self {
            Self::Fifo(_) => OrderingMode::Fifo,
            Self::Total(_) => OrderingMode::Total,
        }
    }

    /// Sequence to tag the next outgoing message to `group` with.
    pub fn next_sequence(&mut self, group: &str) -> u64 {
        match self {
            Self::Fifo(fifo) => fifo.next_sequence(group),
            Self::Total(total) => total.next_sequence(),
        }
    }

    /// Process a received unit. Returns how many messages reached `sink`.
    pub fn on_receive<S: DeliverySink + ?Sized>(
        &mut self,
        message: Message,
        sink: &mut S,
    ) -> Result<usize, OrderingError> {
        match self {
            Self::Fifo(fifo) => fifo.on_receive(message, sink),
            Self::Total(total) => total.on_receive(message),
        }
    }

    /// Idle tick of the peer loop. Only total order has work to do here.
    pub fn on_idle<S: DeliverySink + ?Sized>(&mut self, now: Instant, sink: &mut S) -> usize {
        match self {
            Self::Fifo(_) => 0,
            Self::Total(total) => total.on_idle(now, sink),
        }
    }

    /// A sender left a group. FIFO drops its stream state; total order keeps
    /// held units since they still have a place in the global order.
    pub fn forget_sender(&mut self, sender: &str, group: &str) -> usize {
        match self {
            Self::Fifo(fifo) => fifo.forget_sender(sender, group),
            Self::Total(_) => 0,
        }
    }

    /// This peer left `group`.
    pub fn on_left(&mut self, group: &str) {
        if let Self::Fifo(fifo) = self {
            fifo.reset_sequence(group);
        }
    }

    #[must_use]
    pub fn held(&self) -> usize {
        match self {
            Self::Fifo(fifo) => fifo.held(),
            Self::Total(total) => total.held(),
        }
    }

    #[must_use]
    pub fn evicted(&self) -> u64 {
        match self {
            Self::Fifo(fifo) => fifo.evicted(),
            Self::Total(total) => total.evicted(),
        }
    }
}
