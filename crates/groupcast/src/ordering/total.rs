// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Total-order delivery from Lamport timestamps.
//!
//! Nothing is delivered on receipt. Every received unit advances the local
//! clock and is held; an idle tick of the peer loop flushes the whole buffer
//! in `(-sequence, sender_username)` order. Every peer applies the same
//! comparator, so peers that hold the same units at flush time deliver them
//! in the same order.
//!
//! The first flush is deferred by a warm-up delay so that concurrent units
//! from other peers have a chance to arrive. This is an approximation:
//! under arbitrary network delay two peers can still flush different sets.

use super::clock::LamportClock;
use super::{DeliverySink, OrderingError};
use crate::message::Message;
use std::cmp::{Ordering, Reverse};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Flush comparator: higher timestamps first, ties by ascending username.
/// Group and content break any remaining tie so the order is total.
pub fn flush_order(a: &Message, b: &Message) -> Ordering {
    (Reverse(a.sequence), &a.sender_username, &a.group_name, &a.content).cmp(&(
        Reverse(b.sequence),
        &b.sender_username,
        &b.group_name,
        &b.content,
    ))
}

/// Total-order state for one peer.
#[derive(Debug)]
pub struct TotalOrdering {
    clock: LamportClock,
    holding: VecDeque<Message>,
    capacity: usize,
    evicted: u64,
    warmup: Duration,
    first_arrival: Option<Instant>,
    warmed_up: bool,
}

impl TotalOrdering {
    #[must_use]
    pub fn new(capacity: usize, warmup: Duration) -> Self {
        Self {
            clock: LamportClock::new(),
            holding: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
            warmup,
            first_arrival: None,
            warmed_up: warmup.is_zero(),
        }
    }

    /// Timestamp for the next outgoing message.
    pub fn next_sequence(&mut self) -> u64 {
        self.clock.tick()
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock.time()
    }

    /// Merge the unit's timestamp into the clock and hold it for the next flush.
    pub fn on_receive(&mut self, msg: Message) -> Result<usize, OrderingError> {
        let now = self.clock.observe(msg.sequence);
        debug!(
            "Holding {} ts {} in {} (clock now {})",
            msg.sender_username, msg.sequence, msg.group_name, now
        );

        if self.first_arrival.is_none() {
            self.first_arrival = Some(Instant::now());
        }

        if self.holding.len() >= self.capacity {
            if let Some(oldest) = self.holding.pop_front() {
                self.evicted += 1;
                warn!(
                    "Total-order holding buffer full ({}), evicting {} ts {} in {}",
                    self.capacity, oldest.sender_username, oldest.sequence, oldest.group_name
                );
            }
        }
        self.holding.push_back(msg);
        Ok(0)
    }

    /// Idle tick: flush everything held, in flush order. Returns the number
    /// of messages delivered (0 while still warming up).
    pub fn on_idle<S: DeliverySink + ?Sized>(&mut self, now: Instant, sink: &mut S) -> usize {
        if self.holding.is_empty() {
            return 0;
        }

        if !self.warmed_up {
            match self.first_arrival {
                Some(first) if now.saturating_duration_since(first) >= self.warmup => {
                    self.warmed_up = true;
                }
                _ => return 0,
            }
        }

        let mut batch: Vec<Message> = self.holding.drain(..).collect();
        batch.sort_by(flush_order);

        let count = batch.len();
        for msg in batch {
            sink.deliver(msg);
        }
        debug!("Flushed {} held messages", count);
        count
    }

    #[must_use]
    pub fn held(&self) -> usize {
        self.holding.len()
    }

    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
