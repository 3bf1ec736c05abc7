// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FIFO-per-sender delivery.
//!
//! Each `(sender, group)` stream is delivered in send order `1, 2, 3, ...`.
//! Streams are independent of each other: nothing is reordered across
//! senders or groups.
//!
//! - `sequence == last + 1`: deliver, then cascade through held units
//! - `sequence >  last + 1`: hold until the gap is filled
//! - `sequence <= last`    : stale, discarded

use super::{DeliverySink, OrderingError};
use crate::message::Message;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Identifies one FIFO stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub sender: String,
    pub group: String,
}

impl StreamKey {
    pub fn new(sender: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            group: group.into(),
        }
    }

    fn of(msg: &Message) -> Self {
        Self::new(msg.sender_username.as_str(), msg.group_name.as_str())
    }

    fn matches(&self, msg: &Message) -> bool {
        self.sender == msg.sender_username && self.group == msg.group_name
    }
}

/// FIFO ordering state for one peer.
#[derive(Debug)]
pub struct FifoOrdering {
    last_delivered: HashMap<StreamKey, u64>,
    holding: VecDeque<Message>,
    /// Outgoing counters, one per group so every stream starts at 1.
    send_counters: HashMap<String, u64>,
    capacity: usize,
    evicted: u64,
}

impl FifoOrdering {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            last_delivered: HashMap::new(),
            holding: VecDeque::new(),
            send_counters: HashMap::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// Next outgoing sequence number for `group`.
    pub fn next_sequence(&mut self, group: &str) -> u64 {
        let counter = self.send_counters.entry(group.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Restart the outgoing counter for `group` after leaving it. The other
    /// members forget this stream when they see the `remove`.
    pub fn reset_sequence(&mut self, group: &str) {
        self.send_counters.remove(group);
    }

    /// Last sequence delivered for a stream (0 if nothing yet).
    #[must_use]
    pub fn last_delivered(&self, sender: &str, group: &str) -> u64 {
        self.last_delivered
            .get(&StreamKey::new(sender, group))
            .copied()
            .unwrap_or(0)
    }

    /// Process one received unit. Returns the number of messages handed to
    /// `sink` (the unit itself plus any cascade).
    pub fn on_receive<S: DeliverySink + ?Sized>(
        &mut self,
        msg: Message,
        sink: &mut S,
    ) -> Result<usize, OrderingError> {
        let key = StreamKey::of(&msg);
        let last = *self.last_delivered.entry(key.clone()).or_insert(0);
        let expected = last + 1;

        if msg.sequence < expected {
            debug!(
                "Stale message from {} in {}: seq {} < expected {}",
                key.sender, key.group, msg.sequence, expected
            );
            return Err(OrderingError::Stale {
                sender: key.sender,
                group: key.group,
                sequence: msg.sequence,
                expected,
            });
        }

        if msg.sequence > expected {
            if self
                .holding
                .iter()
                .any(|held| key.matches(held) && held.sequence == msg.sequence)
            {
                trace!(
                    "Duplicate held message from {} in {} seq {}",
                    key.sender,
                    key.group,
                    msg.sequence
                );
                return Ok(0);
            }
            trace!(
                "Holding {} seq {} in {} (expected {})",
                key.sender,
                msg.sequence,
                key.group,
                expected
            );
            self.hold(msg);
            return Ok(0);
        }

        let mut last = msg.sequence;
        sink.deliver(msg);
        let mut delivered = 1;

        // Cascade: drain held units that are now contiguous.
        while let Some(pos) = self
            .holding
            .iter()
            .position(|held| key.matches(held) && held.sequence == last + 1)
        {
            if let Some(next) = self.holding.remove(pos) {
                last = next.sequence;
                sink.deliver(next);
                delivered += 1;
            }
        }

        self.last_delivered.insert(key, last);
        Ok(delivered)
    }

    fn hold(&mut self, msg: Message) {
        if self.holding.len() >= self.capacity {
            if let Some(oldest) = self.holding.pop_front() {
                self.evicted += 1;
                warn!(
                    "FIFO holding buffer full ({}), evicting {} seq {} in {}",
                    self.capacity, oldest.sender_username, oldest.sequence, oldest.group_name
                );
            }
        }
        self.holding.push_back(msg);
    }

    /// Drop stream state and held units for a sender that left a group.
    /// Returns the number of held units discarded.
    pub fn forget_sender(&mut self, sender: &str, group: &str) -> usize {
        let key = StreamKey::new(sender, group);
        self.last_delivered.remove(&key);
        let before = self.holding.len();
        self.holding.retain(|held| !key.matches(held));
        before - self.holding.len()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str, group: &str, seq: u64) -> Message {
        Message::new(format!("m{}", seq), group, sender, seq)
    }

    fn sequences(out: &[Message]) -> Vec<u64> {
        out.iter().map(|m| m.sequence).collect()
    }

    #[test]
    fn test_in_order_delivery() {
        let mut fifo = FifoOrdering::new(64);
        let mut out = Vec::new();
        for seq in 1..=3 {
            assert_eq!(fifo.on_receive(msg("alice", "g", seq), &mut out).unwrap(), 1);
        }
        assert_eq!(sequences(&out), vec![1, 2, 3]);
        assert_eq!(fifo.last_delivered("alice", "g"), 3);
    }

    #[test]
    fn test_cascade_completeness() {
        let mut fifo = FifoOrdering::new(64);
        let mut out = Vec::new();

        assert_eq!(fifo.on_receive(msg("alice", "g", 3), &mut out).unwrap(), 0);
        assert_eq!(fifo.on_receive(msg("alice", "g", 1), &mut out).unwrap(), 1);
        assert_eq!(fifo.held(), 1);
        assert_eq!(fifo.on_receive(msg("alice", "g", 2), &mut out).unwrap(), 2);

        assert_eq!(sequences(&out), vec![1, 2, 3]);
        assert_eq!(fifo.held(), 0);
    }

    #[test]
    fn test_any_permutation_delivers_in_order() {
        for round in 0..50 {
            let mut arrivals: Vec<u64> = (1..=20).collect();
            fastrand::seed(round);
            fastrand::shuffle(&mut arrivals);

            let mut fifo = FifoOrdering::new(64);
            let mut out = Vec::new();
            for seq in arrivals {
                fifo.on_receive(msg("alice", "g", seq), &mut out).unwrap();
            }

            assert_eq!(sequences(&out), (1..=20).collect::<Vec<_>>());
            assert_eq!(fifo.held(), 0);
        }
    }

    #[test]
    fn test_stale_is_rejected_without_delivery() {
        let mut fifo = FifoOrdering::new(64);
        let mut out = Vec::new();
        fifo.on_receive(msg("alice", "g", 1), &mut out).unwrap();
        fifo.on_receive(msg("alice", "g", 2), &mut out).unwrap();

        for seq in [1, 2] {
            let err = fifo.on_receive(msg("alice", "g", seq), &mut out).unwrap_err();
            assert_eq!(
                err,
                OrderingError::Stale {
                    sender: "alice".into(),
                    group: "g".into(),
                    sequence: seq,
                    expected: 3,
                }
            );
        }
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut fifo = FifoOrdering::new(64);
        let mut out = Vec::new();

        fifo.on_receive(msg("alice", "g", 2), &mut out).unwrap();
        fifo.on_receive(msg("bob", "g", 1), &mut out).unwrap();
        fifo.on_receive(msg("alice", "h", 1), &mut out).unwrap();

        let delivered: Vec<_> = out
            .iter()
            .map(|m| (m.sender_username.as_str(), m.group_name.as_str(), m.sequence))
            .collect();
        assert_eq!(delivered, vec![("bob", "g", 1), ("alice", "h", 1)]);
        assert_eq!(fifo.held(), 1);
    }

    #[test]
    fn test_duplicate_held_unit_is_dropped() {
        let mut fifo = FifoOrdering::new(64);
        let mut out = Vec::new();
        fifo.on_receive(msg("alice", "g", 2), &mut out).unwrap();
        fifo.on_receive(msg("alice", "g", 2), &mut out).unwrap();
        assert_eq!(fifo.held(), 1);

        fifo.on_receive(msg("alice", "g", 1), &mut out).unwrap();
        assert_eq!(sequences(&out), vec![1, 2]);
        assert_eq!(fifo.held(), 0);
    }

    #[test]
    fn test_eviction_when_full() {
        let mut fifo = FifoOrdering::new(2);
        let mut out = Vec::new();
        for seq in [5, 6, 7] {
            fifo.on_receive(msg("alice", "g", seq), &mut out).unwrap();
        }
        assert_eq!(fifo.held(), 2);
        assert_eq!(fifo.evicted(), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_forget_sender() {
        let mut fifo = FifoOrdering::new(64);
        let mut out = Vec::new();
        fifo.on_receive(msg("alice", "g", 1), &mut out).unwrap();
        fifo.on_receive(msg("alice", "g", 3), &mut out).unwrap();

        assert_eq!(fifo.forget_sender("alice", "g"), 1);
        assert_eq!(fifo.last_delivered("alice", "g"), 0);

        // A new member reusing the username starts from 1 again.
        assert_eq!(fifo.on_receive(msg("alice", "g", 1), &mut out).unwrap(), 1);
    }

    #[test]
    fn test_send_counters_per_group() {
        let mut fifo = FifoOrdering::new(64);
        assert_eq!(fifo.next_sequence("g"), 1);
        assert_eq!(fifo.next_sequence("g"), 2);
        assert_eq!(fifo.next_sequence("h"), 1);

        fifo.reset_sequence("g");
        assert_eq!(fifo.next_sequence("g"), 1);
        assert_eq!(fifo.next_sequence("h"), 2);
    }
}
