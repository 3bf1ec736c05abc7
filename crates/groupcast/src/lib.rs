// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! groupcast: group communication over an unreliable datagram transport.
//!
//! Peers register with a central tracker, join named groups, and multicast
//! chat messages to every member of a group over UDP. This crate holds the
//! parts shared by the tracker and the peers:
//!
//! - [`member`]: member identity, descriptors and groups
//! - [`message`]: application messages and the datagram codec
//! - [`control`]: control-plane requests, replies and push notifications
//! - [`view`]: a peer's local replica of the groups it joined
//! - [`ordering`]: FIFO and total-order delivery engines
//! - [`metrics`]: per-peer throughput/latency accounting
//!
//! # Example
//!
//! ```
//! use groupcast::message::Message;
//! use groupcast::ordering::{OrderingEngine, OrderingMode};
//! use std::time::Duration;
//!
//! let mut engine = OrderingEngine::new(OrderingMode::Fifo, 1024, Duration::ZERO);
//! let mut delivered = Vec::new();
//!
//! engine.on_receive(Message::new("second", "lobby", "alice", 2), &mut delivered).unwrap();
//! assert!(delivered.is_empty());
//! engine.on_receive(Message::new("first", "lobby", "alice", 1), &mut delivered).unwrap();
//! assert_eq!(delivered.len(), 2);
//! ```

pub mod control;
pub mod member;
pub mod message;
pub mod metrics;
pub mod ordering;
pub mod view;

pub use control::{Notification, ProtocolError, Request};
pub use member::{validate_group_name, validate_username, Group, Member, MemberId};
pub use message::{Message, MessageId};
pub use metrics::{Metrics, MetricsReport};
pub use ordering::{DeliverySink, OrderingEngine, OrderingError, OrderingMode};
pub use view::{LocalGroupView, ViewChange, ViewError};
