// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! groupcast peer
//!
//! A peer registers with the tracker, joins groups, and multicasts chat
//! messages to every member of the selected group over UDP. Received
//! messages go through the configured ordering engine (FIFO or total
//! order) before they are shown.
//!
//! # Example
//!
//! ```no_run
//! use groupcast_peer::{Peer, PeerConfig};
//!
//! # async fn demo() -> Result<(), groupcast_peer::PeerError> {
//! let mut peer = Peer::bind(PeerConfig::default()).await?;
//! peer.register("alice").await?;
//! peer.join("lobby").await?;
//! peer.select("lobby")?;
//! peer.send("hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod control;
pub mod peer;
pub mod transport;

pub use command::{Command, CommandError};
pub use config::{ConfigError, PeerConfig};
pub use control::{ControlClient, ControlError};
pub use peer::{Console, Peer, PeerError, PeerEvent, Reply};
pub use transport::PeerTransport;
