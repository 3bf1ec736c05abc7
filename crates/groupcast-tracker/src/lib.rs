// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! groupcast tracker
//!
//! Central rendezvous service for groupcast peers. The tracker assigns
//! member ids, keeps the group directory, answers one control request per
//! connection and pushes `add`/`remove` notifications to the other members
//! of a group whenever its membership changes.
//!
//! All state lives in [`TrackerState`] and is mutated only by the
//! [`TrackerServer`] loop.

pub mod config;
pub mod server;

pub use config::{ConfigError, TrackerConfig};
pub use server::{
    Notice, Outcome, RequestError, TrackerError, TrackerServer, TrackerState, TrackerStats,
};
