// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer configuration.

use groupcast::OrderingMode;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Peer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Tracker control address (default: 127.0.0.1:50000)
    #[serde(default = "default_tracker")]
    pub tracker: SocketAddr,

    /// Local IP the data and control sockets bind to
    #[serde(default = "default_ip")]
    pub ip: IpAddr,

    /// UDP port for group messages (0 = ephemeral)
    #[serde(default)]
    pub udp_port: u16,

    /// TCP port for tracker notifications (0 = ephemeral)
    #[serde(default)]
    pub tcp_port: u16,

    /// Delivery discipline
    #[serde(default)]
    pub ordering: OrderingMode,

    /// Deadline for one control request (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Idle tick driving total-order flushes (ms)
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    /// Delay before the first total-order flush (ms)
    #[serde(default = "default_warmup")]
    pub warmup_ms: u64,

    /// Maximum held messages before the oldest is evicted
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_tracker() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000)
}

fn default_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_flush_interval() -> u64 {
    50
}

fn default_warmup() -> u64 {
    500
}

fn default_buffer_capacity() -> usize {
    1024
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            tracker: default_tracker(),
            ip: default_ip(),
            udp_port: 0,
            tcp_port: 0,
            ordering: OrderingMode::default(),
            request_timeout_ms: default_request_timeout(),
            flush_interval_ms: default_flush_interval(),
            warmup_ms: default_warmup(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl PeerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout_ms cannot be 0".into(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "flush_interval_ms cannot be 0".into(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "buffer_capacity cannot be 0".into(),
            ));
        }
        if self.tracker.port() == 0 {
            return Err(ConfigError::InvalidValue("tracker port cannot be 0".into()));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
