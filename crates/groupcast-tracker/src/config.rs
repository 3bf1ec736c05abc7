// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracker configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for `max_request_size`; the read buffer is allocated up front.
pub const MAX_REQUEST_SIZE_LIMIT: usize = 1024 * 1024;

/// Tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Address to bind to (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 50000, 0 = ephemeral)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for reading one request from an accepted connection (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Deadline for connecting to and writing a notification to a member (ms)
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_ms: u64,

    /// Maximum request size (bytes)
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,

    /// Treat a member whose control listener refuses a notification as gone
    #[serde(default = "default_true")]
    pub evict_unreachable: bool,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    50000
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_notify_timeout() -> u64 {
    2000
}

fn default_max_request_size() -> usize {
    4096
}

fn default_true() -> bool {
    true
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            request_timeout_ms: default_request_timeout(),
            notify_timeout_ms: default_notify_timeout(),
            max_request_size: default_max_request_size(),
            evict_unreachable: true,
        }
    }
}

impl TrackerConfig {
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

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout_ms cannot be 0".into(),
            ));
        }
        if self.notify_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "notify_timeout_ms cannot be 0".into(),
            ));
        }
        if self.max_request_size < 64 {
            return Err(ConfigError::InvalidValue(
                "max_request_size must be at least 64 bytes".into(),
            ));
        }
        if self.max_request_size > MAX_REQUEST_SIZE_LIMIT {
            return Err(ConfigError::InvalidValue(format!(
                "max_request_size cannot exceed {} bytes",
                MAX_REQUEST_SIZE_LIMIT
            )));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.port, 50000);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(config.evict_unreachable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrackerConfig = serde_json::from_str(r#"{"port": 6000}"#).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.max_request_size, 4096);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = TrackerConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_request_size_bounds() {
        for size in [0, 63, MAX_REQUEST_SIZE_LIMIT + 1, usize::MAX] {
            let config = TrackerConfig {
                max_request_size: size,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "size {} accepted", size);
        }
        let config = TrackerConfig {
            max_request_size: MAX_REQUEST_SIZE_LIMIT,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let config = TrackerConfig {
            port: 7777,
            evict_unreachable: false,
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let loaded = TrackerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.port, 7777);
        assert!(!loaded.evict_unreachable);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        std::fs::write(&path, r#"{"notify_timeout_ms": 0}"#).unwrap();
        assert!(matches!(
            TrackerConfig::from_file(&path),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
