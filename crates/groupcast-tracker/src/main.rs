// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! groupcast tracker
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (50000)
//! groupcast-tracker
//!
//! # Custom port and config
//! groupcast-tracker --port 6000 --config tracker.json
//! ```

use clap::Parser;
use groupcast_tracker::{TrackerConfig, TrackerServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// groupcast tracker - group membership rendezvous service
#[derive(Parser, Debug)]
#[command(name = "groupcast-tracker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "50000")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep members whose control listener refuses a notification
    #[arg(long, default_value = "false")]
    no_evict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        TrackerConfig::from_file(&config_path)?
    } else {
        TrackerConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            evict_unreachable: !args.no_evict,
            ..Default::default()
        }
    };

    let mut server = TrackerServer::bind(config.clone()).await?;

    info!("+----------------------------------------------------+");
    info!(
        "|       groupcast tracker v{:<26}|",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:    {:40} |", server.local_addr()?);
    info!(
        "|  Timeout: {:40} |",
        format!("{}ms", config.request_timeout_ms)
    );
    info!(
        "|  Evict:   {:40} |",
        if config.evict_unreachable {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!("+----------------------------------------------------+");

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping tracker...");
        shutdown.notify_one();
    });

    server.run().await?;

    info!("Tracker stopped");
    Ok(())
}
