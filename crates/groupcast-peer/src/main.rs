// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! groupcast peer
//!
//! # Usage
//!
//! ```bash
//! # Interactive, FIFO delivery, tracker on 127.0.0.1:50000
//! groupcast-peer
//!
//! # Total order, fixed ports
//! groupcast-peer --ordering total --udp-port 4000 --tcp-port 4001
//!
//! # Replay commands from a file as the current Unix user
//! groupcast-peer --script commands.txt
//! ```

use clap::Parser;
use groupcast::{MetricsReport, OrderingMode};
use groupcast_peer::{
    Console, ControlError, Peer, PeerConfig, PeerError, PeerEvent, Reply,
};
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// groupcast peer - group chat with FIFO or total-order delivery
#[derive(Parser, Debug)]
#[command(name = "groupcast-peer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tracker address
    #[arg(short, long, default_value = "127.0.0.1:50000")]
    tracker: SocketAddr,

    /// Local IP to bind and advertise
    #[arg(long, default_value = "127.0.0.1")]
    ip: IpAddr,

    /// UDP port for group messages (0 = ephemeral)
    #[arg(long, default_value = "0")]
    udp_port: u16,

    /// TCP port for tracker notifications (0 = ephemeral)
    #[arg(long, default_value = "0")]
    tcp_port: u16,

    /// Delivery discipline (fifo, total)
    #[arg(short, long, default_value = "fifo")]
    ordering: OrderingMode,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Username to register with (prompted for when absent)
    #[arg(short, long)]
    username: Option<String>,

    /// Read commands from a file instead of stdin
    #[arg(long)]
    script: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Prints to stdout and keeps the `[user] > ` prompt.
struct Terminal {
    username: String,
}

impl Terminal {
    fn prompt(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "[{}] > ", self.username);
        let _ = out.flush();
    }

    fn line(&self, text: impl std::fmt::Display) {
        println!("\r{}", text);
    }
}

impl Console for Terminal {
    fn event(&mut self, event: &PeerEvent) {
        match event {
            PeerEvent::Datagram { delivered } | PeerEvent::Idle { delivered } => {
                if delivered.is_empty() {
                    return;
                }
                for message in delivered {
                    self.line(message);
                }
            }
            _ => return,
        }
        self.prompt();
    }

    fn reply(&mut self, reply: &Reply) {
        match reply {
            Reply::Groups(groups) => {
                let listed: Vec<String> = groups.iter().map(|g| format!("[{}]", g)).collect();
                self.line(format!("groups: {}", listed.join(", ")));
            }
            Reply::Members { group, usernames } => {
                self.line(format!("members of {}: {}", group, usernames.join(", ")));
            }
            Reply::Joined { group, members } => {
                self.line(format!("joined {} ({} members)", group, members.len()));
            }
            Reply::Left { group, was_member } => {
                if !was_member {
                    self.line(format!("You don't belong in group '{}'.", group));
                }
            }
            Reply::Selected(group) => self.line(format!("writing to {}", group)),
            Reply::Sent { .. } => {}
            Reply::Quit => {
                self.line("Terminating messenger application ...");
                return;
            }
        }
        self.prompt();
    }

    fn error(&mut self, error: &PeerError) {
        self.line(error);
        self.prompt();
    }

    fn report(&mut self, report: &MetricsReport) {
        self.line(report);
    }
}

/// Forward input lines to the peer loop. The channel closes at end of input.
fn spawn_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Input error: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Register, re-prompting on an invalid or taken username unless the name
/// was fixed on the command line.
async fn register(
    peer: &mut Peer,
    fixed: Option<String>,
    lines: &mut mpsc::Receiver<String>,
) -> Result<String, PeerError> {
    if let Some(username) = fixed {
        peer.register(&username).await?;
        return Ok(username);
    }

    loop {
        print!("Enter your username: ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.recv().await else {
            return Err(PeerError::NotRegistered);
        };
        let username = line.trim().to_string();

        match peer.register(&username).await {
            Ok(_) => return Ok(username),
            Err(PeerError::Protocol(_)) => {
                println!("Username is invalid, please try again.");
            }
            Err(PeerError::Control(ControlError::UsernameTaken(_))) => {
                println!("Username already exists, please try again.");
            }
            Err(e) => return Err(e),
        }
    }
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
        PeerConfig::from_file(&config_path)?
    } else {
        PeerConfig {
            tracker: args.tracker,
            ip: args.ip,
            udp_port: args.udp_port,
            tcp_port: args.tcp_port,
            ordering: args.ordering,
            ..Default::default()
        }
    };

    let mut lines = match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            spawn_reader(BufReader::new(file))
        }
        None => spawn_reader(BufReader::new(tokio::io::stdin())),
    };
    let username = args
        .username
        .or_else(|| args.script.as_ref().and_then(|_| std::env::var("USER").ok()));

    let mut peer = Peer::bind(config).await?;
    info!(
        "Peer bound: udp {}, control {}, {} ordering",
        peer.transport().udp_addr()?,
        peer.transport().control_addr()?,
        peer.engine().mode()
    );

    let username = match register(&mut peer, username, &mut lines).await {
        Ok(username) => username,
        Err(e) => {
            println!("{}", peer.report());
            return Err(e.into());
        }
    };
    println!("Successfully registered to distributed messenger");

    let mut terminal = Terminal { username };
    terminal.prompt();

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
    };
    peer.run(lines, shutdown, &mut terminal).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["groupcast-peer"]).unwrap();
        assert_eq!(args.log_level, "info");
        assert_eq!(args.ordering, OrderingMode::Fifo);
        assert_eq!(args.tracker, "127.0.0.1:50000".parse::<SocketAddr>().unwrap());
        assert!(args.script.is_none());
    }
}
