// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracker control client.
//!
//! Every request uses its own connection: connect, write, shut down the
//! write half, read the reply until EOF. The whole exchange is bounded by
//! the request timeout.

use groupcast::control::{
    decode_group_list, decode_member_list, decode_register_reply, decode_username_list,
    REPLY_EXIT_GROUP_OK, REPLY_INVALID_REQUEST, REPLY_QUIT_OK, REPLY_UNKNOWN_GROUP,
    REPLY_UNKNOWN_MEMBER,
};
use groupcast::{Member, MemberId, ProtocolError, Request};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Control client error types.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Tracker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Username {0:?} is taken")]
    UsernameTaken(String),

    #[error("Unknown group {0:?}")]
    UnknownGroup(String),

    #[error("Tracker does not know this member")]
    UnknownMember,

    #[error("Tracker rejected the request: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ControlClient {
    tracker: SocketAddr,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(tracker: SocketAddr, timeout: Duration) -> Self {
        Self { tracker, timeout }
    }

    pub fn tracker(&self) -> SocketAddr {
        self.tracker
    }

    /// Register and return the assigned id.
    pub async fn register(
        &self,
        ip: IpAddr,
        udp_port: u16,
        tcp_port: u16,
        username: &str,
    ) -> Result<MemberId, ControlError> {
        let reply = self
            .exchange(&Request::Register {
                ip,
                udp_port,
                tcp_port,
                username: username.to_string(),
            })
            .await?;
        decode_register_reply(&reply)?.ok_or_else(|| ControlError::UsernameTaken(username.into()))
    }

    pub async fn list_groups(&self, member: MemberId) -> Result<Vec<String>, ControlError> {
        let reply = self.exchange(&Request::ListGroups { member }).await?;
        Ok(decode_group_list(&reply))
    }

    /// Usernames of the members of `group`.
    pub async fn list_members(
        &self,
        member: MemberId,
        group: &str,
    ) -> Result<Vec<String>, ControlError> {
        let reply = self
            .exchange(&Request::ListMembers {
                member,
                group: group.to_string(),
            })
            .await?;
        if reply == REPLY_UNKNOWN_GROUP {
            return Err(ControlError::UnknownGroup(group.to_string()));
        }
        Ok(decode_username_list(&reply))
    }

    /// Join `group`; returns its members after the join, self included.
    pub async fn join(&self, member: MemberId, group: &str) -> Result<Vec<Member>, ControlError> {
        let reply = self
            .exchange(&Request::Join {
                member,
                group: group.to_string(),
            })
            .await?;
        Ok(decode_member_list(&reply)?)
    }

    pub async fn leave(&self, member: MemberId, group: &str) -> Result<(), ControlError> {
        let reply = self
            .exchange(&Request::Leave {
                member,
                group: group.to_string(),
            })
            .await?;
        expect_reply(reply, REPLY_EXIT_GROUP_OK)
    }

    pub async fn quit(&self, member: MemberId) -> Result<(), ControlError> {
        let reply = self.exchange(&Request::Quit { member }).await?;
        expect_reply(reply, REPLY_QUIT_OK)
    }

    async fn exchange(&self, request: &Request) -> Result<String, ControlError> {
        let raw = request.encode();
        debug!("Control request to {}: {:?}", self.tracker, raw);

        let reply = tokio::time::timeout(self.timeout, async {
            let mut stream = TcpStream::connect(self.tracker).await?;
            stream.write_all(raw.as_bytes()).await?;
            stream.shutdown().await?;
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        })
        .await
        .map_err(|_| ControlError::Timeout(self.timeout))??;

        debug!("Control reply: {:?}", reply);
        if reply == REPLY_UNKNOWN_MEMBER {
            return Err(ControlError::UnknownMember);
        }
        if reply == REPLY_INVALID_REQUEST {
            return Err(ControlError::Rejected(reply));
        }
        Ok(reply)
    }
}

fn expect_reply(reply: String, expected: &str) -> Result<(), ControlError> {
    if reply == expected {
        Ok(())
    } else {
        Err(ControlError::Rejected(reply))
    }
}
