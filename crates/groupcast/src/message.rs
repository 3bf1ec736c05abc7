// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application messages and the data-plane datagram codec.
//!
//! Wire format (space separated, UTF-8):
//! ```text
//! <sequence> in <group_name> <username> says:: <content...>
//! ```
//!
//! `sequence` is the per-group send counter in FIFO mode and the sender's
//! Lamport timestamp in total-order mode.

use crate::control::ProtocolError;
use std::fmt;

const IN_TOKEN: &str = "in";
const SAYS_TOKEN: &str = "says::";

/// A chat message exchanged inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    pub content: String,
    pub group_name: String,
    pub sender_username: String,
    pub sequence: u64,
}

/// `(group_name, sender_username, sequence)`: identifies one message instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    pub group_name: String,
    pub sender_username: String,
    pub sequence: u64,
}

impl Message {
    pub fn new(
        content: impl Into<String>,
        group_name: impl Into<String>,
        sender_username: impl Into<String>,
        sequence: u64,
    ) -> Self {
        Self {
            content: content.into(),
            group_name: group_name.into(),
            sender_username: sender_username.into(),
            sequence,
        }
    }

    pub fn id(&self) -> MessageId {
        MessageId {
            group_name: self.group_name.clone(),
            sender_username: self.sender_username.clone(),
            sequence: self.sequence,
        }
    }

    /// Encode as a datagram payload. Trailing line terminators in the content
    /// are not sent.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "{} {} {} {} {} {}",
            self.sequence,
            IN_TOKEN,
            self.group_name,
            self.sender_username,
            SAYS_TOKEN,
            self.content.trim_end_matches(['\r', '\n'])
        )
        .into_bytes()
    }

    /// Decode a datagram payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::InvalidDatagram("payload is not UTF-8".into()))?;
        let text = text.trim_end_matches(['\r', '\n']);

        let mut parts = text.splitn(6, ' ');
        let mut next = |what: &str| {
            parts
                .next()
                .ok_or_else(|| ProtocolError::InvalidDatagram(format!("missing {}", what)))
        };

        let sequence = next("sequence")?;
        let sequence: u64 = sequence
            .parse()
            .map_err(|_| ProtocolError::InvalidDatagram(format!("bad sequence {:?}", sequence)))?;
        if next("'in'")? != IN_TOKEN {
            return Err(ProtocolError::InvalidDatagram("expected 'in'".into()));
        }
        let group_name = next("group name")?.to_string();
        let sender_username = next("username")?.to_string();
        if next("'says::'")? != SAYS_TOKEN {
            return Err(ProtocolError::InvalidDatagram("expected 'says::'".into()));
        }
        // Empty content is legal: "1 in g u says:: " splits to an empty sixth field.
        let content = parts.next().unwrap_or_default().to_string();

        if group_name.is_empty() || sender_username.is_empty() {
            return Err(ProtocolError::InvalidDatagram(
                "empty group or username".into(),
            ));
        }

        Ok(Self {
            content,
            group_name,
            sender_username,
            sequence,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.group_name, self.sender_username, self.content
        )
    }
}
