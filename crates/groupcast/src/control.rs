// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control-plane wire protocol between peers and the tracker.
//!
//! Every exchange is a single newline-free ASCII message per TCP connection,
//! with tab-separated tokens. The connection is closed after the exchange.
//!
//! Requests (peer -> tracker):
//! ```text
//! register<TAB>ip<TAB>udp_port<TAB>tcp_port<TAB>username  -> id | "username taken"
//! id<TAB>!lg                                           -> "[a], [b]"
//! id<TAB>!lm<TAB>group                                 -> "(alice), (bob)" | "unknown group"
//! id<TAB>!j<TAB>group                                  -> descriptor<TAB>descriptor...
//! id<TAB>!e<TAB>group                                  -> "EXIT_GROUP OK"
//! id<TAB>!q                                            -> "QUIT OK"
//! ```
//!
//! Push notifications (tracker -> peer control listener):
//! ```text
//! add<TAB>group<TAB>descriptor
//! remove<TAB>group<TAB>descriptor-or-username
//! ```

use crate::member::{validate_group_name, validate_username, Member, MemberId};
use std::net::IpAddr;
use thiserror::Error;

pub const REPLY_USERNAME_TAKEN: &str = "username taken";
pub const REPLY_UNKNOWN_GROUP: &str = "unknown group";
pub const REPLY_UNKNOWN_MEMBER: &str = "unknown member";
pub const REPLY_INVALID_REQUEST: &str = "invalid request";
pub const REPLY_EXIT_GROUP_OK: &str = "EXIT_GROUP OK";
pub const REPLY_QUIT_OK: &str = "QUIT OK";

const SEP: char = '\t';

/// Wire protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid member id: {0:?}")]
    InvalidMemberId(String),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Invalid group name: {0:?}")]
    InvalidGroupName(String),

    #[error("Invalid member descriptor: {0:?}")]
    InvalidDescriptor(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    #[error("Unsupported notification operation: {0:?}")]
    UnsupportedOperation(String),

    #[error("Invalid datagram: {0}")]
    InvalidDatagram(String),

    #[error("Invalid reply: {0:?}")]
    InvalidReply(String),
}

/// A control request, decoded once at the tracker boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register {
        ip: IpAddr,
        udp_port: u16,
        tcp_port: u16,
        username: String,
    },
    ListGroups {
        member: MemberId,
    },
    ListMembers {
        member: MemberId,
        group: String,
    },
    Join {
        member: MemberId,
        group: String,
    },
    Leave {
        member: MemberId,
        group: String,
    },
    Quit {
        member: MemberId,
    },
}

impl Request {
    /// The requesting member, if the request is made on behalf of one.
    pub fn member(&self) -> Option<MemberId> {
        match self {
            Self::Register { .. } => None,
            Self::ListGroups { member }
            | Self::ListMembers { member, .. }
            | Self::Join { member, .. }
            | Self::Leave { member, .. }
            | Self::Quit { member } => Some(*member),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Register {
                ip,
                udp_port,
                tcp_port,
                username,
            } => format!("register{SEP}{ip}{SEP}{udp_port}{SEP}{tcp_port}{SEP}{username}"),
            Self::ListGroups { member } => format!("{member}{SEP}!lg"),
            Self::ListMembers { member, group } => format!("{member}{SEP}!lm{SEP}{group}"),
            Self::Join { member, group } => format!("{member}{SEP}!j{SEP}{group}"),
            Self::Leave { member, group } => format!("{member}{SEP}!e{SEP}{group}"),
            Self::Quit { member } => format!("{member}{SEP}!q"),
        }
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let tokens: Vec<&str> = raw.split(SEP).collect();
        let invalid = || ProtocolError::InvalidRequest(raw.to_string());

        if tokens[0] == "register" {
            if tokens.len() != 5 {
                return Err(invalid());
            }
            let ip: IpAddr = tokens[1].parse().map_err(|_| invalid())?;
            let udp_port: u16 = tokens[2].parse().map_err(|_| invalid())?;
            let tcp_port: u16 = tokens[3].parse().map_err(|_| invalid())?;
            let username = tokens[4].to_string();
            validate_username(&username)?;
            return Ok(Self::Register {
                ip,
                udp_port,
                tcp_port,
                username,
            });
        }

        if tokens.len() < 2 {
            return Err(invalid());
        }
        let member: MemberId = tokens[0].parse()?;
        let group = || match tokens.get(2) {
            Some(g) if tokens.len() == 3 => validate_group_name(g).map(|()| g.to_string()),
            _ => Err(invalid()),
        };

        match tokens[1] {
            "!lg" if tokens.len() == 2 => Ok(Self::ListGroups { member }),
            "!q" if tokens.len() == 2 => Ok(Self::Quit { member }),
            "!lm" => Ok(Self::ListMembers {
                member,
                group: group()?,
            }),
            "!j" => Ok(Self::Join {
                member,
                group: group()?,
            }),
            "!e" => Ok(Self::Leave {
                member,
                group: group()?,
            }),
            _ => Err(invalid()),
        }
    }
}

/// Membership change pushed by the tracker to a peer's control listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Add { group: String, member: Member },
    Remove { group: String, username: String },
}

impl Notification {
    pub fn group(&self) -> &str {
        match self {
            Self::Add { group, .. } | Self::Remove { group, .. } => group,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Add { group, member } => format!("add{SEP}{group}{SEP}{}", member.descriptor()),
            Self::Remove { group, username } => format!("remove{SEP}{group}{SEP}{username}"),
        }
    }

    /// Decode a notification. Operations other than `add`/`remove` are
    /// rejected with [`ProtocolError::UnsupportedOperation`].
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let tokens: Vec<&str> = raw.split(SEP).collect();
        if tokens.len() != 3 {
            if matches!(tokens[0], "add" | "remove") {
                return Err(ProtocolError::InvalidNotification(raw.to_string()));
            }
            return Err(ProtocolError::UnsupportedOperation(tokens[0].to_string()));
        }

        validate_group_name(tokens[1])?;
        let group = tokens[1].to_string();

        match tokens[0] {
            "add" => Ok(Self::Add {
                group,
                member: Member::from_descriptor(tokens[2])?,
            }),
            "remove" => {
                // Either a full descriptor or a bare username.
                let username = if tokens[2].contains(',') {
                    Member::from_descriptor(tokens[2])?.username
                } else {
                    validate_username(tokens[2])?;
                    tokens[2].to_string()
                };
                Ok(Self::Remove { group, username })
            }
            other => Err(ProtocolError::UnsupportedOperation(other.to_string())),
        }
    }
}

// ============================================================================
// Reply encoding / decoding
// ============================================================================

/// `[a], [b], [c]`
pub fn encode_group_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|n| format!("[{}]", n))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn decode_group_list(reply: &str) -> Vec<String> {
    reply
        .split(", ")
        .map(|s| s.trim().trim_start_matches('[').trim_end_matches(']'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `(alice), (bob)`
pub fn encode_username_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|n| format!("({})", n))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn decode_username_list(reply: &str) -> Vec<String> {
    reply
        .split(", ")
        .map(|s| s.trim().trim_start_matches('(').trim_end_matches(')'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tab-joined member descriptors, as returned by `join`.
pub fn encode_member_list<'a>(members: impl IntoIterator<Item = &'a Member>) -> String {
    members
        .into_iter()
        .map(Member::descriptor)
        .collect::<Vec<_>>()
        .join("\t")
}

pub fn decode_member_list(reply: &str) -> Result<Vec<Member>, ProtocolError> {
    reply
        .split(SEP)
        .filter(|s| !s.trim().is_empty())
        .map(Member::from_descriptor)
        .collect()
}

/// Registration reply: the new id, or `None` when the username is taken.
pub fn decode_register_reply(reply: &str) -> Result<Option<MemberId>, ProtocolError> {
    let reply = reply.trim();
    if reply == REPLY_USERNAME_TAKEN {
        return Ok(None);
    }
    reply
        .parse()
        .map(Some)
        .map_err(|_| ProtocolError::InvalidReply(reply.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn alice() -> Member {
        Member::new(
            MemberId::new(1),
            "alice",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            4000,
            4001,
        )
    }

    #[test]
    fn test_register_wire() {
        let req = Request::decode("register\t127.0.0.1\t4000\t4001\talice").unwrap();
        assert_eq!(
            req,
            Request::Register {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                udp_port: 4000,
                tcp_port: 4001,
                username: "alice".into(),
            }
        );
        assert_eq!(req.encode(), "register\t127.0.0.1\t4000\t4001\talice");
        assert_eq!(req.member(), None);
    }

    #[test]
    fn test_member_commands() {
        let id = MemberId::new(9);
        assert_eq!(
            Request::decode("9\t!lg").unwrap(),
            Request::ListGroups { member: id }
        );
        assert_eq!(Request::decode("9\t!q").unwrap(), Request::Quit { member: id });
        assert_eq!(
            Request::decode("9\t!j\tlobby").unwrap(),
            Request::Join {
                member: id,
                group: "lobby".into()
            }
        );
        assert_eq!(
            Request::decode("9\t!e\tlobby").unwrap().member(),
            Some(id)
        );
        let lm = Request::ListMembers {
            member: id,
            group: "lobby".into(),
        };
        assert_eq!(Request::decode(&lm.encode()).unwrap(), lm);
    }

    #[test]
    fn test_invalid_requests() {
        assert!(Request::decode("").is_err());
        assert!(Request::decode("register\t127.0.0.1\t4000\talice").is_err());
        assert!(Request::decode("register\t127.0.0.1\t4000\t4001\tbad name").is_err());
        assert!(Request::decode("9\t!j").is_err());
        assert!(Request::decode("9\t!j\t").is_err());
        assert!(Request::decode("9\t!x\tlobby").is_err());
        assert!(Request::decode("nine\t!lg").is_err());
        assert!(Request::decode("9\t!lg\textra").is_err());
    }

    #[test]
    fn test_group_names_with_separators_are_rejected() {
        assert_eq!(
            Request::decode("9\t!j\tmy group"),
            Err(ProtocolError::InvalidGroupName("my group".into()))
        );
        for bad in ["a,b", "[lobby]", "(x)"] {
            assert!(Request::decode(&format!("9\t!j\t{}", bad)).is_err());
            assert!(Request::decode(&format!("9\t!lm\t{}", bad)).is_err());
        }
        assert!(Request::decode("9\t!j\tdev-team_2").is_ok());
        assert!(matches!(
            Notification::decode("remove\tmy group\talice"),
            Err(ProtocolError::InvalidGroupName(_))
        ));
    }

    #[test]
    fn test_notification_add() {
        let n = Notification::Add {
            group: "lobby".into(),
            member: alice(),
        };
        assert_eq!(n.encode(), "add\tlobby\t1,alice,127.0.0.1,4000,4001");
        assert_eq!(Notification::decode(&n.encode()).unwrap(), n);
    }

    #[test]
    fn test_notification_remove_accepts_descriptor_or_username() {
        let expected = Notification::Remove {
            group: "lobby".into(),
            username: "alice".into(),
        };
        let wire = format!("remove\tlobby\t{}", alice().descriptor());
        assert_eq!(Notification::decode(&wire).unwrap(), expected);
        assert_eq!(expected.encode(), "remove\tlobby\talice");
        assert_eq!(Notification::decode("remove\tlobby\talice").unwrap(), expected);
    }

    #[test]
    fn test_notification_unsupported_op() {
        assert_eq!(
            Notification::decode("rename\tlobby\talice"),
            Err(ProtocolError::UnsupportedOperation("rename".into()))
        );
        assert!(matches!(
            Notification::decode("garbage"),
            Err(ProtocolError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            Notification::decode("add\tlobby"),
            Err(ProtocolError::InvalidNotification(_))
        ));
    }

    #[test]
    fn test_group_and_username_lists() {
        let groups = encode_group_list(["a", "b"]);
        assert_eq!(groups, "[a], [b]");
        assert_eq!(decode_group_list(&groups), vec!["a", "b"]);
        assert!(decode_group_list("").is_empty());

        let users = encode_username_list(["alice", "bob"]);
        assert_eq!(users, "(alice), (bob)");
        assert_eq!(decode_username_list(&users), vec!["alice", "bob"]);
    }

    #[test]
    fn test_member_list() {
        let a = alice();
        let mut b = alice();
        b.id = MemberId::new(2);
        b.username = "bob".into();
        let wire = encode_member_list([&a, &b]);
        assert_eq!(decode_member_list(&wire).unwrap(), vec![a, b]);
        assert!(decode_member_list("").unwrap().is_empty());
    }

    #[test]
    fn test_register_reply() {
        assert_eq!(decode_register_reply("42").unwrap(), Some(MemberId::new(42)));
        assert_eq!(decode_register_reply("username taken").unwrap(), None);
        assert!(decode_register_reply("").is_err());
    }
}
