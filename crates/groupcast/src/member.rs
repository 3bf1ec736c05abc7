// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Members and groups.
//!
//! A member is identified by the [`MemberId`] the tracker hands out at
//! registration. Usernames are only unique among currently registered
//! members, so collections are always keyed by id.

use crate::control::ProtocolError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::OnceLock;

/// Opaque member identifier assigned by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(u64);

impl MemberId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ProtocolError::InvalidMemberId(s.to_string()))
    }
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static username pattern"))
}

/// Check a username against `^[A-Za-z0-9_.-]+$`.
pub fn validate_username(username: &str) -> Result<(), ProtocolError> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidUsername(username.to_string()))
    }
}

fn group_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static group name pattern"))
}

/// Check a group name against `^[A-Za-z0-9_-]+$`. Anything else would
/// collide with the datagram or list separators.
pub fn validate_group_name(group: &str) -> Result<(), ProtocolError> {
    if group_name_pattern().is_match(group) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidGroupName(group.to_string()))
    }
}

/// A registered participant and its contact information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub username: String,
    pub ip: IpAddr,
    /// Data-plane datagram port.
    pub udp_port: u16,
    /// Control-listener port the tracker pushes notifications to.
    pub tcp_port: u16,
}

impl Member {
    pub fn new(
        id: MemberId,
        username: impl Into<String>,
        ip: IpAddr,
        udp_port: u16,
        tcp_port: u16,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            ip,
            udp_port,
            tcp_port,
        }
    }

    /// Address chat datagrams are sent to.
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.udp_port)
    }

    /// Address of the member's control listener.
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.tcp_port)
    }

    /// Wire descriptor: `id,username,ip,udp_port,tcp_port`.
    pub fn descriptor(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.id, self.username, self.ip, self.udp_port, self.tcp_port
        )
    }

    /// Parse a wire descriptor produced by [`Member::descriptor`].
    pub fn from_descriptor(s: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = s.trim().split(',').collect();
        if fields.len() != 5 {
            return Err(ProtocolError::InvalidDescriptor(s.to_string()));
        }

        let id: MemberId = fields[0].parse()?;
        let username = fields[1].to_string();
        validate_username(&username)?;
        let ip: IpAddr = fields[2]
            .parse()
            .map_err(|_| ProtocolError::InvalidDescriptor(s.to_string()))?;
        let udp_port: u16 = fields[3]
            .parse()
            .map_err(|_| ProtocolError::InvalidDescriptor(s.to_string()))?;
        let tcp_port: u16 = fields[4]
            .parse()
            .map_err(|_| ProtocolError::InvalidDescriptor(s.to_string()))?;

        Ok(Self::new(id, username, ip, udp_port, tcp_port))
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// A named group: an insertion-ordered set of members, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    name: String,
    members: Vec<Member>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Build a group from a member list, dropping duplicate ids.
    pub fn with_members(name: impl Into<String>, members: impl IntoIterator<Item = Member>) -> Self {
        let mut group = Self::new(name);
        for member in members {
            group.add(member);
        }
        group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    /// Add a member. Returns `false` if a member with that id is already present.
    pub fn add(&mut self, member: Member) -> bool {
        if self.contains(member.id) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Remove by id. Absent ids are a no-op.
    pub fn remove_by_id(&mut self, id: MemberId) -> Option<Member> {
        let pos = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(pos))
    }

    /// Remove by username. Absent usernames are a no-op.
    pub fn remove_by_username(&mut self, username: &str) -> Option<Member> {
        let pos = self.members.iter().position(|m| m.username == username)?;
        Some(self.members.remove(pos))
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.username.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn member(id: u64, name: &str) -> Member {
        Member::new(
            MemberId::new(id),
            name,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            40000 + id as u16,
            41000 + id as u16,
        )
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let m = member(7, "alice");
        assert_eq!(m.descriptor(), "7,alice,127.0.0.1,40007,41007");
        assert_eq!(Member::from_descriptor(&m.descriptor()).unwrap(), m);
    }

    #[test]
    fn test_descriptor_rejects_garbage() {
        assert!(Member::from_descriptor("7,alice,127.0.0.1,40007").is_err());
        assert!(Member::from_descriptor("x,alice,127.0.0.1,1,2").is_err());
        assert!(Member::from_descriptor("7,al ice,127.0.0.1,1,2").is_err());
        assert!(Member::from_descriptor("7,alice,nowhere,1,2").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b-c_9").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("tab\tname").is_err());
        assert!(validate_username("comma,name").is_err());
    }

    #[test]
    fn test_group_add_is_idempotent() {
        let mut g = Group::new("lobby");
        assert!(g.add(member(1, "alice")));
        assert!(!g.add(member(1, "alice")));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_group_remove() {
        let mut g = Group::with_members("lobby", [member(1, "alice"), member(2, "bob")]);
        assert!(g.remove_by_username("carol").is_none());
        assert_eq!(g.remove_by_username("alice").unwrap().id, MemberId::new(1));
        assert!(g.remove_by_id(MemberId::new(1)).is_none());
        assert_eq!(g.usernames().collect::<Vec<_>>(), vec!["bob"]);
    }

    #[test]
    fn test_addresses() {
        let m = member(3, "carol");
        assert_eq!(m.udp_addr().port(), 40003);
        assert_eq!(m.control_addr().port(), 41003);
    }
}
