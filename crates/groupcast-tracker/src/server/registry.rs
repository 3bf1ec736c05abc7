// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Membership registry: every currently registered member, keyed by id.

use groupcast::{Member, MemberId};
use std::collections::HashMap;
use std::net::IpAddr;

/// Hands out member ids. Ids are never reused within a tracker run, so a
/// username freed by `quit` can be registered again under a fresh id.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> MemberId {
        let id = MemberId::new(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of all registered members.
#[derive(Debug, Default)]
pub struct MembershipRegistry {
    members: HashMap<MemberId, Member>,
    ids: IdAllocator,
}

impl MembershipRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member. Returns `None` if the username is already in use.
    pub fn register(
        &mut self,
        ip: IpAddr,
        udp_port: u16,
        tcp_port: u16,
        username: &str,
    ) -> Option<Member> {
        if self.username_taken(username) {
            return None;
        }
        let id = self.ids.allocate();
        let member = Member::new(id, username, ip, udp_port, tcp_port);
        self.members.insert(id, member.clone());
        Some(member)
    }

    pub fn username_taken(&self, username: &str) -> bool {
        self.members.values().any(|m| m.username == username)
    }

    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    pub fn remove(&mut self, id: MemberId) -> Option<Member> {
        self.members.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
