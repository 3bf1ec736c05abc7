// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Group directory: group name -> ordered member ids.
//!
//! Groups are created on first join and are never deleted; a group whose
//! last member left stays listed with no members.

use groupcast::MemberId;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct GroupDirectory {
    groups: BTreeMap<String, Vec<MemberId>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `member` to `group`, creating the group if needed.
    /// Returns `false` if the member was already in the group.
    pub fn join(&mut self, group: &str, member: MemberId) -> bool {
        let members = self.groups.entry(group.to_string()).or_default();
        if members.contains(&member) {
            return false;
        }
        members.push(member);
        true
    }

    /// Remove `member` from `group`. Returns `false` if either is absent.
    pub fn leave(&mut self, group: &str, member: MemberId) -> bool {
        match self.groups.get_mut(group) {
            Some(members) => {
                let before = members.len();
                members.retain(|m| *m != member);
                members.len() != before
            }
            None => false,
        }
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn members_of(&self, group: &str) -> Option<&[MemberId]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// All group names, sorted.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Groups `member` currently belongs to, sorted.
    pub fn groups_of(&self, member: MemberId) -> Vec<String> {
        self.groups
            .iter()
            .filter(|(_, members)| members.contains(&member))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Remove `member` from every group. Returns the groups it was in, sorted.
    pub fn remove_everywhere(&mut self, member: MemberId) -> Vec<String> {
        let mut left = Vec::new();
        for (name, members) in self.groups.iter_mut() {
            let before = members.len();
            members.retain(|m| *m != member);
            if members.len() != before {
                left.push(name.clone());
            }
        }
        left
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
