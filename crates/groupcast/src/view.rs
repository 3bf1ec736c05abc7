// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local group view: a peer's replica of the groups it has joined.
//!
//! Kept consistent by the replies to this peer's own `join`/`leave`
//! requests and by `add`/`remove` notifications pushed by the tracker.

use crate::control::Notification;
use crate::member::{Group, Member};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("Not a member of group {0:?}")]
    NotJoined(String),
}

/// Effect of applying a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewChange {
    Added { group: String, member: Member },
    Removed { group: String, member: Member },
    Unchanged,
}

#[derive(Debug, Default)]
pub struct LocalGroupView {
    groups: BTreeMap<String, Group>,
    selected: Option<String>,
}

impl LocalGroupView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful join with the member list returned by the tracker.
    pub fn on_joined(&mut self, group: &str, members: Vec<Member>) {
        debug!("Joined {} with {} members", group, members.len());
        self.groups
            .insert(group.to_string(), Group::with_members(group, members));
    }

    /// Record that this peer left `group`. Clears the selection if it pointed
    /// at that group. Returns whether the group was known.
    pub fn on_left(&mut self, group: &str) -> bool {
        if self.selected.as_deref() == Some(group) {
            self.selected = None;
        }
        self.groups.remove(group).is_some()
    }

    /// Apply a tracker push notification.
    pub fn apply(&mut self, notification: &Notification) -> ViewChange {
        let Some(group) = self.groups.get_mut(notification.group()) else {
            warn!(
                "Notification for group {:?} we are not in, ignoring",
                notification.group()
            );
            return ViewChange::Unchanged;
        };

        match notification {
            Notification::Add { group: name, member } => {
                if group.add(member.clone()) {
                    ViewChange::Added {
                        group: name.clone(),
                        member: member.clone(),
                    }
                } else {
                    ViewChange::Unchanged
                }
            }
            Notification::Remove {
                group: name,
                username,
            } => match group.remove_by_username(username) {
                Some(member) => ViewChange::Removed {
                    group: name.clone(),
                    member,
                },
                None => ViewChange::Unchanged,
            },
        }
    }

    /// Select the group outgoing messages are sent to.
    pub fn select(&mut self, group: &str) -> Result<(), ViewError> {
        if !self.groups.contains_key(group) {
            return Err(ViewError::NotJoined(group.to_string()));
        }
        self.selected = Some(group.to_string());
        Ok(())
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Group> {
        self.selected.as_deref().and_then(|g| self.groups.get(g))
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
