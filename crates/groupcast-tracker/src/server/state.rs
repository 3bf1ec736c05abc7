// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracker membership state machine.
//!
//! Per member: `UNREGISTERED -> REGISTERED -> (IN_GROUP)* -> QUIT`.
//!
//! [`TrackerState`] performs no I/O: every request yields the reply for the
//! requester plus the notifications to push to other members, which the
//! server loop delivers afterwards in order.

use super::directory::GroupDirectory;
use super::registry::MembershipRegistry;
use groupcast::control::{
    encode_group_list, encode_member_list, encode_username_list, REPLY_EXIT_GROUP_OK,
    REPLY_QUIT_OK, REPLY_UNKNOWN_GROUP, REPLY_UNKNOWN_MEMBER, REPLY_USERNAME_TAKEN,
};
use groupcast::{Member, MemberId, Notification, Request};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Recoverable request failures, answered with a negative reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Username {0:?} is taken")]
    UsernameTaken(String),

    #[error("Unknown group {0:?}")]
    UnknownGroup(String),

    #[error("Unknown member {0}")]
    UnknownMember(MemberId),
}

impl RequestError {
    /// Wire reply for this failure.
    pub fn reply(&self) -> &'static str {
        match self {
            Self::UsernameTaken(_) => REPLY_USERNAME_TAKEN,
            Self::UnknownGroup(_) => REPLY_UNKNOWN_GROUP,
            Self::UnknownMember(_) => REPLY_UNKNOWN_MEMBER,
        }
    }
}

/// A notification to push to one member's control listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub target: Member,
    pub notification: Notification,
}

/// Result of handling one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reply: String,
    pub notices: Vec<Notice>,
}

impl Outcome {
    fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            notices: Vec::new(),
        }
    }
}

/// All tracker state, owned by the server loop.
#[derive(Debug, Default)]
pub struct TrackerState {
    registry: MembershipRegistry,
    directory: GroupDirectory,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &MembershipRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &GroupDirectory {
        &self.directory
    }

    /// Handle one decoded request.
    pub fn handle(&mut self, request: Request) -> Outcome {
        match self.dispatch(request) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Request rejected: {}", e);
                Outcome::reply(e.reply())
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Result<Outcome, RequestError> {
        match request {
            Request::Register {
                ip,
                udp_port,
                tcp_port,
                username,
            } => {
                let member = self
                    .registry
                    .register(ip, udp_port, tcp_port, &username)
                    .ok_or(RequestError::UsernameTaken(username))?;
                info!("Registered {} as {}", member.username, member.id);
                Ok(Outcome::reply(member.id.to_string()))
            }

            Request::ListGroups { member } => {
                self.requester(member)?;
                Ok(Outcome::reply(encode_group_list(self.directory.group_names())))
            }

            Request::ListMembers { member, group } => {
                self.requester(member)?;
                let members = self.resolve(&group)?;
                Ok(Outcome::reply(encode_username_list(
                    members.iter().map(|m| m.username.as_str()),
                )))
            }

            Request::Join { member, group } => {
                let member = self.requester(member)?;
                let added = self.directory.join(&group, member.id);
                let members = self.resolve(&group)?;
                let reply = encode_member_list(members.iter());

                let notices = if added {
                    info!("{} joined {}", member.username, group);
                    members
                        .iter()
                        .filter(|m| m.id != member.id)
                        .map(|target| Notice {
                            target: target.clone(),
                            notification: Notification::Add {
                                group: group.clone(),
                                member: member.clone(),
                            },
                        })
                        .collect()
                } else {
                    debug!("{} already in {}", member.username, group);
                    Vec::new()
                };

                Ok(Outcome { reply, notices })
            }

            Request::Leave { member, group } => {
                let member = self.requester(member)?;
                let notices = self.leave_group(&member, &group);
                Ok(Outcome {
                    reply: REPLY_EXIT_GROUP_OK.to_string(),
                    notices,
                })
            }

            Request::Quit { member } => {
                let member = self.requester(member)?;
                let notices = self.remove_member(&member);
                info!("{} ({}) quit", member.username, member.id);
                Ok(Outcome {
                    reply: REPLY_QUIT_OK.to_string(),
                    notices,
                })
            }
        }
    }

    fn requester(&self, id: MemberId) -> Result<Member, RequestError> {
        self.registry
            .get(id)
            .cloned()
            .ok_or(RequestError::UnknownMember(id))
    }

    /// Remove a member the tracker detected as gone. Produces the same
    /// notifications as a quit.
    pub fn evict(&mut self, id: MemberId) -> Vec<Notice> {
        match self.registry.get(id).cloned() {
            Some(member) => {
                warn!("Evicting unreachable member {} ({})", member.username, id);
                self.remove_member(&member)
            }
            None => Vec::new(),
        }
    }

    fn remove_member(&mut self, member: &Member) -> Vec<Notice> {
        let mut notices = Vec::new();
        for group in self.directory.remove_everywhere(member.id) {
            info!("{} left {}", member.username, group);
            notices.extend(self.departure_notices(member, &group));
        }
        self.registry.remove(member.id);
        notices
    }

    fn leave_group(&mut self, member: &Member, group: &str) -> Vec<Notice> {
        if !self.directory.leave(group, member.id) {
            debug!("{} not in {}, leave is a no-op", member.username, group);
            return Vec::new();
        }
        info!("{} left {}", member.username, group);
        self.departure_notices(member, group)
    }

    /// `remove` notices for the members still in `group`.
    fn departure_notices(&self, member: &Member, group: &str) -> Vec<Notice> {
        self.resolve(group)
            .unwrap_or_default()
            .into_iter()
            .map(|target| Notice {
                target,
                notification: Notification::Remove {
                    group: group.to_string(),
                    username: member.username.clone(),
                },
            })
            .collect()
    }

    /// Current members of `group`, in join order.
    fn resolve(&self, group: &str) -> Result<Vec<Member>, RequestError> {
        let ids = self
            .directory
            .members_of(group)
            .ok_or_else(|| RequestError::UnknownGroup(group.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| self.registry.get(*id).cloned())
            .collect())
    }
}
