// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interactive commands.
//!
//! | input        | command                         |
//! |--------------|---------------------------------|
//! | `!lg`        | list groups                     |
//! | `!lm <g>`    | list members of a group         |
//! | `!j <g>`     | join a group                    |
//! | `!e <g>`     | exit a group                    |
//! | `!w <g>`     | select the group to write to    |
//! | `!q`         | quit                            |
//! | anything else not starting with `!` | chat message |

use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListGroups,
    ListMembers(String),
    Join(String),
    Leave(String),
    Select(String),
    Quit,
    Send(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid command: {0:?}")]
    Invalid(String),
}

fn command_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^!(lg|q|lm|j|e|w)(?:\s+([A-Za-z0-9_-]+))?$").expect("command regex is valid")
    })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let trimmed = line.trim();
        let invalid = || CommandError::Invalid(trimmed.to_string());

        if trimmed.is_empty() {
            return Err(invalid());
        }
        if !trimmed.starts_with('!') {
            return Ok(Self::Send(line.trim_end_matches(['\r', '\n']).trim_start().to_string()));
        }

        let caps = command_regex().captures(trimmed).ok_or_else(invalid)?;
        let group = caps.get(2).map(|m| m.as_str().to_string());

        match (&caps[1], group) {
            ("lg", None) => Ok(Self::ListGroups),
            ("q", None) => Ok(Self::Quit),
            ("lm", Some(g)) => Ok(Self::ListMembers(g)),
            ("j", Some(g)) => Ok(Self::Join(g)),
            ("e", Some(g)) => Ok(Self::Leave(g)),
            ("w", Some(g)) => Ok(Self::Select(g)),
            _ => Err(invalid()),
        }
    }
}
