// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lamport logical clock.

/// Monotonic logical clock.
///
/// - `tick()` on a local send
/// - `observe(ts)` on receipt: `max(local, ts) + 1`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LamportClock {
    time: u64,
}

impl LamportClock {
    #[must_use]
    pub fn new() -> Self {
        Self { time: 0 }
    }

    #[inline]
    #[must_use]
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Advance for a local event and return the new timestamp.
    pub fn tick(&mut self) -> u64 {
        self.time += 1;
        self.time
    }

    /// Merge a received timestamp.
    pub fn observe(&mut self, remote: u64) -> u64 {
        self.time = self.time.max(remote) + 1;
        self.time
    }
}
