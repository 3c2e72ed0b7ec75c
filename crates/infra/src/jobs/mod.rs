//! Recurring background execution of units.
//!
//! A [`RecurringJob`] fires its unit on a fixed interval. Every tick runs on
//! its own thread, so slow executions may overlap. Results land in two
//! bounded queues which the owner drains with a [`DrainHandle`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

mod drain;
mod recurring;

pub use drain::DrainHandle;
pub use recurring::RecurringJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job is already running")]
    AlreadyRunning,

    #[error("job has been stopped and cannot be restarted")]
    Stopped,
}

/// What a tick does when its result queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the new result and count it in [`JobStats::dropped`].
    #[default]
    DropNewest,
    /// Block the tick thread until a consumer makes room.
    Block,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" | "drop_newest" => Ok(Self::DropNewest),
            "block" => Ok(Self::Block),
            other => Err(format!("unknown overflow policy '{other}' (expected drop|block)")),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DropNewest => "drop",
            Self::Block => "block",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    /// Capacity of each result queue.
    pub buffer: usize,
    pub overflow: OverflowPolicy,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            buffer: 64,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl JobConfig {
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

/// Point-in-time counters for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub ticks: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Results discarded because a queue was full or closed.
    pub dropped: u64,
    pub in_flight: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_policy_parses_config_spellings() {
        assert_eq!("drop".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropNewest);
        assert_eq!(" Block ".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Block);
        assert!("oldest".parse::<OverflowPolicy>().is_err());
    }
}
