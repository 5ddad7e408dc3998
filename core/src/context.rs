//! `RuntimeContext`: host state observed at decision time.
//!
//! Conditions such as [`Condition::RunningStatus`](crate::Condition::RunningStatus)
//! and [`Condition::NetworkQuality`](crate::Condition::NetworkQuality) read from
//! this snapshot, never from the host directly, so that one routing decision
//! sees one consistent view.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Whether the programmable handler is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunningStatus {
    /// The handler is running and can be invoked without a cold start.
    #[default]
    Running,
    /// The handler must be started before it can be invoked.
    NotRunning,
}

impl std::fmt::Display for RunningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::NotRunning => f.write_str("not-running"),
        }
    }
}

/// Source of runtime observations, implemented by the host.
pub trait RuntimeProbe: Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Current running status of the programmable handler.
    fn running_status(&self) -> RunningStatus;

    /// Current round-trip-time estimate in milliseconds.
    fn rtt_ms(&self) -> u64;
}

/// Immutable per-decision snapshot of host state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeContext {
    /// Running status of the programmable handler.
    pub running_status: RunningStatus,
    /// Round-trip-time estimate in milliseconds.
    pub rtt_ms: u64,
    /// Wall-clock time in milliseconds since the Unix epoch.
    pub now_ms: u64,
}

impl RuntimeContext {
    /// A context at the given time, handler running, zero RTT.
    #[must_use]
    pub fn at(now_ms: u64) -> Self {
        Self {
            now_ms,
            ..Self::default()
        }
    }

    /// Take a snapshot from a probe.
    #[must_use]
    pub fn capture(probe: &dyn RuntimeProbe) -> Self {
        Self {
            running_status: probe.running_status(),
            rtt_ms: probe.rtt_ms(),
            now_ms: probe.now_ms(),
        }
    }

    /// Set the running status (builder pattern).
    #[must_use]
    pub fn with_running_status(mut self, status: RunningStatus) -> Self {
        self.running_status = status;
        self
    }

    /// Set the RTT estimate (builder pattern).
    #[must_use]
    pub fn with_rtt_ms(mut self, rtt_ms: u64) -> Self {
        self.rtt_ms = rtt_ms;
        self
    }
}

/// Milliseconds since the Unix epoch according to the system clock.
///
/// Clocks set before 1970 read as `0`.
#[must_use]
pub fn system_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
