//! Cadence state owned by the orchestrator's control loop

use std::fmt;
use std::time::Duration;

use crate::cadence::MIN_KNOCK_INTERVAL;

/// Where the current cadence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceSource {
    /// Configured IP check interval (change-detection mode)
    CheckInterval,
    /// Derived from the configured TTL at startup
    Ttl,
    /// Derived from the TTL the API granted in a knock response
    TtlResponse,
}

impl CadenceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CadenceSource::CheckInterval => "check_interval",
            CadenceSource::Ttl => "ttl",
            CadenceSource::TtlResponse => "ttl_response",
        }
    }
}

impl fmt::Display for CadenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable cadence state
///
/// Invariant: `cadence > 0`. Zero or sub-second values are raised to
/// [`MIN_KNOCK_INTERVAL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    cadence: Duration,
    cadence_source: CadenceSource,
    next_knock_at_unix: i64,
}

impl Schedule {
    pub fn new(cadence: Duration, cadence_source: CadenceSource) -> Self {
        Self {
            cadence: cadence.max(MIN_KNOCK_INTERVAL),
            cadence_source,
            next_knock_at_unix: 0,
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn cadence_source(&self) -> CadenceSource {
        self.cadence_source
    }

    /// Next scheduled knock (0 = none)
    pub fn next_knock_at_unix(&self) -> i64 {
        self.next_knock_at_unix
    }

    /// Swap the cadence. Returns `false` (and changes nothing) if it is
    /// unchanged, so callers can skip timer resets and log lines.
    pub fn set_cadence(&mut self, cadence: Duration, source: CadenceSource) -> bool {
        let cadence = cadence.max(MIN_KNOCK_INTERVAL);
        if cadence == self.cadence {
            return false;
        }

        self.cadence = cadence;
        self.cadence_source = source;
        true
    }

    /// Record the next knock time. Returns `true` if it changed.
    pub fn update_next_knock(&mut self, at_unix: i64) -> bool {
        let at_unix = at_unix.max(0);
        if at_unix == self.next_knock_at_unix {
            return false;
        }

        self.next_knock_at_unix = at_unix;
        true
    }

    /// Next knock time one cadence after `now_unix`
    pub fn next_after(&self, now_unix: i64) -> i64 {
        now_unix.saturating_add(self.cadence.as_secs() as i64)
    }
}
