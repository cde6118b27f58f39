// # Lease Tracker
//
// Holds the locally believed whitelist grant and detects its expiry.
//
// ## Lifecycle
//
// - Created/replaced on every successful knock that carries TTL data
// - Cleared (to `None`, never to a zeroed value) once wall-clock time
//   reaches `expires_at_unix`
// - Not persisted: lost on restart
//
// The tracker is owned by the orchestrator's control loop, which is its only
// writer, so it carries no locking of its own.

use std::fmt;

use crate::traits::KnockResponse;

/// Who caused a knock (and therefore last refreshed the lease)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    /// Manual one-shot knock from the command line
    Cli,
    /// The orchestrator's own ticking schedule
    Schedule,
    /// Reserved for future external triggers
    External,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Schedule => "schedule",
            TriggerSource::External => "external",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The currently believed-valid whitelist grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Whitelisted address (empty = unknown)
    pub ip: String,
    /// Unix timestamp of expiry (0 = no known expiry)
    pub expires_at_unix: i64,
    /// Granted TTL in seconds (0 = unknown)
    pub ttl_seconds: i64,
    /// Who last refreshed it
    pub source: TriggerSource,
}

impl Lease {
    /// Whether the lease has lapsed at `now_unix`
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires_at_unix > 0 && now_unix >= self.expires_at_unix
    }
}

/// Result of one knock attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnockOutcome {
    pub success: bool,
    pub whitelisted_ip: String,
    pub ttl_seconds: i64,
    pub expires_at_unix: i64,
    pub error: Option<String>,
}

impl KnockOutcome {
    /// Successful knock. The API's whitelisted entry wins over the address
    /// we asked for; in blind mode we asked for nothing.
    pub fn succeeded(requested_ip: Option<&str>, response: &KnockResponse) -> Self {
        let whitelisted_ip = if response.whitelisted_entry.is_empty() {
            requested_ip.unwrap_or_default().to_string()
        } else {
            response.whitelisted_entry.clone()
        };

        Self {
            success: true,
            whitelisted_ip,
            ttl_seconds: response.expires_in_seconds,
            expires_at_unix: response.expires_at,
            error: None,
        }
    }

    /// Failed knock
    pub fn failed(requested_ip: Option<&str>, error: &crate::Error) -> Self {
        Self {
            success: false,
            whitelisted_ip: requested_ip.unwrap_or_default().to_string(),
            ttl_seconds: 0,
            expires_at_unix: 0,
            error: Some(error.to_string()),
        }
    }

    /// Whether this outcome can establish a lease
    pub fn carries_lease(&self) -> bool {
        self.success && self.ttl_seconds > 0 && self.expires_at_unix > 0
    }
}

/// A lease that was just cleared by an expiry check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredLease {
    pub ip: String,
    pub expires_at_unix: i64,
}

/// Tracks the current lease
#[derive(Debug, Default)]
pub struct LeaseTracker {
    current: Option<Lease>,
}

impl LeaseTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lease from a knock outcome.
    ///
    /// Returns `true` if the lease was replaced. Outcomes without TTL data
    /// (or failed ones) leave the current lease untouched.
    pub fn apply(&mut self, outcome: &KnockOutcome, source: TriggerSource) -> bool {
        if !outcome.carries_lease() {
            return false;
        }

        self.current = Some(Lease {
            ip: outcome.whitelisted_ip.clone(),
            expires_at_unix: outcome.expires_at_unix,
            ttl_seconds: outcome.ttl_seconds,
            source,
        });
        true
    }

    /// Clear the lease if it has lapsed at `now_unix`.
    ///
    /// Returns the cleared lease exactly once; further calls are no-ops.
    pub fn check_expiry(&mut self, now_unix: i64) -> Option<ExpiredLease> {
        if !self.current.as_ref()?.is_expired(now_unix) {
            return None;
        }

        self.current.take().map(|lease| ExpiredLease {
            ip: lease.ip,
            expires_at_unix: lease.expires_at_unix,
        })
    }

    /// Current lease, if any
    pub fn current(&self) -> Option<&Lease> {
        self.current.as_ref()
    }
}
