//! Cadence calculation
//!
//! Pure functions deriving the knock/check interval and the process-manager
//! restart back-off from configuration and server-reported TTLs. All TTL
//! arithmetic is done in whole seconds.

use std::time::Duration;

/// Check interval used when none (or an invalid one) is configured
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Knock cadence used when the TTL is unknown
pub const DEFAULT_KNOCK_INTERVAL: Duration = DEFAULT_CHECK_INTERVAL;

/// Restart delay used when the TTL is unknown; also the ceiling
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(30);

/// Floor for the restart delay
pub const MIN_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Smallest knock cadence ever produced
pub const MIN_KNOCK_INTERVAL: Duration = Duration::from_secs(1);

/// Longest interval ever produced (one year), so deadlines stay representable
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Make sure the configured IP check cadence is usable.
pub fn normalize_check_interval(configured: Duration) -> Duration {
    if configured.is_zero() {
        return DEFAULT_CHECK_INTERVAL;
    }
    configured.min(MAX_INTERVAL)
}

/// Knock cadence for a TTL-driven (blind) schedule.
///
/// Keeps a 10% buffer so the whitelist is refreshed before it lapses:
/// `ttl - ttl / 10`, floored at one second and never longer than the TTL
/// (or [`MAX_INTERVAL`]).
pub fn knock_cadence_from_ttl(ttl_seconds: i64) -> Duration {
    if ttl_seconds <= 0 {
        return DEFAULT_KNOCK_INTERVAL;
    }

    let ttl = ttl_seconds as u64;
    let adjusted = Duration::from_secs(ttl - ttl / 10);
    let ceiling = Duration::from_secs(ttl);

    adjusted.max(MIN_KNOCK_INTERVAL).min(ceiling).min(MAX_INTERVAL)
}

/// Restart back-off for a managed service: a quarter of the TTL, kept within
/// `[MIN_RESTART_DELAY, DEFAULT_RESTART_DELAY]`.
pub fn restart_delay(ttl_seconds: i64) -> Duration {
    if ttl_seconds <= 0 {
        return DEFAULT_RESTART_DELAY;
    }

    Duration::from_secs(ttl_seconds as u64 / 4).clamp(MIN_RESTART_DELAY, DEFAULT_RESTART_DELAY)
}
