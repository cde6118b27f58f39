// # Manual Knock
//
// One-shot knock triggered from outside the loop (e.g. `knockerd` in knock
// mode). Reported with trigger source `cli`.
//
// Manual knocks do not share state with a running orchestrator: the loop's
// lease and cadence only follow its own scheduled knocks.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::events::EventEmitter;
use crate::lease::{KnockOutcome, TriggerSource};
use crate::traits::ApiClient;

use super::knock_once;

/// Knock once and report the attempt with source `cli`
///
/// Never fails: the returned outcome carries the error instead. The API is
/// left to infer the address to whitelist.
pub async fn manual_knock(
    client: &dyn ApiClient,
    events: &EventEmitter,
    ttl_seconds: i64,
) -> KnockOutcome {
    let timeout = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);

    match knock_once(client, events, None, ttl_seconds, TriggerSource::Cli, timeout).await {
        Ok(outcome) => {
            events.whitelist_applied(
                &outcome.whitelisted_ip,
                outcome.ttl_seconds,
                outcome.expires_at_unix,
                TriggerSource::Cli,
            );
            info!(
                "Manual knock succeeded: whitelisted {} for {}s",
                outcome.whitelisted_ip, outcome.ttl_seconds
            );
            outcome
        }
        Err(e) => {
            warn!("Manual knock failed: {}", e);
            KnockOutcome::failed(None, &e)
        }
    }
}
