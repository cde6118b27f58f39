//! Knock orchestrator
//!
//! The KnockOrchestrator is responsible for:
//! - Verifying the API is reachable before entering service
//! - Knocking on a TTL-derived cadence (blind mode), or whenever the public
//!   IP changes (change-detection mode)
//! - Tracking the whitelist lease and reporting when it lapses
//! - Emitting lifecycle events for every observable state change
//!
//! ## Architecture
//!
//! ```text
//!                   ┌──────────────┐
//!  cancel / stop ──▶│ Orchestrator │◀── timer (cadence)
//!                   └──────────────┘
//!                          │
//!      ┌───────────────────┼───────────────────┬──────────────────┐
//!      ▼                   ▼                   ▼                  ▼
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ IpResolver │   │  ApiClient   │   │ LeaseTracker │   │ EventEmitter │
//! │ (lookup)   │   │ (knock)      │   │ (expiry)     │   │ (notify)     │
//! └────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Clear the lease if it has lapsed (emit expired + snapshot)
//! 2. Blind: knock. Change detection: resolve, compare, health check, knock
//! 3. On success: update the lease, adjust cadence (blind only), emit
//!    applied + snapshot
//! 4. Reset the timer to the (possibly new) cadence and publish the next
//!    knock time
//!
//! Lease and schedule are only ever touched from the loop task, so they need
//! no locking. Stop requests reach the loop through a [`StopHandle`].

mod lifecycle;
mod manual;
mod schedule;

pub use lifecycle::{LifecycleState, StopHandle};
pub use manual::manual_knock;
pub use schedule::{CadenceSource, Schedule};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cadence::{knock_cadence_from_ttl, normalize_check_interval};
use crate::config::{KnockMode, KnockerConfig};
use crate::error::{Error, Result};
use crate::events::{ErrorCode, EventEmitter, KnockResult, ServiceState};
use crate::lease::{KnockOutcome, Lease, LeaseTracker, TriggerSource};
use crate::traits::{ApiClient, Clock, IpResolver, SystemClock};

use lifecycle::Lifecycle;

/// Core knock orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`KnockOrchestrator::new()`]
/// 2. Grab a [`StopHandle`] if something else needs to stop it
/// 3. Start with [`KnockOrchestrator::run()`], which consumes the orchestrator
/// 4. The loop runs until the cancel token fires or `stop()` is called
///
/// ## Failure Policy
///
/// Only the initial health check is fatal. Lookup, health and knock failures
/// during a tick are reported as `Error` events and retried on the next tick.
pub struct KnockOrchestrator {
    /// Whitelist API
    client: Box<dyn ApiClient>,

    /// Public IP lookup (change-detection mode only)
    resolver: Box<dyn IpResolver>,

    /// Event emission
    events: EventEmitter,

    /// Wall clock for lease expiry and next-knock timestamps
    clock: Arc<dyn Clock>,

    /// Operating mode
    mode: KnockMode,

    /// Requested TTL in seconds
    ttl_seconds: i64,

    /// Deadline for each API / resolver call
    request_timeout: Duration,

    /// Cadence and next knock time
    schedule: Schedule,

    /// Current whitelist lease
    lease: LeaseTracker,

    /// Last IP successfully knocked in change-detection mode
    last_ip: Option<String>,

    lifecycle: Lifecycle,
    stop: StopHandle,
}

impl KnockOrchestrator {
    /// Create a new orchestrator
    ///
    /// # Parameters
    ///
    /// - `config`: Knocker configuration (validated here)
    /// - `client`: Whitelist API client
    /// - `resolver`: Public IP resolver, only used when `ip_check_url` is set
    /// - `events`: Event emitter
    pub fn new(
        config: KnockerConfig,
        client: Box<dyn ApiClient>,
        resolver: Box<dyn IpResolver>,
        events: EventEmitter,
    ) -> Result<Self> {
        config.validate()?;

        let events = if config.orchestrator.version.is_empty() {
            events
        } else {
            events.with_version(config.orchestrator.version.clone())
        };

        let mode = config.mode();
        let schedule = match mode {
            KnockMode::Blind => Schedule::new(
                knock_cadence_from_ttl(config.ttl_seconds),
                CadenceSource::Ttl,
            ),
            KnockMode::ChangeDetection { .. } => Schedule::new(
                normalize_check_interval(config.check_interval()),
                CadenceSource::CheckInterval,
            ),
        };

        let lifecycle = Lifecycle::new();
        let stop = StopHandle::new(lifecycle.clone(), events.clone());

        Ok(Self {
            client,
            resolver,
            events,
            clock: Arc::new(SystemClock::new()),
            mode,
            ttl_seconds: config.ttl_seconds,
            request_timeout: config.request_timeout(),
            schedule,
            lease: LeaseTracker::new(),
            last_ip: None,
            lifecycle,
            stop,
        })
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle for stopping the loop from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    /// Current cadence and next knock time
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Operating mode
    pub fn mode(&self) -> &KnockMode {
        &self.mode
    }

    /// Current whitelist lease
    pub fn lease(&self) -> Option<&Lease> {
        self.lease.current()
    }

    /// Run the orchestrator
    ///
    /// Performs the initial health check, then runs the knock loop until
    /// `cancel` fires or a [`StopHandle`] requests a stop. Both signals are
    /// observed between ticks; an in-flight knock completes first.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error::StartupFatal)`: Initial health check failed; no events
    ///   were emitted
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("Checking API health at {}", self.client.base_url());
        let health = with_deadline(
            self.request_timeout,
            "health check",
            self.client.health_check(),
        )
        .await;
        if let Err(e) = health {
            self.lifecycle.set(LifecycleState::Stopped);
            return Err(Error::startup_fatal(format!(
                "API not reachable at startup: {}",
                e
            )));
        }

        self.lifecycle.set(LifecycleState::Running);
        self.events.service_state(ServiceState::Started);
        self.log_start();

        self.publish_next_knock();
        self.events
            .status_snapshot(self.lease.current(), self.schedule.next_knock_at_unix());

        let stop = self.stop.token().clone();
        let sleep = tokio::time::sleep(self.schedule.cadence());
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = stop.cancelled() => {
                    info!("Stop requested");
                    break;
                }

                _ = &mut sleep => {
                    self.tick().await;

                    sleep.as_mut().reset(Instant::now() + self.schedule.cadence());
                    self.publish_next_knock();
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn log_start(&self) {
        match &self.mode {
            KnockMode::Blind => info!(
                "Service running. Knocking every {:?} (source: {})",
                self.schedule.cadence(),
                self.schedule.cadence_source()
            ),
            KnockMode::ChangeDetection { url } => info!(
                "Service running. Checking IP via {} every {:?}",
                url,
                self.schedule.cadence()
            ),
        }
    }

    fn shutdown(&mut self) {
        self.stop.notify_stopping();
        self.check_expiry();

        if self.schedule.update_next_knock(0) {
            self.events.next_knock_updated(0);
        }
        self.events
            .status_snapshot(self.lease.current(), self.schedule.next_knock_at_unix());
        self.events.service_state(ServiceState::Stopped);

        self.lifecycle.set(LifecycleState::Stopped);
        info!("Knocker service stopped");
    }

    async fn tick(&mut self) {
        self.check_expiry();

        match self.mode.clone() {
            KnockMode::Blind => self.blind_knock().await,
            KnockMode::ChangeDetection { url } => self.check_and_knock(&url).await,
        }
    }

    async fn blind_knock(&mut self) {
        info!("Knocking without IP check...");
        if let Err(e) = self.perform_knock(None).await {
            warn!("Knock failed, will retry next tick: {}", e);
        }
    }

    async fn check_and_knock(&mut self, url: &str) {
        let lookup = with_deadline(
            self.request_timeout,
            "IP lookup",
            self.resolver.public_ip(url),
        )
        .await;

        let ip = match lookup {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Error getting public IP: {}", e);
                self.events.error(
                    ErrorCode::IpLookupFailed,
                    &format!("IP lookup failed: {}", e),
                    url,
                );
                return;
            }
        };

        if self.last_ip.as_deref() == Some(ip.as_str()) {
            debug!("IP unchanged ({}), skipping knock", ip);
            return;
        }

        match &self.last_ip {
            Some(previous) => info!("IP changed from {} to {}. Knocking...", previous, ip),
            None => info!("Public IP is {}. Knocking...", ip),
        }

        let health = with_deadline(
            self.request_timeout,
            "health check",
            self.client.health_check(),
        )
        .await;
        if let Err(e) = health {
            warn!("API health check failed, skipping knock: {}", e);
            self.events.error(
                ErrorCode::HealthCheckFailed,
                &format!("Health check failed: {}", e),
                self.client.base_url(),
            );
            return;
        }

        match self.perform_knock(Some(&ip)).await {
            Ok(_) => self.last_ip = Some(ip),
            Err(e) => warn!("Knock for {} failed, will retry next tick: {}", ip, e),
        }
    }

    /// One scheduled knock plus its bookkeeping
    async fn perform_knock(&mut self, ip: Option<&str>) -> Result<KnockOutcome> {
        let outcome = knock_once(
            self.client.as_ref(),
            &self.events,
            ip,
            self.ttl_seconds,
            TriggerSource::Schedule,
            self.request_timeout,
        )
        .await?;

        self.lease.apply(&outcome, TriggerSource::Schedule);
        self.adjust_cadence(&outcome);

        self.events.whitelist_applied(
            &outcome.whitelisted_ip,
            outcome.ttl_seconds,
            outcome.expires_at_unix,
            TriggerSource::Schedule,
        );
        self.events
            .status_snapshot(self.lease.current(), self.schedule.next_knock_at_unix());

        info!(
            "Knock successful: whitelisted {} for {}s",
            outcome.whitelisted_ip, outcome.ttl_seconds
        );
        Ok(outcome)
    }

    /// Blind mode follows the TTL the server actually granted
    fn adjust_cadence(&mut self, outcome: &KnockOutcome) {
        if self.mode != KnockMode::Blind || outcome.ttl_seconds <= 0 {
            return;
        }

        let cadence = knock_cadence_from_ttl(outcome.ttl_seconds);
        if self.schedule.set_cadence(cadence, CadenceSource::TtlResponse) {
            info!(
                "Adjusted knock cadence to {:?} based on TTL {}s",
                cadence, outcome.ttl_seconds
            );
        }
    }

    fn check_expiry(&mut self) {
        let now = self.clock.now_unix();
        if let Some(expired) = self.lease.check_expiry(now) {
            info!("Whitelist for {} expired", expired.ip);
            self.events.whitelist_expired(&expired);
            self.events
                .status_snapshot(self.lease.current(), self.schedule.next_knock_at_unix());
        }
    }

    fn publish_next_knock(&mut self) {
        let next = self.schedule.next_after(self.clock.now_unix());
        if self.schedule.update_next_knock(next) {
            self.events.next_knock_updated(next);
        }
    }
}

/// Run `fut`, failing with an HTTP error once `deadline` has passed
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::http(format!(
            "{} timed out after {:?}",
            what, deadline
        ))),
    }
}

/// Issue one knock and report the attempt
///
/// Emits `KnockTriggered` either way; failures also emit a `knock_failed`
/// error event. Lease handling is left to the caller.
pub(crate) async fn knock_once(
    client: &dyn ApiClient,
    events: &EventEmitter,
    ip: Option<&str>,
    ttl_seconds: i64,
    source: TriggerSource,
    request_timeout: Duration,
) -> Result<KnockOutcome> {
    let response = with_deadline(request_timeout, "knock", client.knock(ip, ttl_seconds)).await;

    match response {
        Ok(response) => {
            let outcome = KnockOutcome::succeeded(ip, &response);
            events.knock_triggered(source, KnockResult::Success, &outcome.whitelisted_ip);
            Ok(outcome)
        }
        Err(e) => {
            let requested = ip.unwrap_or_default();
            events.knock_triggered(source, KnockResult::Failure, requested);
            let context = if requested.is_empty() {
                source.as_str()
            } else {
                requested
            };
            events.error(
                ErrorCode::KnockFailed,
                &format!("Knock failed: {}", e),
                context,
            );
            Err(e)
        }
    }
}
