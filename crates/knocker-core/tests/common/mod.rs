//! Test doubles and common utilities for orchestrator contract tests
//!
//! The doubles are scripted: each call pops the next queued result, and
//! every double can be cloned to keep a handle on its counters after the
//! original has been moved into the orchestrator.

#![allow(dead_code)]

use knocker_core::error::{Error, Result};
use knocker_core::traits::{ApiClient, Clock, IpResolver, KnockResponse};
use knocker_core::{EventEmitter, KnockOrchestrator, KnockerConfig, MemoryEventSink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Unix time the test clock starts at (2023-11-14T22:13:20Z)
pub const BASE_UNIX: i64 = 1_700_000_000;

pub const API_URL: &str = "http://knock.test";
pub const IP_CHECK_URL: &str = "http://ip.test";

/// Scripted whitelist API
#[derive(Clone, Default)]
pub struct ScriptedApiClient {
    health_script: Arc<Mutex<VecDeque<Result<()>>>>,
    knock_script: Arc<Mutex<VecDeque<Result<KnockResponse>>>>,
    /// Response used once the knock script runs dry
    default_response: Arc<Mutex<Option<KnockResponse>>>,
    health_calls: Arc<AtomicUsize>,
    knock_calls: Arc<AtomicUsize>,
    knock_requests: Arc<Mutex<Vec<(Option<String>, i64)>>>,
    knock_delay: Arc<Mutex<Option<Duration>>>,
}

impl ScriptedApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Knocks succeed with `response` unless scripted otherwise
    pub fn answering(response: KnockResponse) -> Self {
        let client = Self::new();
        *client.default_response.lock().unwrap() = Some(response);
        client
    }

    pub fn push_health(&self, result: Result<()>) {
        self.health_script.lock().unwrap().push_back(result);
    }

    pub fn push_knock(&self, result: Result<KnockResponse>) {
        self.knock_script.lock().unwrap().push_back(result);
    }

    /// Make every knock take `delay` (tokio time)
    pub fn delay_knocks(&self, delay: Duration) {
        *self.knock_delay.lock().unwrap() = Some(delay);
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn knock_calls(&self) -> usize {
        self.knock_calls.load(Ordering::SeqCst)
    }

    /// `(ip, ttl)` of every knock, in order
    pub fn knock_requests(&self) -> Vec<(Option<String>, i64)> {
        self.knock_requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ApiClient for ScriptedApiClient {
    async fn health_check(&self) -> Result<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.health_script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn knock(&self, ip: Option<&str>, ttl_seconds: i64) -> Result<KnockResponse> {
        self.knock_calls.fetch_add(1, Ordering::SeqCst);
        self.knock_requests
            .lock()
            .unwrap()
            .push((ip.map(str::to_string), ttl_seconds));

        let delay = *self.knock_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.knock_script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => self
                .default_response
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::api("no scripted knock response")),
        }
    }

    fn base_url(&self) -> &str {
        API_URL
    }
}

/// Scripted public IP resolver. The last scripted answer repeats.
#[derive(Clone, Default)]
pub struct ScriptedResolver {
    script: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    last: Arc<Mutex<Option<std::result::Result<String, String>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that always answers `ip`
    pub fn fixed(ip: &str) -> Self {
        let resolver = Self::new();
        resolver.push_ip(ip);
        resolver
    }

    pub fn push_ip(&self, ip: &str) {
        self.script.lock().unwrap().push_back(Ok(ip.to_string()));
    }

    pub fn push_error(&self, message: &str) {
        self.script.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpResolver for ScriptedResolver {
    async fn public_ip(&self, _url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        let answer = match next {
            Some(answer) => {
                *self.last.lock().unwrap() = Some(answer.clone());
                answer
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err("no scripted IP".to_string())),
        };

        answer.map_err(Error::ip_lookup)
    }
}

/// Wall clock that follows tokio's (paused) clock from [`BASE_UNIX`]
pub struct TokioClock {
    base_unix: i64,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base_unix: BASE_UNIX,
            started: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now_unix(&self) -> i64 {
        self.base_unix + self.started.elapsed().as_secs() as i64
    }
}

/// Response granting `ip` for `ttl` seconds from `now_unix`
pub fn granted(ip: &str, now_unix: i64, ttl: i64) -> KnockResponse {
    KnockResponse {
        whitelisted_entry: ip.to_string(),
        expires_at: now_unix + ttl,
        expires_in_seconds: ttl,
    }
}

/// Blind-mode configuration with the given TTL
pub fn blind_config(ttl_seconds: i64) -> KnockerConfig {
    KnockerConfig::new(API_URL, "test-key").with_ttl_seconds(ttl_seconds)
}

/// Change-detection configuration checking every `minutes`
pub fn change_detection_config(minutes: i64) -> KnockerConfig {
    KnockerConfig::new(API_URL, "test-key")
        .with_ip_check_url(IP_CHECK_URL)
        .with_check_interval_minutes(minutes)
}

/// Everything a contract test needs to drive and observe an orchestrator
pub struct Harness {
    pub orchestrator: KnockOrchestrator,
    pub client: ScriptedApiClient,
    pub resolver: ScriptedResolver,
    pub sink: Arc<MemoryEventSink>,
}

pub fn harness(
    config: KnockerConfig,
    client: ScriptedApiClient,
    resolver: ScriptedResolver,
) -> Harness {
    let sink = Arc::new(MemoryEventSink::new());
    let orchestrator = KnockOrchestrator::new(
        config,
        Box::new(client.clone()),
        Box::new(resolver.clone()),
        EventEmitter::new(sink.clone()),
    )
    .expect("orchestrator construction succeeds")
    .with_clock(TokioClock::new());

    Harness {
        orchestrator,
        client,
        resolver,
        sink,
    }
}

/// Let spawned tasks run without advancing time
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
