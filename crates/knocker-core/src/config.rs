//! Configuration types for the knocker system
//!
//! Values arrive here already resolved; where they come from (environment,
//! files, flags) is the daemon's business.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cadence::MAX_INTERVAL;

/// Main knocker configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct KnockerConfig {
    /// Base URL of the whitelist API (e.g. "https://knocker.example.com")
    pub api_url: String,

    /// API key sent with every knock
    pub api_key: String,

    /// Requested whitelist TTL in seconds (<= 0 lets the server decide)
    #[serde(default)]
    pub ttl_seconds: i64,

    /// URL of an external "what is my IP" service.
    ///
    /// When set the service runs in change-detection mode; otherwise it
    /// knocks blindly on a TTL-derived cadence.
    #[serde(default)]
    pub ip_check_url: Option<String>,

    /// IP check cadence in minutes (change-detection mode only)
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: i64,

    /// Optional orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

// The API key must never show up in logs.
impl std::fmt::Debug for KnockerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnockerConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<REDACTED>")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("ip_check_url", &self.ip_check_url)
            .field("check_interval_minutes", &self.check_interval_minutes)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

/// Operating mode, selected by the presence of an IP check URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnockMode {
    /// Knock every tick and let the API infer our address
    Blind,
    /// Knock only when the resolved public IP changes
    ChangeDetection {
        /// Resolver URL
        url: String,
    },
}

impl KnockerConfig {
    /// Create a configuration with defaults for everything but the API endpoint
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            ttl_seconds: 0,
            ip_check_url: None,
            check_interval_minutes: default_check_interval_minutes(),
            orchestrator: OrchestratorSettings::default(),
        }
    }

    /// Set the requested TTL
    pub fn with_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Switch to change-detection mode using the given resolver URL
    pub fn with_ip_check_url(mut self, url: impl Into<String>) -> Self {
        self.ip_check_url = Some(url.into());
        self
    }

    /// Set the IP check interval in minutes
    pub fn with_check_interval_minutes(mut self, minutes: i64) -> Self {
        self.check_interval_minutes = minutes;
        self
    }

    /// Set the version string reported in service-state events
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.orchestrator.version = version.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_url.is_empty() {
            return Err(crate::Error::config("API URL cannot be empty"));
        }
        if !is_http_url(&self.api_url) {
            return Err(crate::Error::config(format!(
                "API URL must use http or https scheme. Got: {}",
                self.api_url
            )));
        }
        if self.api_key.is_empty() {
            return Err(crate::Error::config("API key cannot be empty"));
        }

        if let Some(url) = &self.ip_check_url {
            if url.is_empty() {
                return Err(crate::Error::config(
                    "IP check URL cannot be empty when set",
                ));
            }
            if !is_http_url(url) {
                return Err(crate::Error::config(format!(
                    "IP check URL must use http or https scheme. Got: {}",
                    url
                )));
            }
        }

        if self.check_interval() > MAX_INTERVAL {
            return Err(crate::Error::config(format!(
                "Check interval must be at most {} minutes. Got: {}",
                MAX_INTERVAL.as_secs() / 60,
                self.check_interval_minutes
            )));
        }

        if self.orchestrator.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }

        Ok(())
    }

    /// Operating mode implied by this configuration
    pub fn mode(&self) -> KnockMode {
        match &self.ip_check_url {
            Some(url) if !url.is_empty() => KnockMode::ChangeDetection { url: url.clone() },
            _ => KnockMode::Blind,
        }
    }

    /// Configured IP check interval, before normalization
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn check_interval(&self) -> Duration {
        if self.check_interval_minutes <= 0 {
            return Duration::ZERO;
        }
        (self.check_interval_minutes as u64)
            .checked_mul(60)
            .map_or(Duration::MAX, Duration::from_secs)
    }

    /// Per-request deadline for API and resolver calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.request_timeout_secs)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Deadline for a single API or resolver call when none is configured
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Upper bound for a single health check or knock call (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Version string attached to service-state events (empty = omitted)
    #[serde(default)]
    pub version: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            version: String::new(),
        }
    }
}

fn default_check_interval_minutes() -> i64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
