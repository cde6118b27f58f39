//! Lifecycle event emission
//!
//! The [`EventEmitter`] turns lifecycle facts of the service into structured
//! [`EventRecord`]s and hands them to an [`EventSink`]. It is stateless apart
//! from the sticky "sink degraded" flag: the first delivery failure disables
//! the sink for good, and every later emission is a no-op.
//!
//! ## Wire Contract
//!
//! Every record carries `KNOCKER_EVENT`, `SYSLOG_IDENTIFIER=knocker` and
//! `KNOCKER_SCHEMA_VERSION`, plus kind-specific `KNOCKER_*` fields. Desktop
//! integrations parse these, so field names are stable.

pub mod memory;
pub mod tracing_sink;

pub use memory::MemoryEventSink;
pub use tracing_sink::TracingEventSink;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SecondsFormat};
use tracing::{debug, warn};

use crate::lease::{ExpiredLease, Lease, TriggerSource};
use crate::traits::{EventRecord, EventSink, Fields, Priority};

/// Stable contract version of the structured fields
pub const SCHEMA_VERSION: &str = "1";

/// Syslog identifier attached to every record
pub const SYSLOG_IDENTIFIER: &str = "knocker";

pub const FIELD_EVENT: &str = "KNOCKER_EVENT";
pub const FIELD_SYSLOG_IDENTIFIER: &str = "SYSLOG_IDENTIFIER";
pub const FIELD_SCHEMA_VERSION: &str = "KNOCKER_SCHEMA_VERSION";
pub const FIELD_SERVICE_STATE: &str = "KNOCKER_SERVICE_STATE";
pub const FIELD_VERSION: &str = "KNOCKER_VERSION";
pub const FIELD_WHITELIST_IP: &str = "KNOCKER_WHITELIST_IP";
pub const FIELD_EXPIRES_UNIX: &str = "KNOCKER_EXPIRES_UNIX";
pub const FIELD_EXPIRED_UNIX: &str = "KNOCKER_EXPIRED_UNIX";
pub const FIELD_TTL_SEC: &str = "KNOCKER_TTL_SEC";
pub const FIELD_NEXT_AT_UNIX: &str = "KNOCKER_NEXT_AT_UNIX";
pub const FIELD_SOURCE: &str = "KNOCKER_SOURCE";
pub const FIELD_TRIGGER_SOURCE: &str = "KNOCKER_TRIGGER_SOURCE";
pub const FIELD_RESULT: &str = "KNOCKER_RESULT";
pub const FIELD_ERROR_CODE: &str = "KNOCKER_ERROR_CODE";
pub const FIELD_ERROR_MSG: &str = "KNOCKER_ERROR_MSG";
pub const FIELD_CONTEXT: &str = "KNOCKER_CONTEXT";

/// Kinds of events the service emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ServiceState,
    StatusSnapshot,
    WhitelistApplied,
    WhitelistExpired,
    NextKnockUpdated,
    KnockTriggered,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ServiceState => "ServiceState",
            EventKind::StatusSnapshot => "StatusSnapshot",
            EventKind::WhitelistApplied => "WhitelistApplied",
            EventKind::WhitelistExpired => "WhitelistExpired",
            EventKind::NextKnockUpdated => "NextKnockUpdated",
            EventKind::KnockTriggered => "KnockTriggered",
            EventKind::Error => "Error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service lifecycle states reported in `ServiceState` events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Started,
    Stopping,
    Stopped,
}

impl ServiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Started => "started",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
        }
    }
}

/// Result of a knock, as reported in `KnockTriggered` events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnockResult {
    Success,
    Failure,
}

impl KnockResult {
    pub fn as_str(self) -> &'static str {
        match self {
            KnockResult::Success => "success",
            KnockResult::Failure => "failure",
        }
    }
}

/// Error codes reported in `Error` events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    IpLookupFailed,
    HealthCheckFailed,
    KnockFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::IpLookupFailed => "ip_lookup_failed",
            ErrorCode::HealthCheckFailed => "health_check_failed",
            ErrorCode::KnockFailed => "knock_failed",
        }
    }
}

/// Best-effort event emitter with sticky sink disablement
///
/// Cloning is cheap; clones share the sink and the enabled flag, so a
/// degradation observed anywhere silences every clone.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    enabled: Arc<AtomicBool>,
    version: String,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sink", &self.sink.sink_name())
            .field("enabled", &self.is_enabled())
            .field("version", &self.version)
            .finish()
    }
}

impl EventEmitter {
    /// Create an emitter over the given sink
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            enabled: Arc::new(AtomicBool::new(true)),
            version: String::new(),
        }
    }

    /// Attach a version string to service-state events
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Whether the sink is still accepting events
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Service state transition
    pub fn service_state(&self, state: ServiceState) {
        let mut fields = Fields::new();
        fields.insert(FIELD_SERVICE_STATE.into(), state.as_str().into());
        if !self.version.is_empty() {
            fields.insert(FIELD_VERSION.into(), self.version.clone());
        }

        let priority = match state {
            ServiceState::Stopping => Priority::Notice,
            _ => Priority::Info,
        };

        self.emit(
            EventKind::ServiceState,
            format!("Service state: {}", state.as_str()),
            priority,
            fields,
        );
    }

    /// Snapshot of the current lease and next knock time
    pub fn status_snapshot(&self, lease: Option<&Lease>, next_knock_unix: i64) {
        let mut fields = Fields::new();
        if let Some(lease) = lease {
            if !lease.ip.is_empty() {
                fields.insert(FIELD_WHITELIST_IP.into(), lease.ip.clone());
            }
            if lease.expires_at_unix > 0 {
                fields.insert(FIELD_EXPIRES_UNIX.into(), lease.expires_at_unix.to_string());
            }
            if lease.ttl_seconds > 0 {
                fields.insert(FIELD_TTL_SEC.into(), lease.ttl_seconds.to_string());
            }
        }
        if next_knock_unix > 0 {
            fields.insert(FIELD_NEXT_AT_UNIX.into(), next_knock_unix.to_string());
        }

        self.emit(
            EventKind::StatusSnapshot,
            "Status snapshot".to_string(),
            Priority::Info,
            fields,
        );
    }

    /// A knock established (or refreshed) a whitelist grant
    pub fn whitelist_applied(
        &self,
        ip: &str,
        ttl_seconds: i64,
        expires_at_unix: i64,
        source: TriggerSource,
    ) {
        let mut fields = Fields::new();
        if !ip.is_empty() {
            fields.insert(FIELD_WHITELIST_IP.into(), ip.to_string());
        }
        if ttl_seconds > 0 {
            fields.insert(FIELD_TTL_SEC.into(), ttl_seconds.to_string());
        }
        if expires_at_unix > 0 {
            fields.insert(FIELD_EXPIRES_UNIX.into(), expires_at_unix.to_string());
        }
        fields.insert(FIELD_SOURCE.into(), source.as_str().into());

        let message = if ip.is_empty() {
            "Whitelist updated".to_string()
        } else if ttl_seconds > 0 && expires_at_unix > 0 {
            format!(
                "Whitelisted {} for {}s (expires at {})",
                ip,
                ttl_seconds,
                format_unix(expires_at_unix)
            )
        } else {
            format!("Whitelisted {}", ip)
        };

        self.emit(EventKind::WhitelistApplied, message, Priority::Info, fields);
    }

    /// The tracked grant lapsed
    pub fn whitelist_expired(&self, expired: &ExpiredLease) {
        let mut fields = Fields::new();
        if !expired.ip.is_empty() {
            fields.insert(FIELD_WHITELIST_IP.into(), expired.ip.clone());
        }
        if expired.expires_at_unix > 0 {
            fields.insert(FIELD_EXPIRED_UNIX.into(), expired.expires_at_unix.to_string());
        }

        self.emit(
            EventKind::WhitelistExpired,
            expired_message(expired),
            Priority::Notice,
            fields,
        );
    }

    /// The next scheduled knock moved (0 = cleared)
    pub fn next_knock_updated(&self, next_knock_unix: i64) {
        let mut fields = Fields::new();
        let message = if next_knock_unix <= 0 {
            fields.insert(FIELD_NEXT_AT_UNIX.into(), "0".into());
            "Next knock cleared".to_string()
        } else {
            fields.insert(FIELD_NEXT_AT_UNIX.into(), next_knock_unix.to_string());
            format!("Next knock at {}", format_unix(next_knock_unix))
        };

        self.emit(EventKind::NextKnockUpdated, message, Priority::Info, fields);
    }

    /// A knock was attempted
    pub fn knock_triggered(&self, source: TriggerSource, result: KnockResult, ip: &str) {
        let mut fields = Fields::new();
        fields.insert(FIELD_TRIGGER_SOURCE.into(), source.as_str().into());
        fields.insert(FIELD_RESULT.into(), result.as_str().into());
        if !ip.is_empty() {
            fields.insert(FIELD_WHITELIST_IP.into(), ip.to_string());
        }

        let priority = match result {
            KnockResult::Success => Priority::Info,
            KnockResult::Failure => Priority::Err,
        };

        self.emit(
            EventKind::KnockTriggered,
            format!("Knock triggered via {}: {}", source, result.as_str()),
            priority,
            fields,
        );
    }

    /// A recoverable failure inside the service
    pub fn error(&self, code: ErrorCode, message: &str, context: &str) {
        let mut fields = Fields::new();
        fields.insert(FIELD_ERROR_CODE.into(), code.as_str().into());
        fields.insert(FIELD_ERROR_MSG.into(), message.to_string());
        if !context.is_empty() {
            fields.insert(FIELD_CONTEXT.into(), context.to_string());
        }

        self.emit(EventKind::Error, message.to_string(), Priority::Err, fields);
    }

    fn emit(&self, kind: EventKind, message: String, priority: Priority, mut fields: Fields) {
        if !self.is_enabled() {
            return;
        }

        fields.insert(FIELD_EVENT.into(), kind.as_str().into());
        fields
            .entry(FIELD_SYSLOG_IDENTIFIER.into())
            .or_insert_with(|| SYSLOG_IDENTIFIER.into());
        fields
            .entry(FIELD_SCHEMA_VERSION.into())
            .or_insert_with(|| SCHEMA_VERSION.into());

        let record = EventRecord {
            kind: kind.as_str(),
            message,
            priority,
            fields,
        };

        debug!("Emitting {} event: {}", record.kind, record.message);

        if let Err(e) = self.sink.emit(&record) {
            // Only the first failure is worth a log line; the swap makes
            // concurrent failures race to exactly one warning.
            if self.enabled.swap(false, Ordering::AcqRel) {
                warn!(
                    "Event sink {} unavailable, disabling event delivery: {}",
                    self.sink.sink_name(),
                    e
                );
            }
        }
    }
}

fn expired_message(expired: &ExpiredLease) -> String {
    match (expired.ip.is_empty(), expired.expires_at_unix > 0) {
        (false, true) => format!(
            "Whitelist expired for {} at {}",
            expired.ip,
            format_unix(expired.expires_at_unix)
        ),
        (false, false) => format!("Whitelist expired for {}", expired.ip),
        _ => "Whitelist expired".to_string(),
    }
}

/// Format a Unix timestamp as RFC 3339 UTC (e.g. `2023-11-14T22:13:20Z`)
pub fn format_unix(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| unix.to_string())
}
