// # Event Sink Trait
//
// Defines the interface for delivering structured lifecycle events to an
// external log (systemd-journald, a test recorder, plain tracing output).
//
// ## Implementations
//
// - In-memory recorder: [`crate::events::MemoryEventSink`]
// - tracing forwarder: [`crate::events::TracingEventSink`]
// - journald native protocol: `knocker-journald` crate
//
// ## Delivery Semantics
//
// Delivery is best effort. Any error returned from [`EventSink::emit`] is
// treated by the [`crate::events::EventEmitter`] as "sink degraded" and
// disables the sink for the rest of the process lifetime.

use std::collections::BTreeMap;
use std::fmt;

/// Structured fields attached to an event (journald-style upper-case keys)
pub type Fields = BTreeMap<String, String>;

/// Syslog priority of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Priority {
    /// Numeric syslog level
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Emerg => "emerg",
            Priority::Alert => "alert",
            Priority::Crit => "crit",
            Priority::Err => "err",
            Priority::Warning => "warning",
            Priority::Notice => "notice",
            Priority::Info => "info",
            Priority::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// A fully formatted event, ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Event kind name (also present as `KNOCKER_EVENT` in `fields`)
    pub kind: &'static str,
    /// Human-readable message
    pub message: String,
    /// Severity
    pub priority: Priority,
    /// Structured payload
    pub fields: Fields,
}

impl EventRecord {
    /// Look up a field value
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Trait for event sink implementations
///
/// # Thread Safety
///
/// Sinks may be shared between the control loop and the supervisor that
/// stops it, so they must be `Send + Sync`.
///
/// # Trust Level: Untrusted
///
/// Sinks must not block for long and must not retry: a failed delivery is
/// reported by returning an error, nothing more.
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn emit(&self, record: &EventRecord) -> Result<(), crate::Error>;

    /// Sink name (for logging/debugging)
    fn sink_name(&self) -> &'static str;
}
