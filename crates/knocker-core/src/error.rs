//! Error types for the knocker system
//!
//! This module defines all error types used throughout the crate, and the
//! classification the orchestrator uses to decide whether an error may
//! unwind the control loop.

use thiserror::Error;

/// Result type alias for knocker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the knocker system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The whitelist API health endpoint rejected us or was unreachable
    #[error("Health check failed: {0}")]
    HealthCheck(String),

    /// Knock request was rejected or returned an unusable body
    #[error("API error: {0}")]
    Api(String),

    /// Public IP lookup failed
    #[error("IP lookup error: {0}")]
    IpLookup(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event sink delivery failure
    #[error("Event sink error: {0}")]
    Sink(String),

    /// Startup could not complete; the process must not enter Running
    #[error("Startup failed: {0}")]
    StartupFatal(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// How an error is allowed to affect the control flow of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Terminates the process with a non-zero exit code
    StartupFatal,
    /// Logged and reported, the loop retries on the next tick
    TickRecoverable,
    /// Event delivery is disabled for the rest of the process lifetime
    SinkDegraded,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a health check error
    pub fn health_check(msg: impl Into<String>) -> Self {
        Self::HealthCheck(msg.into())
    }

    /// Create an API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create an IP lookup error
    pub fn ip_lookup(msg: impl Into<String>) -> Self {
        Self::IpLookup(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an event sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a startup-fatal error
    pub fn startup_fatal(msg: impl Into<String>) -> Self {
        Self::StartupFatal(msg.into())
    }

    /// Classify the error for propagation decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::StartupFatal(_) | Error::Config(_) => ErrorClass::StartupFatal,
            Error::Sink(_) => ErrorClass::SinkDegraded,
            _ => ErrorClass::TickRecoverable,
        }
    }

    /// Whether this error must terminate the process
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::StartupFatal
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
