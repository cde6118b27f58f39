//! Core traits for the knocker system
//!
//! This module defines the abstract interfaces the orchestrator depends on.
//!
//! - [`ApiClient`]: Health-check and knock against the whitelist API
//! - [`IpResolver`]: Discover the public IP via an external endpoint
//! - [`EventSink`]: Deliver structured lifecycle events
//! - [`Clock`]: Wall-clock time for lease bookkeeping

pub mod api_client;
pub mod clock;
pub mod event_sink;
pub mod ip_resolver;

pub use api_client::{ApiClient, KnockRequest, KnockResponse};
pub use clock::{Clock, SystemClock};
pub use event_sink::{EventRecord, EventSink, Fields, Priority};
pub use ip_resolver::IpResolver;
