// # knocker-core
//
// Core library for the knocker whitelist keep-alive service.
//
// ## Architecture Overview
//
// A knocker keeps a host's dynamic public IP whitelisted on a remote API by
// "knocking" before the previous grant lapses:
// - **Cadence**: Pure functions deriving knock/check intervals from TTLs
// - **LeaseTracker**: The current whitelist grant and its expiry
// - **EventEmitter**: Structured lifecycle events with sticky sink disablement
// - **KnockOrchestrator**: The control loop tying the above together
// - **ServiceSupervisor**: Runs the loop on a task and stops it idempotently
//
// HTTP, IP lookup and journald live in adapter crates behind the traits in
// [`traits`].
//
// ## Design Principles
//
// 1. **Library-First**: The daemon is a thin shell over this crate
// 2. **Single Writer**: Lease and schedule are owned by the loop task
// 3. **Best-Effort Events**: Event delivery never affects control flow
// 4. **Only Startup Is Fatal**: Tick failures are reported and retried

pub mod cadence;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lease;
pub mod supervisor;
pub mod traits;

// Re-export core types for convenience
pub use config::{KnockMode, KnockerConfig, OrchestratorSettings};
pub use engine::{
    CadenceSource, KnockOrchestrator, LifecycleState, Schedule, StopHandle, manual_knock,
};
pub use error::{Error, ErrorClass, Result};
pub use events::{EventEmitter, MemoryEventSink, TracingEventSink};
pub use lease::{ExpiredLease, KnockOutcome, Lease, LeaseTracker, TriggerSource};
pub use supervisor::ServiceSupervisor;
pub use traits::{ApiClient, Clock, EventSink, IpResolver, SystemClock};
