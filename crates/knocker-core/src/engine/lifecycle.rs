//! Service lifecycle state and the idempotent stop handle

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

use crate::events::{EventEmitter, ServiceState};

/// Orchestrator lifecycle. Transitions are linear:
/// `Starting -> Running -> Stopping -> Stopped` (a failed startup goes
/// straight from `Starting` to `Stopped`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Running,
            2 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared, atomically updated lifecycle cell
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle(Arc<AtomicU8>);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(LifecycleState::Starting as u8)))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from -> to` if the current state is `from`
    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Handle for stopping a running orchestrator from outside its task
///
/// Every method is safe to call any number of times, from any task, before,
/// during or after the loop runs: the "stopping" event fires at most once
/// and the stop signal is latched.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: CancellationToken,
    lifecycle: Lifecycle,
    events: EventEmitter,
}

impl StopHandle {
    pub(crate) fn new(lifecycle: Lifecycle, events: EventEmitter) -> Self {
        Self {
            stop: CancellationToken::new(),
            lifecycle,
            events,
        }
    }

    /// Announce that the service is stopping (once, and only if it was running)
    pub fn notify_stopping(&self) {
        if self
            .lifecycle
            .transition(LifecycleState::Running, LifecycleState::Stopping)
        {
            self.events.service_state(ServiceState::Stopping);
        }
    }

    /// Request the loop to stop
    pub fn stop(&self) {
        self.notify_stopping();
        self.stop.cancel();
    }

    /// Whether a stop has been requested
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.stop
    }
}
