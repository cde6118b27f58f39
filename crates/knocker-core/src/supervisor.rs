//! Process-lifecycle wrapper around a running orchestrator
//!
//! The daemon (or an embedding application) starts the loop on its own task
//! through [`ServiceSupervisor`] and later stops it from wherever the stop
//! request originates: a signal handler, a service manager callback, a test.

use std::fmt;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::engine::{KnockOrchestrator, LifecycleState, StopHandle};
use crate::error::{Error, Result};

/// Owns the orchestrator task and its stop signals
pub struct ServiceSupervisor {
    cancel: CancellationToken,
    stop: StopHandle,
    task: JoinHandle<Result<()>>,
}

impl fmt::Debug for ServiceSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSupervisor")
            .field("state", &self.stop.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl ServiceSupervisor {
    /// Spawn the orchestrator loop on the current tokio runtime
    pub fn start(orchestrator: KnockOrchestrator) -> Self {
        Self::start_with_token(orchestrator, CancellationToken::new())
    }

    /// Spawn the loop, also stopping it when `cancel` fires
    pub fn start_with_token(orchestrator: KnockOrchestrator, cancel: CancellationToken) -> Self {
        let stop = orchestrator.stop_handle();
        let task = tokio::spawn(orchestrator.run(cancel.clone()));
        debug!("Orchestrator task spawned");

        Self { cancel, stop, task }
    }

    /// Stop the service. Safe to call repeatedly and concurrently; only the
    /// first call has any effect.
    pub fn stop(&self) {
        self.stop.stop();
        self.cancel.cancel();
    }

    /// Cloneable handle for stopping the service from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state of the orchestrator
    pub fn state(&self) -> LifecycleState {
        self.stop.state()
    }

    /// Whether the loop task has returned
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to return
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Orchestrator task aborted: {}", e);
                Err(Error::Other(format!("orchestrator task failed: {}", e)))
            }
        }
    }
}
