// # Memory Event Sink
//
// In-memory implementation of EventSink.
//
// ## Purpose
//
// Records every delivered event so tests and embedding applications can
// inspect the service's lifecycle stream. It can be switched into a failing
// mode to exercise the emitter's sticky disablement.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::Error;
use crate::traits::{EventRecord, EventSink};

/// In-memory event sink
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use knocker_core::events::{EventEmitter, MemoryEventSink, ServiceState};
///
/// let sink = Arc::new(MemoryEventSink::new());
/// let emitter = EventEmitter::new(sink.clone());
///
/// emitter.service_state(ServiceState::Started);
/// assert_eq!(sink.count("ServiceState"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    records: Mutex<Vec<EventRecord>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryEventSink {
    /// Create a new empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of delivery attempts, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// All delivered records, in order
    pub fn records(&self) -> Vec<EventRecord> {
        self.lock().clone()
    }

    /// Delivered records of one kind, in order
    pub fn records_of(&self, kind: &str) -> Vec<EventRecord> {
        self.lock()
            .iter()
            .filter(|record| record.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of delivered records of one kind
    pub fn count(&self, kind: &str) -> usize {
        self.lock().iter().filter(|record| record.kind == kind).count()
    }

    /// Event kinds in delivery order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.lock().iter().map(|record| record.kind).collect()
    }

    /// Forget all recorded events
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EventRecord>> {
        // A poisoned recorder still holds valid records.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, record: &EventRecord) -> Result<(), Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::sink("memory sink set to fail"));
        }

        self.lock().push(record.clone());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "memory"
    }
}
