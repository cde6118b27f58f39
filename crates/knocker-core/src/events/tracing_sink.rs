// # Tracing Event Sink
//
// Forwards structured events to `tracing`. Used by the daemon when no
// journal is available, so lifecycle events still end up in the process log.

use tracing::{debug, error, info, warn};

use crate::Error;
use crate::traits::{EventRecord, EventSink, Priority};

/// Event sink that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingEventSink {
    fn emit(&self, record: &EventRecord) -> Result<(), Error> {
        let fields = record
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        match record.priority {
            Priority::Emerg | Priority::Alert | Priority::Crit | Priority::Err => {
                error!(event = record.kind, "{} [{}]", record.message, fields)
            }
            Priority::Warning => warn!(event = record.kind, "{} [{}]", record.message, fields),
            Priority::Notice | Priority::Info => {
                info!(event = record.kind, "{} [{}]", record.message, fields)
            }
            Priority::Debug => debug!(event = record.kind, "{} [{}]", record.message, fields),
        }

        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "tracing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Fields;

    #[test]
    fn test_tracing_sink_never_fails() {
        let mut fields = Fields::new();
        fields.insert("KNOCKER_EVENT".into(), "Error".into());

        let record = EventRecord {
            kind: "Error",
            message: "Knock failed".into(),
            priority: Priority::Err,
            fields,
        };

        assert!(TracingEventSink::new().emit(&record).is_ok());
    }
}
