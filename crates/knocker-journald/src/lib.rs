// # Journald Event Sink
//
// This crate provides an `EventSink` that writes structured entries to the
// systemd journal using its native datagram protocol.
//
// ## Wire Format
//
// One datagram per entry, sent to `/run/systemd/journal/socket`. Each field
// is encoded as `KEY=value\n`; values containing a newline use the binary
// form `KEY\n<u64 little-endian length><value>\n`. `MESSAGE` and `PRIORITY`
// are added from the record itself. Entries too large for a datagram are
// handed over as a sealed memfd.
//
// ## Failure Semantics
//
// Only a journal that is gone or refuses us (ENOENT, ENOTDIR, ENOTCONN,
// ECONNREFUSED, EPERM, EACCES) is returned as `Error::Sink`; the
// `EventEmitter` treats that as permanent and stops delivering events. Any
// other send failure drops that one entry with a warning and keeps the sink.
//
// ## Platform Support
//
// The journal only exists on Linux. Elsewhere `JournaldSink::connect`
// always fails and callers fall back to another sink.

#[cfg(target_os = "linux")]
mod transport;

use knocker_core::traits::{EventRecord, EventSink};
use knocker_core::{Error, Result};

use std::path::{Path, PathBuf};

/// Default journald native socket
pub const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

/// Longest field name journald accepts
const MAX_FIELD_NAME_LEN: usize = 64;

/// Journald event sink
#[derive(Debug)]
pub struct JournaldSink {
    path: PathBuf,

    #[cfg(target_os = "linux")]
    socket: std::os::unix::net::UnixDatagram,
}

impl JournaldSink {
    /// Connect to the system journal
    pub fn connect() -> Result<Self> {
        Self::with_socket_path(JOURNAL_SOCKET)
    }

    /// Connect to a journal socket at a custom path
    #[cfg(target_os = "linux")]
    pub fn with_socket_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::sink(format!(
                "journal socket {} not found",
                path.display()
            )));
        }

        let socket = std::os::unix::net::UnixDatagram::unbound()
            .map_err(|e| Error::sink(format!("Failed to create journal socket: {}", e)))?;

        Ok(Self { path, socket })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn with_socket_path(_path: impl AsRef<Path>) -> Result<Self> {
        Err(Error::sink("journald is only available on Linux"))
    }

    /// Whether the system journal looks reachable
    pub fn is_available() -> bool {
        cfg!(target_os = "linux") && Path::new(JOURNAL_SOCKET).exists()
    }

    /// Socket path entries are sent to
    pub fn socket_path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JournaldSink {
    #[cfg(target_os = "linux")]
    fn emit(&self, record: &EventRecord) -> Result<()> {
        let entry = encode_entry(record);

        match transport::send(&self.socket, &self.path, &entry) {
            Ok(()) => Ok(()),
            Err(e) if transport::is_unavailable(&e) => {
                Err(Error::sink(format!("journald send failed: {}", e)))
            }
            Err(e) => {
                tracing::warn!(
                    "Dropping {} event ({} bytes), journald did not take it: {}",
                    record.kind,
                    entry.len(),
                    e
                );
                Ok(())
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn emit(&self, _record: &EventRecord) -> Result<()> {
        Err(Error::sink("journald is only available on Linux"))
    }

    fn sink_name(&self) -> &'static str {
        "journald"
    }
}

/// Encode a record as a native-protocol journal entry
///
/// Fields with names journald would reject are dropped.
pub fn encode_entry(record: &EventRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    append_field(&mut buf, "MESSAGE", &record.message);
    append_field(&mut buf, "PRIORITY", &record.priority.as_u8().to_string());

    for (name, value) in &record.fields {
        if !valid_field_name(name) {
            tracing::debug!("Dropping invalid journal field name {:?}", name);
            continue;
        }
        append_field(&mut buf, name, value);
    }

    buf
}

fn append_field(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());

    if value.contains('\n') {
        buf.push(b'\n');
        buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
        buf.extend_from_slice(value.as_bytes());
    } else {
        buf.push(b'=');
        buf.extend_from_slice(value.as_bytes());
    }

    buf.push(b'\n');
}

/// Uppercase ASCII letters, digits and underscores; no leading underscore
fn valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FIELD_NAME_LEN
        && !name.starts_with('_')
        && name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}
