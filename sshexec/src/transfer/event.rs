//! Transfer lifecycle events.

use std::fmt;

use log::debug;

/// A lifecycle event emitted while a file transfer runs.
///
/// Events exist for observability only; they are logged and never
/// returned to the caller or consulted for control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A remote file was opened for reading or writing.
    Open { path: String, size: u64 },

    /// A chunk was written to the remote file.
    Put { path: String, offset: u64, size: usize },

    /// A chunk was read from the remote file.
    Get { path: String, offset: u64, size: usize },

    /// A missing intermediate remote directory was created.
    Mkdir { path: String },

    /// The remote file was closed.
    Close { path: String },

    /// The transfer completed.
    Finish,
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferEvent::Open { path, size } => write!(f, "open {path} ({size} bytes)"),
            TransferEvent::Put { path, offset, size } => {
                write!(f, "put {path} @{offset} +{size}")
            }
            TransferEvent::Get { path, offset, size } => {
                write!(f, "get {path} @{offset} +{size}")
            }
            TransferEvent::Mkdir { path } => write!(f, "mkdir {path}"),
            TransferEvent::Close { path } => write!(f, "close {path}"),
            TransferEvent::Finish => write!(f, "finish"),
        }
    }
}

/// Log one event.
pub(crate) fn observe(event: &TransferEvent) {
    debug!("sftp: {event}");
}
