//! Stream demultiplexing for command output.
//!
//! Remote stdout and stderr arrive interleaved on one channel. The
//! collector appends every chunk to a single accumulator in strict
//! arrival order and echoes it to the caller's sinks, logging a
//! header only when the active stream changes.

use std::io::{self, Write};

use bytes::BytesMut;
use log::{debug, warn};

use crate::transport::config::{ConnectionConfig, OutputSink};

/// Which remote stream a chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Tracks the stream the last chunk arrived on.
///
/// A header is due only on a transition into a stream: the first chunk
/// of the command, or the first chunk after a run of chunks from the
/// other stream. Consecutive same-stream chunks stay quiet.
#[derive(Debug, Default)]
pub(crate) struct HeaderTracker {
    active: Option<StreamKind>,
}

impl HeaderTracker {
    /// Record a chunk on `kind`; true when a header is due.
    pub(crate) fn enter(&mut self, kind: StreamKind) -> bool {
        if self.active == Some(kind) {
            false
        } else {
            self.active = Some(kind);
            true
        }
    }
}

/// Accumulates demultiplexed output for one execution attempt.
///
/// One collector lives per attempt; a retried attempt starts with a
/// fresh one, so failed attempts never leak partial output.
pub(crate) struct OutputCollector {
    buffer: BytesMut,
    headers: HeaderTracker,
    stdout: Option<OutputSink>,
    stderr: Option<OutputSink>,
    silence: bool,
}

impl OutputCollector {
    pub(crate) fn new(config: &ConnectionConfig, silence: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            headers: HeaderTracker::default(),
            stdout: config.stdout.clone(),
            stderr: config.stderr.clone(),
            silence,
        }
    }

    /// Consume one chunk: accumulate always, echo unless silenced.
    pub(crate) fn data(&mut self, kind: StreamKind, bytes: &[u8]) {
        if self.headers.enter(kind) {
            debug!("remote {kind}:");
        }

        self.buffer.extend_from_slice(bytes);

        if self.silence {
            return;
        }
        let result = match kind {
            StreamKind::Stdout => match &self.stdout {
                Some(sink) => write_sink(sink, bytes),
                None => io::stdout().write_all(bytes),
            },
            StreamKind::Stderr => match &self.stderr {
                Some(sink) => write_sink(sink, bytes),
                None => io::stderr().write_all(bytes),
            },
        };
        if let Err(e) = result {
            warn!("failed to echo remote {kind}: {e}");
        }
    }

    /// The accumulated output so far, lossily decoded.
    pub(crate) fn into_output(self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

fn write_sink(sink: &OutputSink, bytes: &[u8]) -> io::Result<()> {
    let mut guard = sink
        .lock()
        .map_err(|_| io::Error::other("output sink poisoned"))?;
    guard.write_all(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn capture_config() -> (ConnectionConfig, Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let err = Arc::new(Mutex::new(Vec::new()));
        let mut config = ConnectionConfig::new("127.0.0.1");
        config.stdout = Some(out.clone());
        config.stderr = Some(err.clone());
        (config, out, err)
    }

    #[test]
    fn test_output_is_ordered_concatenation_across_streams() {
        let (config, _, _) = capture_config();
        let mut collector = OutputCollector::new(&config, false);

        collector.data(StreamKind::Stdout, b"one ");
        collector.data(StreamKind::Stderr, b"two ");
        collector.data(StreamKind::Stdout, b"three");

        assert_eq!(collector.into_output(), "one two three");
    }

    #[test]
    fn test_sinks_receive_their_own_stream() {
        let (config, out, err) = capture_config();
        let mut collector = OutputCollector::new(&config, false);

        collector.data(StreamKind::Stdout, b"to stdout");
        collector.data(StreamKind::Stderr, b"to stderr");
        drop(collector);

        assert_eq!(out.lock().unwrap().as_slice(), b"to stdout");
        assert_eq!(err.lock().unwrap().as_slice(), b"to stderr");
    }

    #[test]
    fn test_silence_suppresses_sinks_but_not_accumulation() {
        let (config, out, err) = capture_config();
        let mut collector = OutputCollector::new(&config, true);

        collector.data(StreamKind::Stdout, b"quiet ");
        collector.data(StreamKind::Stderr, b"quieter");

        assert!(out.lock().unwrap().is_empty());
        assert!(err.lock().unwrap().is_empty());
        assert_eq!(collector.into_output(), "quiet quieter");
    }

    #[test]
    fn test_header_only_on_stream_transitions() {
        let mut headers = HeaderTracker::default();

        // stdout, stdout, stderr, stderr, stdout: three transitions.
        assert!(headers.enter(StreamKind::Stdout));
        assert!(!headers.enter(StreamKind::Stdout));
        assert!(headers.enter(StreamKind::Stderr));
        assert!(!headers.enter(StreamKind::Stderr));
        assert!(headers.enter(StreamKind::Stdout));
    }

    #[test]
    fn test_interleaved_chunk_headers_count() {
        let mut headers = HeaderTracker::default();
        let chunks = [
            StreamKind::Stdout,
            StreamKind::Stderr,
            StreamKind::Stdout,
        ];

        let transitions = chunks.iter().filter(|kind| headers.enter(**kind)).count();
        assert_eq!(transitions, 3);
    }

    #[test]
    fn test_binary_chunks_survive_lossily() {
        let (config, _, _) = capture_config();
        let mut collector = OutputCollector::new(&config, true);
        collector.data(StreamKind::Stdout, &[0xff, 0xfe]);
        assert_eq!(collector.into_output(), "\u{fffd}\u{fffd}");
    }
}
