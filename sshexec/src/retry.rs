//! Bounded retry of operations that died on a transient end of stream.
//!
//! Every other error class propagates immediately; a matching error
//! re-runs the whole operation from the beginning, session
//! re-establishment included, with no delay between attempts.

use log::{debug, warn};

use crate::error::{Error, Result};

/// Retry policy for transient end-of-stream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first try included.
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Create a policy with the given total attempt count.
    ///
    /// A count of zero is treated as one: the operation always runs at
    /// least once.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// The total attempt bound.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation`, retrying it while it fails with a transient
    /// end-of-stream error, up to the attempt bound.
    ///
    /// The last observed error propagates unchanged once attempts are
    /// exhausted. Anything an attempt accumulated is discarded with
    /// the attempt; each invocation starts clean.
    pub async fn run<T, F>(&self, mut operation: F) -> Result<T>
    where
        F: AsyncFnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient_eof() && attempt < self.max_attempts => {
                    debug!(
                        "transient end of stream (attempt {attempt}/{}), retrying: {err}",
                        self.max_attempts
                    );
                }
                Err(err) => {
                    if err.is_transient_eof() {
                        warn!("giving up after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::ConnectionError;

    fn transient() -> Error {
        Error::TransientEof("stream closed".to_string())
    }

    #[tokio::test]
    async fn test_success_needs_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = RetryPolicy::default()
            .run(async || {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_persistent_transient_error_attempts_exactly_max() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = RetryPolicy::default()
            .run(async || {
                counter.fetch_add(1, Ordering::Relaxed);
                Err(transient())
            })
            .await;

        assert!(result.unwrap_err().is_transient_eof());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = RetryPolicy::default()
            .run(async || {
                if counter.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err(transient())
                } else {
                    Ok("recovered")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = RetryPolicy::default()
            .run(async || {
                counter.fetch_add(1, Ordering::Relaxed);
                Err(ConnectionError::AuthenticationFailed {
                    user: "alice".to_string(),
                }
                .into())
            })
            .await;

        assert!(matches!(result.unwrap_err(), Error::Connection(_)));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = RetryPolicy::new(0)
            .run(async || {
                counter.fetch_add(1, Ordering::Relaxed);
                Err(transient())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_closure_may_borrow_mutable_state() {
        // Attempt-scoped buffers start empty; nothing leaks across
        // attempts into the final result.
        let mut buffers: Vec<String> = Vec::new();
        let mut attempt = 0;

        let result = RetryPolicy::default()
            .run(async || {
                let mut output = String::new();
                output.push_str("partial");
                attempt += 1;
                if attempt < 3 {
                    buffers.push(output);
                    Err(transient())
                } else {
                    output.push_str(" complete");
                    Ok(output)
                }
            })
            .await;

        assert_eq!(result.unwrap(), "partial complete");
        assert_eq!(buffers.len(), 2);
    }
}
