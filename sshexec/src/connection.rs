//! Connection lifecycle and the operation surface.
//!
//! A [`Connection`] owns one configuration and the session lazily
//! established from it. Operations take `&mut self`, which makes the
//! one-operation-at-a-time contract structural: callers wanting
//! parallel remote work use separate connections.

use std::path::Path;

use log::debug;
use russh_sftp::client::SftpSession;

use crate::error::Result;
use crate::exec::{self, ExecOptions, ExecResult};
use crate::retry::RetryPolicy;
use crate::transfer;
use crate::transport::{ConnectionConfig, Session};

/// A single-session connection to one remote host.
///
/// The session is established on first use and reused until
/// [`close`](Connection::close) or a transient failure invalidates it;
/// the SFTP sub-session is cached independently. Transient
/// end-of-stream failures are retried transparently, reconnecting
/// between attempts.
///
/// # Example
///
/// ```rust,no_run
/// use sshexec::{Connection, ConnectionConfig, ExecOptions};
///
/// # async fn example() -> Result<(), sshexec::Error> {
/// let config = ConnectionConfig::builder("192.0.2.10")
///     .user("admin")
///     .identity_file("/home/admin/.ssh/id_ed25519")
///     .build();
///
/// let mut connection = Connection::new(config);
/// let result = connection.exec("uname -a", ExecOptions::default()).await?;
/// println!("{}", result.output);
///
/// connection.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    config: ConnectionConfig,
    session: Option<Session>,
    sftp: Option<SftpSession>,
    retry: RetryPolicy,
}

impl Connection {
    /// Create a connection for the given configuration. No network
    /// activity happens until the first operation or [`connect`].
    ///
    /// [`connect`]: Connection::connect
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: None,
            sftp: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy applied to operations.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The configuration this connection was built from.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Establish the session now instead of on first use.
    ///
    /// Subsequent calls reuse the cached session.
    pub async fn connect(&mut self) -> Result<()> {
        self.ensure_session().await?;
        Ok(())
    }

    /// Whether an established session is currently cached and alive.
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Execute a command on the remote host.
    ///
    /// Opens a channel on the (lazily established) session, streams
    /// demultiplexed output to the configured sinks, and blocks until
    /// the remote side closes the channel. Retried transparently on
    /// transient end-of-stream failures; each attempt starts with an
    /// empty output buffer.
    pub async fn exec(&mut self, command: &str, options: ExecOptions) -> Result<ExecResult> {
        let retry = self.retry;
        retry
            .run(async || self.exec_attempt(command, options).await)
            .await
    }

    /// Upload a local file to the remote host, creating missing
    /// intermediate remote directories. Returns `true` on success.
    pub async fn upload(&mut self, local: impl AsRef<Path>, remote: &str) -> Result<bool> {
        let local = local.as_ref();
        let retry = self.retry;
        retry
            .run(async || self.upload_attempt(local, remote).await)
            .await
    }

    /// Download a remote file to the local filesystem. Returns `true`
    /// on success.
    pub async fn download(&mut self, remote: &str, local: impl AsRef<Path>) -> Result<bool> {
        let local = local.as_ref();
        let retry = self.retry;
        retry
            .run(async || self.download_attempt(remote, local).await)
            .await
    }

    /// Close the session.
    ///
    /// Idempotent: closing a never-opened or already-closed connection
    /// is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.sftp = None;
        if let Some(session) = self.session.take() {
            if !session.is_closed() {
                session.close().await?;
            }
            debug!("session to {} closed", self.config.host);
        }
        Ok(())
    }

    async fn exec_attempt(&mut self, command: &str, options: ExecOptions) -> Result<ExecResult> {
        let config = self.config.clone();
        let session = self.ensure_session().await?;
        let result = exec::run(session, &config, command, options).await;
        self.invalidate_on_transient(&result);
        result
    }

    async fn upload_attempt(&mut self, local: &Path, remote: &str) -> Result<bool> {
        let sftp = self.ensure_sftp().await?;
        let result = transfer::upload(sftp, local, remote).await;
        self.invalidate_on_transient(&result);
        result
    }

    async fn download_attempt(&mut self, remote: &str, local: &Path) -> Result<bool> {
        let sftp = self.ensure_sftp().await?;
        let result = transfer::download(sftp, remote, local).await;
        self.invalidate_on_transient(&result);
        result
    }

    /// The cached session, establishing it on first use.
    async fn ensure_session(&mut self) -> Result<&Session> {
        let session = match self.session.take() {
            Some(session) => session,
            None => Session::establish(&self.config).await?,
        };
        Ok(self.session.insert(session))
    }

    /// The cached SFTP sub-session, starting it on first use.
    async fn ensure_sftp(&mut self) -> Result<&SftpSession> {
        let sftp = match self.sftp.take() {
            Some(sftp) => sftp,
            None => {
                let session = self.ensure_session().await?;
                transfer::open_sftp(session).await?
            }
        };
        Ok(self.sftp.insert(sftp))
    }

    /// Drop cached handles after a transient failure so the next
    /// attempt reconnects from scratch.
    fn invalidate_on_transient<T>(&mut self, result: &Result<T>) {
        if let Err(err) = result {
            if err.is_transient_eof() {
                debug!("invalidating session to {} after: {err}", self.config.host);
                self.sftp = None;
                self.session = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_is_a_noop_when_never_opened() {
        let mut connection = Connection::new(ConnectionConfig::new("203.0.113.9"));
        assert!(!connection.is_connected());
        assert!(connection.close().await.is_ok());
        // And again: still a no-op.
        assert!(connection.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_operations_validate_proxy_config_before_connecting() {
        use crate::transport::ProxyConfig;

        // An unroutable proxy config must fail validation, not I/O.
        let mut config = ConnectionConfig::new("203.0.113.9");
        config.proxy = Some(ProxyConfig {
            host: Some("jump.example.com".to_string()),
            ..Default::default()
        });

        let mut connection = Connection::new(config);
        let err = connection.connect().await.unwrap_err();
        assert!(err.to_string().contains("proxy user"));
    }

    #[test]
    fn test_config_accessor() {
        let connection = Connection::new(ConnectionConfig::new("203.0.113.9"));
        assert_eq!(connection.config().host, "203.0.113.9");
    }
}
