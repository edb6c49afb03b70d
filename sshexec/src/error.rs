//! Error types for sshexec.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for sshexec operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors, raised before any network I/O
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Session establishment errors
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Command execution errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// File transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// The stream ended unexpectedly during an in-flight operation.
    ///
    /// This is the only error class the retry policy treats as
    /// retryable; it surfaces to callers only after retries are
    /// exhausted.
    #[error("Transient end of stream: {0}")]
    TransientEof(String),
}

impl Error {
    /// Whether this error is a transient end-of-stream condition.
    pub fn is_transient_eof(&self) -> bool {
        matches!(self, Error::TransientEof(_))
    }

    /// Classify a russh error, routing disconnects and unexpected EOF
    /// into the transient class so the retry policy can act on them.
    pub(crate) fn from_ssh(err: russh::Error) -> Self {
        match err {
            russh::Error::Disconnect => {
                Error::TransientEof("server disconnected mid-operation".to_string())
            }
            // A dead session task rejects writes on its internal channel;
            // the next attempt reconnects from scratch.
            russh::Error::SendError => {
                Error::TransientEof("session closed underneath the operation".to_string())
            }
            russh::Error::IO(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Error::TransientEof(e.to_string())
            }
            other => ConnectionError::Ssh(other).into(),
        }
    }
}

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Proxy settings present but the proxy user is not set
    #[error("proxy user is required when a proxy host is used")]
    MissingProxyUser,

    /// Proxy settings present but the proxy host is not set
    #[error("proxy host is required when tunneling through a proxy")]
    MissingProxyHost,

    /// A required top-level field is not set
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
}

/// Session establishment errors (connection, authentication).
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to reach the host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// All configured authentication methods were rejected
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Private key could not be loaded
    #[error("SSH key error for {path}: {message}")]
    Key { path: PathBuf, message: String },

    /// Connect attempt exceeded the configured timeout
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// The relay subprocess for a proxied connection could not be started
    #[error("Proxy relay failed: {0}")]
    ProxyRelay(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Command execution errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The remote end rejected the execution request
    #[error("could not execute '{command}'")]
    Rejected { command: String },
}

/// File transfer errors.
#[derive(Error, Debug)]
pub enum TransferError {
    /// SFTP subsystem could not be started on the session
    #[error("Failed to start SFTP subsystem: {0}")]
    SubsystemFailed(russh::Error),

    /// SFTP protocol error
    #[error("SFTP error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// Upload failed
    #[error("Upload of {local} to {remote} failed: {source}")]
    Upload {
        local: PathBuf,
        remote: String,
        #[source]
        source: io::Error,
    },

    /// Download failed
    #[error("Download of {remote} to {local} failed: {source}")]
    Download {
        remote: String,
        local: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using sshexec's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let err = Error::TransientEof("connection reset".to_string());
        assert!(err.is_transient_eof());

        let err: Error = ConnectionError::Timeout(Duration::from_secs(60)).into();
        assert!(!err.is_transient_eof());
    }

    #[test]
    fn test_from_ssh_disconnect_is_transient() {
        let err = Error::from_ssh(russh::Error::Disconnect);
        assert!(err.is_transient_eof());
    }

    #[test]
    fn test_from_ssh_unexpected_eof_is_transient() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
        let err = Error::from_ssh(russh::Error::IO(io_err));
        assert!(err.is_transient_eof());
    }

    #[test]
    fn test_from_ssh_other_errors_are_fatal() {
        let err = Error::from_ssh(russh::Error::NotAuthenticated);
        assert!(!err.is_transient_eof());
    }

    #[test]
    fn test_command_rejection_names_the_command() {
        let err: Error = CommandError::Rejected {
            command: "uname -a".to_string(),
        }
        .into();
        assert!(err.to_string().contains("could not execute 'uname -a'"));
    }

    #[test]
    fn test_proxy_config_errors_name_the_field() {
        assert!(ConfigError::MissingProxyUser.to_string().contains("proxy user"));
        assert!(ConfigError::MissingProxyHost.to_string().contains("proxy host"));
    }
}
