//! Connection configuration.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{ConfigError, Result};

/// Default connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared writable sink for command output.
///
/// Sinks are cloned into each execution, so a test can hand in an
/// `Arc<Mutex<Vec<u8>>>` and inspect what was echoed.
pub type OutputSink = Arc<Mutex<dyn io::Write + Send>>;

/// Connection configuration.
///
/// Every recognized option is an explicit field with a documented
/// default; only fields that differ from their default are passed
/// through to the underlying client.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Target host (hostname or IP address). Required.
    pub host: String,

    /// SSH port. `None` uses the client default (22).
    pub port: Option<u16>,

    /// Username for authentication. `None` uses the client default.
    pub user: Option<String>,

    /// Password for authentication.
    pub password: Option<SecretString>,

    /// Private key files, tried in order before the password.
    pub identity_files: Vec<PathBuf>,

    /// Connect timeout (default: 60 s).
    pub timeout: Duration,

    /// Negotiate transport compression.
    pub compression: bool,

    /// Compression level, applied where the surface supports it.
    pub compression_level: Option<u32>,

    /// Forward the local SSH agent (default: true).
    pub forward_agent: bool,

    /// Verify the remote host key against known hosts (default: false).
    pub host_key_verify: bool,

    /// Destination for echoed stdout. `None` writes to the process stdout.
    pub stdout: Option<OutputSink>,

    /// Destination for echoed stderr. `None` writes to the process stderr.
    pub stderr: Option<OutputSink>,

    /// Tunnel the connection through an intermediate host.
    pub proxy: Option<ProxyConfig>,
}

/// Configuration for tunneling through an intermediate proxy host.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Proxy host. Required when a proxy is used.
    pub host: Option<String>,

    /// User on the proxy host. Required when a proxy is used.
    pub user: Option<String>,

    /// Proxy SSH port. `None` uses the client default.
    pub port: Option<u16>,

    /// Private key files for authenticating to the proxy.
    pub identity_files: Vec<PathBuf>,
}

impl ProxyConfig {
    /// Check the proxy invariant: user and host must both be set.
    ///
    /// The user is validated first, then the host. This runs before
    /// any network activity.
    pub fn validate(&self) -> Result<(&str, &str)> {
        let user = self
            .user
            .as_deref()
            .ok_or(ConfigError::MissingProxyUser)?;
        let host = self
            .host
            .as_deref()
            .ok_or(ConfigError::MissingProxyHost)?;
        Ok((user, host))
    }
}

impl ConnectionConfig {
    /// Create a configuration for the given host with all defaults.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
            password: None,
            identity_files: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            compression: false,
            compression_level: None,
            forward_agent: true,
            host_key_verify: false,
            stdout: None,
            stderr: None,
            proxy: None,
        }
    }

    /// Start building a configuration for the given host.
    pub fn builder(host: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self::new(host),
        }
    }

    /// The `user@host` login target, falling back to the bare host
    /// when no user is configured.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Effective port for socket connection.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(22)
    }

    /// Validate the configuration, including the proxy invariant.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField { field: "host" }.into());
        }
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identity_files", &self.identity_files)
            .field("timeout", &self.timeout)
            .field("compression", &self.compression)
            .field("compression_level", &self.compression_level)
            .field("forward_agent", &self.forward_agent)
            .field("host_key_verify", &self.host_key_verify)
            .field("proxy", &self.proxy)
            .finish()
    }
}

/// Fluent builder for [`ConnectionConfig`].
///
/// # Example
///
/// ```rust
/// use sshexec::ConnectionConfig;
///
/// let config = ConnectionConfig::builder("198.51.100.7")
///     .user("deploy")
///     .identity_file("~/.ssh/id_ed25519")
///     .build();
/// ```
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the SSH port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(SecretString::from(password.into()));
        self
    }

    /// Add a private key file. May be called multiple times; keys are
    /// tried in insertion order.
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.identity_files.push(path.into());
        self
    }

    /// Set the connect timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Enable transport compression.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    /// Set the compression level.
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = Some(level);
        self
    }

    /// Control SSH agent forwarding (default: enabled).
    pub fn forward_agent(mut self, enabled: bool) -> Self {
        self.config.forward_agent = enabled;
        self
    }

    /// Control host key verification (default: disabled).
    pub fn host_key_verify(mut self, enabled: bool) -> Self {
        self.config.host_key_verify = enabled;
        self
    }

    /// Redirect echoed stdout to the given sink.
    pub fn stdout(mut self, sink: OutputSink) -> Self {
        self.config.stdout = Some(sink);
        self
    }

    /// Redirect echoed stderr to the given sink.
    pub fn stderr(mut self, sink: OutputSink) -> Self {
        self.config.stderr = Some(sink);
        self
    }

    /// Tunnel through the given proxy.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Finish building.
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}
