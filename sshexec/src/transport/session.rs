//! Session establishment over russh.
//!
//! A [`Session`] is the authenticated transport a connection's
//! operations run over. It is created here, either over a direct TCP
//! socket or over a spawned proxy relay, and owned by the connection
//! that requested it.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, Preferred};
use secrecy::ExposeSecret;

use super::config::ConnectionConfig;
use super::proxy::{ProxyTunnel, SERVER_ALIVE_INTERVAL};
use crate::error::{ConnectionError, Error, Result};

/// An established, authenticated SSH session.
///
/// Owned exclusively by the connection that created it; never shared
/// between concurrent operations. For proxied connections the relay
/// subprocess lives here so its lifetime matches the session's.
pub struct Session {
    handle: Handle<SessionHandler>,
    _tunnel: Option<ProxyTunnel>,
}

impl Session {
    /// Establish a session for the given configuration.
    ///
    /// Tunnels through the proxy relay when one is configured,
    /// otherwise connects directly. Fails with a connection error on
    /// timeout, refusal, or rejected authentication; the proxy
    /// invariant is checked before any network activity.
    pub async fn establish(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let ssh_config = Arc::new(merge_client_options(config));
        let handler = SessionHandler {
            host: config.host.clone(),
            port: config.effective_port(),
            host_key_verify: config.host_key_verify,
        };

        let (mut handle, tunnel) = if config.proxy.is_some() {
            let (tunnel, stream) = ProxyTunnel::spawn(config)?;
            let handle = tokio::time::timeout(
                config.timeout,
                client::connect_stream(ssh_config, stream, handler),
            )
            .await
            .map_err(|_| ConnectionError::Timeout(config.timeout))?
            .map_err(ConnectionError::Ssh)?;
            (handle, Some(tunnel))
        } else {
            let addr = (config.host.as_str(), config.effective_port());
            let handle = tokio::time::timeout(
                config.timeout,
                client::connect(ssh_config, addr, handler),
            )
            .await
            .map_err(|_| ConnectionError::Timeout(config.timeout))?
            .map_err(ConnectionError::Ssh)?;
            (handle, None)
        };

        authenticate(&mut handle, config).await?;
        debug!("session established to {}", config.destination());

        Ok(Self {
            handle,
            _tunnel: tunnel,
        })
    }

    /// Open a channel for one command or one subsystem.
    ///
    /// A dead session surfaces here as a transient end-of-stream error
    /// so the retry layer can reconnect.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(Error::from_ssh)
    }

    /// Whether the underlying transport has shut down.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Disconnect from the remote host.
    pub async fn close(&self) -> Result<()> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(ConnectionError::Ssh)?;
        Ok(())
    }
}

/// Map explicitly-set configuration fields onto the client options.
///
/// Unset fields keep the client's own defaults; the keepalive interval
/// is pinned to the same 60 s the relay and console commands advertise.
fn merge_client_options(config: &ConnectionConfig) -> client::Config {
    let mut options = client::Config {
        inactivity_timeout: Some(config.timeout),
        keepalive_interval: Some(Duration::from_secs(SERVER_ALIVE_INTERVAL as u64)),
        ..Default::default()
    };
    if config.compression {
        options.preferred = Preferred::COMPRESSED;
    }
    options
}

/// The username to authenticate as: the configured user, or the local
/// login name when unset.
fn login_user(config: &ConnectionConfig) -> String {
    config.user.clone().unwrap_or_else(|| {
        env::var("USER")
            .or_else(|_| env::var("LOGNAME"))
            .unwrap_or_else(|_| "root".to_string())
    })
}

/// Authenticate with every configured identity file in order, then the
/// password, then a none-auth probe when nothing is configured.
async fn authenticate(handle: &mut Handle<SessionHandler>, config: &ConnectionConfig) -> Result<()> {
    let user = login_user(config);

    for identity in &config.identity_files {
        let key = match load_secret_key(identity, None) {
            Ok(key) => key,
            Err(e) => {
                warn!("skipping identity file {}: {e}", identity.display());
                continue;
            }
        };

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .map_err(ConnectionError::Ssh)?
            .flatten();

        let auth = handle
            .authenticate_publickey(&user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
            .await
            .map_err(ConnectionError::Ssh)?;
        if auth.success() {
            debug!("authenticated with identity file {}", identity.display());
            return Ok(());
        }
    }

    if let Some(password) = &config.password {
        let auth = handle
            .authenticate_password(&user, password.expose_secret())
            .await
            .map_err(ConnectionError::Ssh)?;
        if auth.success() {
            debug!("authenticated with password");
            return Ok(());
        }
    }

    if config.identity_files.is_empty() && config.password.is_none() {
        let auth = handle
            .authenticate_none(&user)
            .await
            .map_err(ConnectionError::Ssh)?;
        if auth.success() {
            return Ok(());
        }
    }

    Err(ConnectionError::AuthenticationFailed { user }.into())
}

/// Client-side handler deciding host key acceptance.
struct SessionHandler {
    host: String,
    port: u16,
    host_key_verify: bool,
}

impl client::Handler for SessionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if !self.host_key_verify {
            // Known-hosts checking is disabled by default for this
            // subsystem; accept whatever the server presents.
            return Ok(true);
        }

        match russh::keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(matched) => Ok(matched),
            Err(e) => {
                warn!(
                    "host key verification failed for {}:{}: {e}",
                    self.host, self.port
                );
                Ok(false)
            }
        }
    }
}
