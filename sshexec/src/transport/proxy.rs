//! Proxy command construction and the relay subprocess.
//!
//! A proxied connection runs the SSH transport over a locally spawned
//! relay command (`ssh … proxyuser@proxyhost nc %h %p`) instead of a
//! direct TCP socket, the same way OpenSSH treats `ProxyCommand`.

use std::process::Stdio;

use log::debug;
use tokio::io::Join;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::config::{ConnectionConfig, ProxyConfig};
use crate::error::{ConnectionError, Result};

/// Keepalive interval advertised to proxy and console invocations.
pub(crate) const SERVER_ALIVE_INTERVAL: u32 = 60;

/// Builder for the shell command that relays a connection through an
/// intermediate host.
///
/// The produced string keeps the OpenSSH `%h`/`%p` placeholders for the
/// ultimate target; [`ProxyCommand::expand`] substitutes them when the
/// relay is spawned locally, and the console command embeds the raw
/// form as its `ProxyCommand` option.
pub struct ProxyCommand;

impl ProxyCommand {
    /// Build the relay command for the given proxy configuration.
    ///
    /// Fails with a config error naming the missing field if the proxy
    /// user or host is absent; no network activity happens here.
    pub fn build(proxy: &ProxyConfig, host_key_verify: bool) -> Result<String> {
        let (user, host) = proxy.validate()?;

        let mut command = String::from("ssh -q");
        if !host_key_verify {
            command.push_str(" -o UserKnownHostsFile=/dev/null");
            command.push_str(" -o StrictHostKeyChecking=no");
        }
        command.push_str(" -o KeepAlive=yes");
        command.push_str(&format!(" -o ServerAliveInterval={SERVER_ALIVE_INTERVAL}"));

        for identity in &proxy.identity_files {
            command.push_str(&format!(" -i {}", identity.display()));
        }
        if let Some(port) = proxy.port {
            command.push_str(&format!(" -p {port}"));
        }

        command.push_str(&format!(" {user}@{host} nc %h %p"));
        Ok(command)
    }

    /// Expand the `%h`/`%p` placeholders with the ultimate target's
    /// host and port. `%%` yields a literal percent sign.
    pub fn expand(command: &str, host: &str, port: u16) -> String {
        let mut expanded = String::with_capacity(command.len() + host.len());
        let mut chars = command.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                expanded.push(c);
                continue;
            }
            match chars.next() {
                Some('h') => expanded.push_str(host),
                Some('p') => expanded.push_str(&port.to_string()),
                Some('%') => expanded.push('%'),
                Some(other) => {
                    expanded.push('%');
                    expanded.push(other);
                }
                None => expanded.push('%'),
            }
        }
        expanded
    }
}

/// A running relay subprocess and the duplex stream over its stdio.
///
/// The child is killed when the tunnel is dropped, tearing the relay
/// down together with the session it carried.
pub(crate) struct ProxyTunnel {
    child: Child,
}

impl ProxyTunnel {
    /// Spawn the relay for `config`'s proxy and return the tunnel plus
    /// the byte stream the SSH transport runs over.
    pub(crate) fn spawn(
        config: &ConnectionConfig,
    ) -> Result<(Self, Join<ChildStdout, ChildStdin>)> {
        let proxy = config
            .proxy
            .as_ref()
            .ok_or_else(|| ConnectionError::ProxyRelay("no proxy configured".to_string()))?;

        let template = ProxyCommand::build(proxy, config.host_key_verify)?;
        let command = ProxyCommand::expand(&template, &config.host, config.effective_port());
        debug!("spawning proxy relay: {command}");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConnectionError::ProxyRelay(format!("failed to spawn '{command}': {e}"))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ConnectionError::ProxyRelay("relay stdout unavailable".to_string())
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            ConnectionError::ProxyRelay("relay stdin unavailable".to_string())
        })?;

        Ok((Self { child }, tokio::io::join(stdout, stdin)))
    }
}

impl Drop for ProxyTunnel {
    fn drop(&mut self) {
        // kill_on_drop covers the process; reap it if already gone.
        let _ = self.child.try_wait();
    }
}
