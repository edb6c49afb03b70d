//! Interactive console invocation.
//!
//! Builds the argument vector for an interactive `ssh` login matching
//! the connection's configuration and, at a CLI boundary only,
//! replaces the current process with it. The replacing call never
//! returns on success, so it must be the terminal action of an entry
//! point, never library plumbing that expects control back.

use log::debug;

use crate::error::Result;
use crate::transport::config::ConnectionConfig;
use crate::transport::proxy::{ProxyCommand, SERVER_ALIVE_INTERVAL};

/// The secure-shell client binary.
const SSH_PROGRAM: &str = "ssh";

/// Build the argument vector (program included) for an interactive
/// console session.
///
/// Flags appear only for explicitly configured options: the identity
/// flag iff identity files are set, the port flag iff a port is set,
/// and the `ProxyCommand` option iff a proxy is configured. Proxy
/// validation runs before anything else.
pub fn command_args(config: &ConnectionConfig) -> Result<Vec<String>> {
    let mut args = vec![SSH_PROGRAM.to_string(), "-q".to_string()];

    if config.forward_agent {
        args.push("-A".to_string());
    }
    if !config.host_key_verify {
        args.push("-o".to_string());
        args.push("UserKnownHostsFile=/dev/null".to_string());
        args.push("-o".to_string());
        args.push("StrictHostKeyChecking=no".to_string());
    }
    args.push("-o".to_string());
    args.push("KeepAlive=yes".to_string());
    args.push("-o".to_string());
    args.push(format!("ServerAliveInterval={SERVER_ALIVE_INTERVAL}"));

    if let Some(level) = config.compression_level {
        args.push("-o".to_string());
        args.push(format!("CompressionLevel={level}"));
    }

    for identity in &config.identity_files {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }
    if let Some(port) = config.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }

    if let Some(proxy) = &config.proxy {
        let relay = ProxyCommand::build(proxy, config.host_key_verify)?;
        args.push("-o".to_string());
        args.push(format!("ProxyCommand={relay}"));
    }

    args.push(config.destination());
    Ok(args)
}

/// Replace the current process with the interactive console.
///
/// On success this call does not return; the process image becomes the
/// shell client's. The only way it returns is an error (invalid proxy
/// configuration, or the exec itself failing).
#[cfg(unix)]
pub fn exec_console(config: &ConnectionConfig) -> Result<std::convert::Infallible> {
    use std::os::unix::process::CommandExt;

    let args = command_args(config)?;
    debug!("replacing process with: {}", args.join(" "));

    let err = std::process::Command::new(&args[0]).args(&args[1..]).exec();
    Err(crate::error::ConnectionError::Io(err).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::config::ProxyConfig;

    #[test]
    fn test_flags_present_iff_configured() {
        let config = ConnectionConfig::builder("target")
            .user("bob")
            .identity_file("/k")
            .port(2222)
            .proxy(ProxyConfig {
                host: Some("jump".to_string()),
                user: Some("bob".to_string()),
                ..Default::default()
            })
            .build();

        let args = command_args(&config).unwrap();
        let joined = args.join(" ");

        assert!(joined.contains("-i /k"));
        assert!(joined.contains("-p 2222"));
        assert!(joined.contains("ProxyCommand=ssh -q"));
        assert!(joined.ends_with("bob@target"));
    }

    #[test]
    fn test_omitting_port_drops_the_flag() {
        let config = ConnectionConfig::builder("target")
            .user("bob")
            .identity_file("/k")
            .build();

        let args = command_args(&config).unwrap();
        assert!(!args.contains(&"-p".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("ProxyCommand=")));
    }

    #[test]
    fn test_no_identity_no_flag() {
        let config = ConnectionConfig::new("target");
        let args = command_args(&config).unwrap();
        assert!(!args.contains(&"-i".to_string()));
    }

    #[test]
    fn test_agent_forwarding_follows_config() {
        let on = command_args(&ConnectionConfig::new("target")).unwrap();
        assert!(on.contains(&"-A".to_string()));

        let off = command_args(
            &ConnectionConfig::builder("target").forward_agent(false).build(),
        )
        .unwrap();
        assert!(!off.contains(&"-A".to_string()));
    }

    #[test]
    fn test_keepalive_always_present() {
        let args = command_args(&ConnectionConfig::new("target")).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-o KeepAlive=yes"));
        assert!(joined.contains("-o ServerAliveInterval=60"));
    }

    #[test]
    fn test_host_key_verify_drops_known_hosts_override() {
        let config = ConnectionConfig::builder("target").host_key_verify(true).build();
        let args = command_args(&config).unwrap();
        let joined = args.join(" ");
        assert!(!joined.contains("UserKnownHostsFile"));
        assert!(!joined.contains("StrictHostKeyChecking"));
    }

    #[test]
    fn test_invalid_proxy_fails_before_building() {
        let config = ConnectionConfig::builder("target")
            .proxy(ProxyConfig {
                host: Some("jump".to_string()),
                ..Default::default()
            })
            .build();

        let err = command_args(&config).unwrap_err();
        assert!(err.to_string().contains("proxy user"));
    }

    #[test]
    fn test_compression_level_flag() {
        let config = ConnectionConfig::builder("target").compression_level(6).build();
        let args = command_args(&config).unwrap();
        assert!(args.join(" ").contains("-o CompressionLevel=6"));
    }
}
