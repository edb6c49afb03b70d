//! # sshexec
//!
//! Async single-session SSH client for remote command execution and
//! SFTP file transfer, with proxy-host tunneling and transparent retry
//! on transient stream failures.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, established lazily and reused
//! - Tunneling through an intermediate host via a spawned relay command
//! - Command execution with ordered stdout/stderr demultiplexing
//! - SFTP upload/download with lifecycle event logging
//! - Bounded, transparent retry across reconnect boundaries
//! - Interactive console hand-off (process replacement) for CLI entry
//!   points
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sshexec::{Connection, ConnectionConfig, ExecOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sshexec::Error> {
//!     let config = ConnectionConfig::builder("192.168.1.20")
//!         .user("admin")
//!         .identity_file("/home/admin/.ssh/id_ed25519")
//!         .build();
//!
//!     let mut connection = Connection::new(config);
//!
//!     let result = connection.exec("uptime", ExecOptions::default()).await?;
//!     println!("{}", result.output);
//!
//!     connection.upload("/tmp/app.tar.gz", "/srv/app/app.tar.gz").await?;
//!
//!     connection.close().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod console;
pub mod error;
pub mod exec;
pub mod retry;
pub mod transfer;
pub mod transport;

// Re-export main types for convenience
pub use connection::Connection;
pub use error::Error;
pub use exec::{ExecOptions, ExecResult};
pub use retry::RetryPolicy;
pub use transfer::TransferEvent;
pub use transport::{ConnectionConfig, ConnectionConfigBuilder, OutputSink, ProxyCommand, ProxyConfig};
