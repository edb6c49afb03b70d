//! Transport layer wrapping russh.
//!
//! This module provides connection configuration, proxy-command
//! construction, and session establishment (direct or tunneled).

pub mod config;
pub mod proxy;
mod session;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, OutputSink, ProxyConfig};
pub use proxy::ProxyCommand;
pub use session::Session;
