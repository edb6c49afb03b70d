//! Remote command execution over a session channel.
//!
//! Each execution opens a fresh channel, requests `exec`, and drains
//! channel messages until the remote side closes. Output handling is
//! delegated to the demultiplexing collector; the calling task blocks
//! in the message loop, which is the operation's sole suspension
//! point. There is no per-command timeout.

mod demux;

use demux::{OutputCollector, StreamKind};

use log::debug;
use russh::ChannelMsg;

use crate::error::{CommandError, Error, Result};
use crate::transport::config::ConnectionConfig;
use crate::transport::Session;

/// Options for a single command execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Suppress echoing to the output sinks. The accumulated result is
    /// unaffected.
    pub silence: bool,
}

impl ExecOptions {
    /// Options with sink echoing suppressed.
    pub fn silenced() -> Self {
        Self { silence: true }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Concatenation of every stdout and stderr chunk, in arrival
    /// order.
    pub output: String,

    /// The remote command's exit status, or `None` when the channel
    /// closed without reporting one.
    pub exit_status: Option<u32>,
}

impl ExecResult {
    /// Whether the remote command reported success.
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

impl std::fmt::Display for ExecResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)
    }
}

/// Run one command attempt over the session.
///
/// stderr arrives as extended data stream 1; everything funnels into
/// one collector in arrival order. A channel that ends without EOF,
/// close, or an exit status died mid-stream and maps to the transient
/// class so the retry layer can reconnect and re-run.
pub(crate) async fn run(
    session: &Session,
    config: &ConnectionConfig,
    command: &str,
    options: ExecOptions,
) -> Result<ExecResult> {
    debug!("executing '{command}' on {}", config.destination());

    let mut channel = session.open_channel().await?;
    if let Err(err) = channel.exec(true, command).await {
        let classified = Error::from_ssh(err);
        if classified.is_transient_eof() {
            return Err(classified);
        }
        return Err(CommandError::Rejected {
            command: command.to_string(),
        }
        .into());
    }

    let mut collector = OutputCollector::new(config, options.silence);
    let mut exit_status = None;
    let mut stream_closed = false;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => collector.data(StreamKind::Stdout, data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                collector.data(StreamKind::Stderr, data)
            }
            // The exit status can arrive before trailing data; keep
            // draining until the channel actually ends.
            ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
            ChannelMsg::Eof | ChannelMsg::Close => stream_closed = true,
            ChannelMsg::Failure => {
                return Err(CommandError::Rejected {
                    command: command.to_string(),
                }
                .into());
            }
            _ => {}
        }
    }

    if exit_status.is_none() && !stream_closed {
        return Err(Error::TransientEof(format!(
            "channel for '{command}' ended without closing"
        )));
    }

    Ok(ExecResult {
        output: collector.into_output(),
        exit_status,
    })
}
