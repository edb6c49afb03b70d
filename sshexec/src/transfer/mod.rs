//! SFTP file transfer.
//!
//! Transfers run over the SFTP subsystem on a dedicated channel of the
//! connection's session, streamed in fixed-size chunks with lifecycle
//! events logged along the way. Missing intermediate remote
//! directories are created on upload.

mod event;

pub use event::TransferEvent;

use std::io;
use std::path::Path;

use log::debug;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use event::observe;

use crate::error::{Error, Result, TransferError};
use crate::transport::Session;

/// Chunk size for streamed reads and writes.
const TRANSFER_CHUNK_SIZE: usize = 32 * 1024;

/// Start an SFTP session on a fresh channel.
///
/// Some sshd installations ship with the subsystem disabled; that
/// surfaces here as a transfer error rather than later as a protocol
/// failure.
pub(crate) async fn open_sftp(session: &Session) -> Result<SftpSession> {
    let channel = session.open_channel().await?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(TransferError::SubsystemFailed)?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(TransferError::Sftp)?;
    Ok(sftp)
}

/// Upload one local file to `remote`, creating missing intermediate
/// remote directories. Returns `true` on success.
pub(crate) async fn upload(sftp: &SftpSession, local: &Path, remote: &str) -> Result<bool> {
    debug!("uploading {} to {remote}", local.display());

    let data = tokio::fs::read(local)
        .await
        .map_err(|e| upload_error(local, remote, e))?;

    for dir in remote_parent_dirs(remote) {
        // Creation failures mean the directory already exists or the
        // open below will fail with the real cause.
        if sftp.create_dir(dir.clone()).await.is_ok() {
            observe(&TransferEvent::Mkdir { path: dir });
        }
    }

    observe(&TransferEvent::Open {
        path: remote.to_string(),
        size: data.len() as u64,
    });

    let mut file = sftp
        .open_with_flags(
            remote,
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
        )
        .await
        .map_err(TransferError::Sftp)?;

    let mut offset = 0u64;
    for chunk in data.chunks(TRANSFER_CHUNK_SIZE) {
        file.write_all(chunk)
            .await
            .map_err(|e| upload_error(local, remote, e))?;
        observe(&TransferEvent::Put {
            path: remote.to_string(),
            offset,
            size: chunk.len(),
        });
        offset += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| upload_error(local, remote, e))?;
    file.shutdown()
        .await
        .map_err(|e| upload_error(local, remote, e))?;

    observe(&TransferEvent::Close {
        path: remote.to_string(),
    });
    observe(&TransferEvent::Finish);
    Ok(true)
}

/// Download `remote` into one local file. Returns `true` on success.
pub(crate) async fn download(sftp: &SftpSession, remote: &str, local: &Path) -> Result<bool> {
    debug!("downloading {remote} to {}", local.display());

    let size = sftp
        .metadata(remote)
        .await
        .ok()
        .and_then(|attrs| attrs.size)
        .unwrap_or(0);

    observe(&TransferEvent::Open {
        path: remote.to_string(),
        size,
    });

    let mut remote_file = sftp
        .open_with_flags(remote, OpenFlags::READ)
        .await
        .map_err(TransferError::Sftp)?;

    let mut local_file = tokio::fs::File::create(local)
        .await
        .map_err(|e| download_error(remote, local, e))?;

    let mut offset = 0u64;
    let mut chunk = vec![0u8; TRANSFER_CHUNK_SIZE];
    loop {
        let read = remote_file
            .read(&mut chunk)
            .await
            .map_err(|e| download_error(remote, local, e))?;
        if read == 0 {
            break;
        }
        local_file
            .write_all(&chunk[..read])
            .await
            .map_err(|e| download_error(remote, local, e))?;
        observe(&TransferEvent::Get {
            path: remote.to_string(),
            offset,
            size: read,
        });
        offset += read as u64;
    }

    local_file
        .flush()
        .await
        .map_err(|e| download_error(remote, local, e))?;

    observe(&TransferEvent::Close {
        path: remote.to_string(),
    });
    observe(&TransferEvent::Finish);
    Ok(true)
}

/// Every intermediate directory of a remote path, shallowest first.
fn remote_parent_dirs(remote: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut current = String::new();

    let parents: Vec<&str> = remote.split('/').collect();
    let Some((_, components)) = parents.split_last() else {
        return dirs;
    };

    for component in components {
        if component.is_empty() {
            continue;
        }
        if current.is_empty() && !remote.starts_with('/') {
            current.push_str(component);
        } else {
            current.push('/');
            current.push_str(component);
        }
        dirs.push(current.clone());
    }
    dirs
}

/// A mid-stream EOF is the transient class; anything else is a plain
/// upload failure.
fn upload_error(local: &Path, remote: &str, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return Error::TransientEof(err.to_string());
    }
    TransferError::Upload {
        local: local.to_path_buf(),
        remote: remote.to_string(),
        source: err,
    }
    .into()
}

fn download_error(remote: &str, local: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return Error::TransientEof(err.to_string());
    }
    TransferError::Download {
        remote: remote.to_string(),
        local: local.to_path_buf(),
        source: err,
    }
    .into()
}
