// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket listener with authenticated peer identity.
//!
//! Socket acquisition is scoped: the path is validated and the stale entry
//! probed before binding, permissions are clamped, and the bound socket is
//! removed again at shutdown. Every accepted connection derives its peer
//! credentials first; a connection whose peer cannot be identified is closed
//! without reading a byte.

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fk_core::{CallerContext, ErrorCode, PeerIdentity};
use fk_wire::{encode, FrameDecoder};

use crate::dispatch::{self, KernelCtx};

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("socket path {0} exists and is not a socket")]
    NonSocketPath(PathBuf),

    #[error("socket {0} is already in use")]
    SocketInUse(PathBuf),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ListenError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ListenError::NonSocketPath(_) => ErrorCode::NonSocketPath,
            ListenError::SocketInUse(_) => ErrorCode::SocketInUse,
            ListenError::Io { .. } => ErrorCode::Internal,
        }
    }
}

pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("path", &self.path).finish()
    }
}

impl Listener {
    /// Acquire the listening socket.
    ///
    /// The parent directory is created with mode 0o700. An existing path is
    /// refused when it is not a socket; a live socket (a transient connect
    /// succeeds) is refused; a stale one is removed. The bound socket is
    /// chmodded to 0o600.
    pub fn bind(path: &Path) -> Result<Self, ListenError> {
        let io_err = |source| ListenError::Io { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                .map_err(io_err)?;
        }

        if let Ok(meta) = std::fs::symlink_metadata(path) {
            if !meta.file_type().is_socket() {
                return Err(ListenError::NonSocketPath(path.to_path_buf()));
            }
            match std::os::unix::net::UnixStream::connect(path) {
                Ok(_) => return Err(ListenError::SocketInUse(path.to_path_buf())),
                Err(_) => {
                    debug!(path = %path.display(), "removing stale socket");
                    std::fs::remove_file(path).map_err(io_err)?;
                }
            }
        }

        let listener = UnixListener::bind(path).map_err(io_err)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;

        info!(path = %path.display(), "kernel socket bound");
        Ok(Self { listener, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` fires, then cancel every live
    /// connection before returning.
    pub async fn run(self, ctx: Arc<KernelCtx>, shutdown: CancellationToken) {
        let connections = CancellationToken::new();
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let ctx = Arc::clone(&ctx);
                            let cancel = connections.child_token();
                            tokio::spawn(async move {
                                handle_connection(stream, ctx, cancel).await;
                            });
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    // Destroy live connections first, then stop accepting.
                    connections.cancel();
                    break;
                }
            }
        }
        let _ = std::fs::remove_file(&self.path);
        info!("listener stopped");
    }
}

/// Serve one connection: derive the peer, then decode frames and dispatch
/// them in arrival order. A handler completes before the next frame on the
/// same connection is dispatched.
async fn handle_connection(stream: UnixStream, ctx: Arc<KernelCtx>, cancel: CancellationToken) {
    let caller = match peer_context(&stream) {
        Some(caller) => caller,
        None => {
            // Close without reading: an unidentifiable peer gets nothing.
            warn!("peer credentials unavailable, refusing connection");
            return;
        }
    };
    debug!(pid = caller.peer.pid, uid = caller.peer.uid, "connection accepted");

    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(error = %e, "connection read failed");
                    break;
                }
            },
            _ = cancel.cancelled() => break,
        };

        for message in decoder.push(&buf[..n]) {
            let response = dispatch::dispatch(&ctx, &caller, message).await;
            let frame = match encode(&response) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "response encoding failed");
                    continue;
                }
            };
            if let Err(e) = writer.write_all(&frame).await {
                debug!(error = %e, "connection write failed");
                return;
            }
        }
    }
    debug!(pid = caller.peer.pid, "connection closed");
}

/// Read the peer credential triple from the socket. `None` when the OS does
/// not supply them (the kernel then refuses the connection).
fn peer_context(stream: &UnixStream) -> Option<CallerContext> {
    let cred = stream.peer_cred().ok()?;
    let pid = cred.pid()?;
    Some(CallerContext::for_peer(PeerIdentity {
        pid,
        uid: cred.uid(),
        gid: cred.gid(),
    }))
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
