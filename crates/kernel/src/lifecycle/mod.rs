// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel lifecycle: startup wiring, serve loop, graceful shutdown.

mod startup;

pub use startup::start_with_runtime;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fk_core::audit::AuditCategory;
use fk_engine::AuditSink;
use fk_engine::MachineError;
use fk_sandbox::DockerRuntime;
use fk_storage::StorageError;

use crate::dispatch::KernelCtx;
use crate::listener::{ListenError, Listener};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Listen(#[from] ListenError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("state machine failed to start: {0}")]
    Machine(#[from] MachineError),

    #[error("another kernel holds the lock at {0}")]
    LockHeld(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem layout and collaborator endpoints, all rooted under the
/// workspace's `.fluffy/` directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_dir: PathBuf,
    pub fluffy_dir: PathBuf,
    pub socket_path: PathBuf,
    pub audit_db_path: PathBuf,
    pub state_db_path: PathBuf,
    pub policy_path: PathBuf,
    pub lock_path: PathBuf,
    pub evaluator_socket: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::for_workspace(crate::env::workspace_dir());
        if let Some(socket) = crate::env::socket_path() {
            config.socket_path = socket;
        }
        config.evaluator_socket = crate::env::evaluator_socket();
        config
    }

    pub fn for_workspace(workspace_dir: PathBuf) -> Self {
        let fluffy_dir = workspace_dir.join(".fluffy");
        Self {
            socket_path: fluffy_dir.join("ipc").join("kernel.sock"),
            audit_db_path: fluffy_dir.join("audit.db"),
            state_db_path: fluffy_dir.join("state.db"),
            policy_path: fluffy_dir.join("policy.yaml"),
            lock_path: fluffy_dir.join("kernel.lock"),
            workspace_dir,
            fluffy_dir,
            evaluator_socket: None,
        }
    }
}

/// A started kernel: everything wired, socket bound, not yet serving.
pub struct Kernel {
    pub(crate) ctx: Arc<KernelCtx>,
    pub(crate) listener: Listener,
    pub(crate) flusher: JoinHandle<()>,
    pub(crate) shutdown: CancellationToken,
    // Held for the lifetime of the kernel; dropping releases the flock.
    #[allow(dead_code)]
    pub(crate) lock_file: File,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel").field("listener", &self.listener).finish()
    }
}

/// Start with the production Docker runtime.
pub async fn start(config: Config) -> Result<Kernel, LifecycleError> {
    start_with_runtime(config, Arc::new(DockerRuntime::new())).await
}

impl Kernel {
    pub fn ctx(&self) -> Arc<KernelCtx> {
        Arc::clone(&self.ctx)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.listener.path().to_path_buf()
    }

    /// Token that stops the serve loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until the shutdown token fires, then run the shutdown sequence.
    pub async fn run(self) {
        let Kernel { ctx, listener, flusher, shutdown, lock_file } = self;
        listener.run(Arc::clone(&ctx), shutdown).await;

        info!("kernel shutting down");
        ctx.audit.record(
            AuditCategory::Lifecycle,
            "kernel.stop",
            "kernel",
            serde_json::json!({}),
            None,
        );

        // Destroy every live sandbox; never raises.
        ctx.sandboxes.shutdown().await;

        flusher.abort();
        if let Err(e) = ctx.audit.close() {
            warn!(error = %e, "audit logger close failed");
        }
        drop(lock_file);
        info!("kernel stopped");
    }
}
