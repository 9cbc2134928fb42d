// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel startup and dependency wiring.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use fs2::FileExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fk_core::audit::AuditCategory;
use fk_core::{Clock, SystemClock};
use fk_engine::{
    AuditLogger, AuditLoggerConfig, AuditSink, Evaluator, GuardedEvaluator, PolicyEngine,
    SocketEvaluator, StateMachine, TokenIssuer,
};
use fk_sandbox::{ContainerRuntime, SandboxManager};
use fk_storage::{AuditStore, StateStore};

use crate::dispatch::KernelCtx;
use crate::listener::Listener;

use super::{Config, Kernel, LifecycleError};

/// Build every subsystem, restore persisted state, and bind the socket.
///
/// Binding happens last so a startup failure never leaves a live socket
/// behind; the exclusive lock file is taken first so two kernels cannot
/// race on the same workspace.
pub async fn start_with_runtime(
    config: Config,
    runtime: Arc<dyn ContainerRuntime>,
) -> Result<Kernel, LifecycleError> {
    std::fs::create_dir_all(&config.fluffy_dir)?;
    std::fs::set_permissions(&config.fluffy_dir, std::fs::Permissions::from_mode(0o700))?;

    // Exclusive lock first. Open without truncating so a losing candidate
    // does not wipe the running kernel's pid.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockHeld(config.lock_path.clone()))?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // Stores and the audit logger.
    let audit_store = AuditStore::open(&config.audit_db_path)?;
    let logger = AuditLogger::new(
        audit_store,
        AuditLoggerConfig {
            flush_interval: crate::env::audit_flush_interval(),
            size_warn_bytes: crate::env::audit_size_warn_bytes(),
            ..AuditLoggerConfig::default()
        },
    );
    let flusher = logger.spawn_flusher();

    // State machine, hydrated from the snapshot when one exists.
    let state_store = StateStore::open(&config.state_db_path)?;
    let machine =
        Arc::new(StateMachine::new(state_store, Arc::new(logger.clone()) as Arc<dyn AuditSink>)?);

    // Decision plane.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = Arc::new(TokenIssuer::new());
    let evaluator: Option<Arc<dyn Evaluator>> = config.evaluator_socket.clone().map(|path| {
        info!(path = %path.display(), "external evaluator configured");
        Arc::new(GuardedEvaluator::with_limits(
            Arc::new(SocketEvaluator::new(path)),
            Arc::clone(&clock),
            crate::env::evaluator_timeout(),
            fk_engine::policy::evaluator::DEFAULT_COOLDOWN,
        )) as Arc<dyn Evaluator>
    });
    let policy = Arc::new(PolicyEngine::new(Arc::clone(&tokens), evaluator));

    // Declarative rules are optional at startup; a broken document is
    // reported but does not prevent the kernel from serving (the default
    // is deny anyway).
    match std::fs::read_to_string(&config.policy_path) {
        Ok(text) => match policy.load_document(&text) {
            Ok(count) => info!(count, "loaded policy document"),
            Err(e) => warn!(error = %e, "policy document failed to load, starting with none"),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "policy document unreadable, starting with none"),
    }

    // Sandboxes: reclaim anything a previous kernel left behind.
    let sandboxes = SandboxManager::new(runtime);
    match sandboxes.reclaim_orphans().await {
        Ok(reclaimed) if !reclaimed.is_empty() => {
            warn!(count = reclaimed.len(), "reclaimed orphaned sandboxes")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "orphan reclamation failed"),
    }

    // Bind last: all validation has passed.
    let listener = Listener::bind(&config.socket_path)?;

    logger.record(
        AuditCategory::Lifecycle,
        "kernel.start",
        "kernel",
        serde_json::json!({"workspace": config.workspace_dir.display().to_string()}),
        None,
    );

    let ctx = Arc::new(KernelCtx {
        machine,
        policy,
        tokens,
        audit: logger,
        sandboxes,
        clock,
        workspace_dir: config.workspace_dir.clone(),
    });

    info!("kernel started");
    Ok(Kernel { ctx, listener, flusher, shutdown: CancellationToken::new(), lock_file })
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
