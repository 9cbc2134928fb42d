// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the kernel crate.

use std::path::PathBuf;
use std::time::Duration;

/// Workspace root: `FK_WORKSPACE_DIR`, falling back to the current directory.
pub fn workspace_dir() -> PathBuf {
    match std::env::var("FK_WORKSPACE_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Socket path override. Default: `<workspace>/.fluffy/ipc/kernel.sock`.
pub fn socket_path() -> Option<PathBuf> {
    std::env::var("FK_SOCKET_PATH").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Dedicated socket of the external policy evaluator, when one is deployed.
pub fn evaluator_socket() -> Option<PathBuf> {
    std::env::var("FK_EVALUATOR_SOCKET").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Per-call deadline for the external evaluator (default 100 ms).
pub fn evaluator_timeout() -> Duration {
    std::env::var("FK_EVALUATOR_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(100))
}

/// Interval of the background audit flusher (default 500 ms).
pub fn audit_flush_interval() -> Duration {
    std::env::var("FK_AUDIT_FLUSH_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(500))
}

/// Audit database size that triggers the one-shot warning (default 100 MiB).
pub fn audit_size_warn_bytes() -> u64 {
    std::env::var("FK_AUDIT_SIZE_WARN_BYTES")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(100 * 1024 * 1024)
}

/// Log directory override. Default: `<workspace>/.fluffy/logs`.
pub fn log_dir() -> Option<PathBuf> {
    std::env::var("FK_LOG_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}
