// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use tokio::net::UnixStream;

use fk_sandbox::FakeRuntime;
use fk_wire::{read_message, write_message, Message};

use super::*;
use crate::lifecycle::Config;

async fn started(dir: &std::path::Path) -> (Kernel, FakeRuntime) {
    let runtime = FakeRuntime::new();
    let kernel =
        start_with_runtime(Config::for_workspace(dir.to_path_buf()), Arc::new(runtime.clone()))
            .await
            .unwrap();
    (kernel, runtime)
}

#[tokio::test]
async fn startup_creates_the_fluffy_layout_and_binds_the_socket() {
    let dir = tempdir().unwrap();
    let (kernel, _) = started(dir.path()).await;

    let fluffy = dir.path().join(".fluffy");
    assert!(fluffy.join("audit.db").exists());
    assert!(fluffy.join("state.db").exists());
    assert!(fluffy.join("kernel.lock").exists());
    assert!(kernel.socket_path().exists());

    let pid: u32 =
        std::fs::read_to_string(fluffy.join("kernel.lock")).unwrap().trim().parse().unwrap();
    assert_eq!(pid, std::process::id());
}

#[tokio::test]
async fn second_kernel_on_the_same_workspace_is_refused() {
    let dir = tempdir().unwrap();
    let (_kernel, _) = started(dir.path()).await;

    let runtime = FakeRuntime::new();
    let mut config = Config::for_workspace(dir.path().to_path_buf());
    // Even with a different socket, the lock decides.
    config.socket_path = dir.path().join("other.sock");
    let err = start_with_runtime(config, Arc::new(runtime)).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockHeld(_)));
}

#[tokio::test]
async fn session_snapshot_survives_a_restart() {
    let dir = tempdir().unwrap();
    {
        let (kernel, _) = started(dir.path()).await;
        kernel.ctx().machine.submit_task().unwrap();
        let token = kernel.shutdown_token();
        let run = tokio::spawn(kernel.run());
        token.cancel();
        run.await.unwrap();
    }

    let (kernel, _) = started(dir.path()).await;
    assert_eq!(kernel.ctx().machine.snapshot().phase, fk_core::Phase::Planning);
    let token = kernel.shutdown_token();
    let run = tokio::spawn(kernel.run());
    token.cancel();
    run.await.unwrap();
}

#[tokio::test]
async fn startup_loads_an_existing_policy_document() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".fluffy")).unwrap();
    std::fs::write(
        dir.path().join(".fluffy/policy.yaml"),
        "capabilities:\n  - name: allow-writes\n    match: {syscall: fs.write}\n    action: allow\n",
    )
    .unwrap();

    let (kernel, _) = started(dir.path()).await;
    assert_eq!(kernel.ctx().policy.declarative_rule_count(), 1);
}

#[tokio::test]
async fn broken_policy_document_does_not_prevent_startup() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".fluffy")).unwrap();
    std::fs::write(dir.path().join(".fluffy/policy.yaml"), "capabilities:\n  - action: allow\n")
        .unwrap();

    let (kernel, _) = started(dir.path()).await;
    assert_eq!(kernel.ctx().policy.declarative_rule_count(), 0);
}

#[tokio::test]
async fn startup_reclaims_orphaned_sandboxes() {
    let dir = tempdir().unwrap();
    let runtime = FakeRuntime::new();
    runtime.seed_container("fk-sbx-stale", fk_sandbox::RuntimeStatus::Running);

    let _kernel = start_with_runtime(
        Config::for_workspace(dir.path().to_path_buf()),
        Arc::new(runtime.clone()),
    )
    .await
    .unwrap();
    assert!(runtime.container_names().is_empty());
}

#[tokio::test]
async fn shutdown_destroys_sandboxes_and_finalizes_the_audit_log() {
    let dir = tempdir().unwrap();
    let (kernel, runtime) = started(dir.path()).await;
    let ctx = kernel.ctx();
    let socket = kernel.socket_path();

    let id = ctx.sandboxes.create("default", &json!({})).await.unwrap();
    assert_eq!(runtime.container_names(), vec![id.as_str().to_string()]);

    let token = kernel.shutdown_token();
    let run = tokio::spawn(kernel.run());

    // The kernel serves while running.
    let mut stream = UnixStream::connect(&socket).await.unwrap();
    write_message(&mut stream, &Message::request("1", "test.ping", json!({}))).await.unwrap();
    assert!(read_message(&mut stream).await.unwrap().result.is_some());

    token.cancel();
    run.await.unwrap();

    assert!(runtime.container_names().is_empty(), "sandboxes destroyed at shutdown");
    assert!(!socket.exists(), "socket removed at shutdown");

    // kernel.stop is flushed by close(); the chain stays valid.
    let store = fk_storage::AuditStore::open(&dir.path().join(".fluffy/audit.db")).unwrap();
    let entries = store.tail(None).unwrap();
    assert!(entries.iter().any(|e| e.action == "kernel.stop"));
    assert!(fk_core::audit::verify_chain(&entries).is_valid());
}
