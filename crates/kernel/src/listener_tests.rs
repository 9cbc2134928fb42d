// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket acquisition and connection-handling tests.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

use fk_core::SystemClock;
use fk_engine::{AuditLogger, AuditLoggerConfig, AuditSink, PolicyEngine, StateMachine, TokenIssuer};
use fk_sandbox::{FakeRuntime, SandboxManager};
use fk_storage::{AuditStore, StateStore};
use fk_wire::{read_message, write_message, Message};

use super::*;
use crate::dispatch::KernelCtx;

fn test_ctx(dir: &std::path::Path) -> Arc<KernelCtx> {
    let logger = AuditLogger::new(
        AuditStore::open(&dir.join("audit.db")).unwrap(),
        AuditLoggerConfig::default(),
    );
    let machine = Arc::new(
        StateMachine::new(
            StateStore::open(&dir.join("state.db")).unwrap(),
            Arc::new(logger.clone()) as Arc<dyn AuditSink>,
        )
        .unwrap(),
    );
    let tokens = Arc::new(TokenIssuer::new());
    Arc::new(KernelCtx {
        machine,
        policy: Arc::new(PolicyEngine::new(Arc::clone(&tokens), None)),
        tokens,
        audit: logger,
        sandboxes: SandboxManager::new(Arc::new(FakeRuntime::new())),
        clock: Arc::new(SystemClock),
        workspace_dir: dir.to_path_buf(),
    })
}

#[test]
fn bind_refuses_a_non_socket_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kernel.sock");
    std::fs::write(&path, "not a socket").unwrap();

    match Listener::bind(&path) {
        Err(ListenError::NonSocketPath(p)) => assert_eq!(p, path),
        other => panic!("expected NonSocketPath, got {other:?}"),
    }
}

#[tokio::test]
async fn bind_refuses_a_live_socket() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kernel.sock");
    let _live = tokio::net::UnixListener::bind(&path).unwrap();

    match Listener::bind(&path) {
        Err(ListenError::SocketInUse(p)) => assert_eq!(p, path),
        other => panic!("expected SocketInUse, got {other:?}"),
    }
}

#[tokio::test]
async fn bind_removes_a_stale_socket() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kernel.sock");
    // Bind and drop: the filesystem entry stays but nothing listens.
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let listener = Listener::bind(&path).unwrap();
    assert_eq!(listener.path(), path);
}

#[tokio::test]
async fn bind_clamps_permissions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ipc").join("kernel.sock");
    let _listener = Listener::bind(&path).unwrap();

    let socket_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(socket_mode, 0o600);
    let parent_mode =
        std::fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
    assert_eq!(parent_mode, 0o700);
}

#[tokio::test]
async fn serves_requests_over_the_socket() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ipc").join("kernel.sock");
    let ctx = test_ctx(dir.path());
    let listener = Listener::bind(&path).unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listener.run(ctx, shutdown.clone()));

    let mut stream = UnixStream::connect(&path).await.unwrap();
    write_message(&mut stream, &Message::request("1", "test.ping", json!({}))).await.unwrap();
    let response = read_message(&mut stream).await.unwrap();
    assert_eq!(response.id, "1");
    assert_eq!(response.result, Some(json!({"pong": true})));

    shutdown.cancel();
    server.await.unwrap();
    assert!(!path.exists(), "socket removed at shutdown");
}

#[tokio::test]
async fn responses_preserve_request_order_per_connection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kernel.sock");
    let ctx = test_ctx(dir.path());
    let listener = Listener::bind(&path).unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listener.run(ctx, shutdown.clone()));

    let mut stream = UnixStream::connect(&path).await.unwrap();
    for i in 0..5 {
        write_message(&mut stream, &Message::request(i.to_string(), "test.ping", json!({})))
            .await
            .unwrap();
    }
    for i in 0..5 {
        let response = read_message(&mut stream).await.unwrap();
        assert_eq!(response.id, i.to_string());
    }

    shutdown.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn connections_are_independent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kernel.sock");
    let ctx = test_ctx(dir.path());
    let listener = Listener::bind(&path).unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listener.run(ctx, shutdown.clone()));

    let mut a = UnixStream::connect(&path).await.unwrap();
    let mut b = UnixStream::connect(&path).await.unwrap();

    write_message(&mut b, &Message::request("b1", "session.get", json!({}))).await.unwrap();
    write_message(&mut a, &Message::request("a1", "test.ping", json!({}))).await.unwrap();

    assert_eq!(read_message(&mut a).await.unwrap().id, "a1");
    assert_eq!(read_message(&mut b).await.unwrap().id, "b1");

    shutdown.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_frame_does_not_kill_the_connection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kernel.sock");
    let ctx = test_ctx(dir.path());
    let listener = Listener::bind(&path).unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listener.run(ctx, shutdown.clone()));

    let mut stream = UnixStream::connect(&path).await.unwrap();
    // A well-framed garbage payload, then a valid request.
    let garbage = b"]]junk[[";
    let mut bytes = (garbage.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(garbage);
    tokio::io::AsyncWriteExt::write_all(&mut stream, &bytes).await.unwrap();
    write_message(&mut stream, &Message::request("ok", "test.ping", json!({}))).await.unwrap();

    let response = read_message(&mut stream).await.unwrap();
    assert_eq!(response.id, "ok");

    shutdown.cancel();
    server.await.unwrap();
}
