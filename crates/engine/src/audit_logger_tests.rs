// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fk_core::audit::HASH_V2;
use serde_json::json;
use tempfile::tempdir;

fn open_logger(dir: &std::path::Path) -> AuditLogger {
    let store = AuditStore::open(&dir.join("audit.db")).unwrap();
    AuditLogger::new(store, AuditLoggerConfig::default())
}

fn reopen_store(dir: &std::path::Path) -> AuditStore {
    AuditStore::open(&dir.join("audit.db")).unwrap()
}

fn append_n(logger: &AuditLogger, n: usize) {
    for i in 0..n {
        logger
            .append(
                AuditCategory::Tool,
                format!("ipc.op{i}"),
                "peer-1",
                json!({"seq": i}),
                Some(Decision::Allow),
            )
            .unwrap();
    }
}

#[test]
fn flush_writes_a_gapless_v2_chain() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    append_n(&logger, 3);
    logger.flush().unwrap();

    let entries = reopen_store(dir.path()).tail(None).unwrap();
    assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(entries.iter().all(|e| e.hash_v == HASH_V2));
    assert_eq!(entries[0].prev_hash, GENESIS_HASH);
    assert_eq!(entries[1].prev_hash, entries[0].hash);
    assert_eq!(verify_chain(&entries), ChainVerdict::Valid);
}

#[test]
fn nothing_is_persisted_before_a_flush() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    append_n(&logger, 2);
    assert!(reopen_store(dir.path()).last().unwrap().is_none());
}

#[test]
fn reaching_the_threshold_flushes_inline() {
    let dir = tempdir().unwrap();
    let store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
    let logger = AuditLogger::new(
        store,
        AuditLoggerConfig { flush_threshold: 4, ..AuditLoggerConfig::default() },
    );
    append_n(&logger, 4);
    assert_eq!(reopen_store(dir.path()).last().unwrap().unwrap().id, 4);
}

#[test]
fn second_flush_continues_the_chain() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    append_n(&logger, 2);
    logger.flush().unwrap();
    append_n(&logger, 2);
    logger.flush().unwrap();

    let entries = reopen_store(dir.path()).tail(None).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[2].prev_hash, entries[1].hash);
    assert_eq!(verify_chain(&entries), ChainVerdict::Valid);
}

#[test]
fn close_flushes_and_refuses_further_appends() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    append_n(&logger, 1);
    logger.close().unwrap();

    assert_eq!(reopen_store(dir.path()).last().unwrap().unwrap().id, 1);
    let err = logger
        .append(AuditCategory::Tool, "ipc.late", "peer-1", json!({}), None)
        .unwrap_err();
    assert!(matches!(err, LoggerError::Closed));
}

#[test]
fn verify_detects_on_disk_tampering() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    append_n(&logger, 3);
    logger.flush().unwrap();
    assert_eq!(logger.verify(None).unwrap(), ChainVerdict::Valid);

    // Mutate entry 2's detail behind the logger's back.
    {
        let conn = rusqlite_open(&dir.path().join("audit.db"));
        conn.execute("UPDATE audit_log SET detail = '{\"seq\":99}' WHERE id = 2", [])
            .unwrap();
    }
    assert_eq!(logger.verify(None).unwrap(), ChainVerdict::Broken { at: 2 });
}

#[test]
fn verify_of_an_empty_log_is_valid() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    assert_eq!(logger.verify(Some(10)).unwrap(), ChainVerdict::Valid);
}

#[test]
fn verify_last_n_checks_only_the_tail_window() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    append_n(&logger, 5);
    logger.flush().unwrap();

    {
        let conn = rusqlite_open(&dir.path().join("audit.db"));
        conn.execute("UPDATE audit_log SET detail = '{\"seq\":99}' WHERE id = 1", [])
            .unwrap();
    }
    // Entry 1 is outside the window of the last two entries.
    assert_eq!(logger.verify(Some(2)).unwrap(), ChainVerdict::Valid);
    assert_eq!(logger.verify(None).unwrap(), ChainVerdict::Broken { at: 1 });
}

#[test]
fn timestamps_never_decrease() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    append_n(&logger, 10);
    logger.flush().unwrap();
    let entries = reopen_store(dir.path()).tail(None).unwrap();
    for pair in entries.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn record_is_best_effort_after_close() {
    let dir = tempdir().unwrap();
    let logger = open_logger(dir.path());
    logger.close().unwrap();
    // Must not panic or propagate.
    logger.record(AuditCategory::Error, "ipc.x", "peer-1", json!({}), Some(Decision::Deny));
}

fn rusqlite_open(path: &std::path::Path) -> rusqlite::Connection {
    rusqlite::Connection::open(path).unwrap()
}
