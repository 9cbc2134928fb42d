// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fk_core::audit::{AuditCategory, AuditEntry, GENESIS_HASH, HASH_V2};
use fk_core::Decision;
use serde_json::json;
use tempfile::tempdir;

fn make_entry(id: i64, prev_hash: &str) -> AuditEntry {
    let mut e = AuditEntry {
        id,
        timestamp: "2026-02-03T04:05:06.000000Z".to_string(),
        category: AuditCategory::Tool,
        action: "ipc.test.ping".to_string(),
        actor: "peer-1".to_string(),
        detail: json!({"seq": id}),
        decision: if id % 2 == 0 { Some(Decision::Deny) } else { None },
        hash_v: HASH_V2,
        prev_hash: prev_hash.to_string(),
        hash: String::new(),
    };
    e.hash = e.compute_hash();
    e
}

fn make_chain(len: i64) -> Vec<AuditEntry> {
    let mut prev = GENESIS_HASH.to_string();
    (1..=len)
        .map(|id| {
            let e = make_entry(id, &prev);
            prev = e.hash.clone();
            e
        })
        .collect()
}

#[test]
fn open_creates_the_database_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let store = AuditStore::open(&path).unwrap();
    assert!(path.exists());
    assert!(store.last().unwrap().is_none());
}

#[test]
fn append_batch_round_trips_entries() {
    let dir = tempdir().unwrap();
    let mut store = AuditStore::open(&dir.path().join("audit.db")).unwrap();

    let entries = make_chain(3);
    store.append_batch(&entries).unwrap();

    let tail = store.tail(None).unwrap();
    assert_eq!(tail, entries);
    assert_eq!(store.last().unwrap().unwrap().id, 3);
}

#[test]
fn tail_returns_last_n_ascending() {
    let dir = tempdir().unwrap();
    let mut store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
    store.append_batch(&make_chain(5)).unwrap();

    let tail = store.tail(Some(2)).unwrap();
    assert_eq!(tail.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 5]);
}

#[test]
fn empty_batch_is_a_no_op() {
    let dir = tempdir().unwrap();
    let mut store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
    store.append_batch(&[]).unwrap();
    assert!(store.last().unwrap().is_none());
}

#[test]
fn reopen_preserves_the_chain_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let entries = make_chain(4);
    {
        let mut store = AuditStore::open(&path).unwrap();
        store.append_batch(&entries).unwrap();
    }
    let store = AuditStore::open(&path).unwrap();
    assert_eq!(store.last().unwrap().unwrap().hash, entries[3].hash);
}

#[test]
fn null_decision_survives_round_trip() {
    let dir = tempdir().unwrap();
    let mut store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
    store.append_batch(&make_chain(1)).unwrap();
    assert_eq!(store.last().unwrap().unwrap().decision, None);
}

#[test]
fn file_size_grows_with_content() {
    let dir = tempdir().unwrap();
    let mut store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
    store.append_batch(&make_chain(10)).unwrap();
    assert!(store.file_size() > 0);
}
