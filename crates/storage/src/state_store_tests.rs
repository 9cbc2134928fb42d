// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fk_core::{Mode, Phase};
use tempfile::tempdir;

#[test]
fn load_is_none_before_first_save() {
    let dir = tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).unwrap();
    assert!(store.load().unwrap().is_none());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let mut store = StateStore::open(&dir.path().join("state.db")).unwrap();

    let mut state = SessionState::default();
    state.phase = Phase::Coding;
    state.mode = Mode::Explore;
    state.test_files.push("tests/a.test.ts".to_string());
    state.consecutive_failures = 2;

    store.save(&state).unwrap();
    assert_eq!(store.load().unwrap(), Some(state));
}

#[test]
fn second_save_overwrites_the_single_row() {
    let dir = tempdir().unwrap();
    let mut store = StateStore::open(&dir.path().join("state.db")).unwrap();

    let mut first = SessionState::default();
    first.phase = Phase::Planning;
    store.save(&first).unwrap();

    let mut second = SessionState::default();
    second.phase = Phase::Done;
    store.save(&second).unwrap();

    assert_eq!(store.load().unwrap().map(|s| s.phase), Some(Phase::Done));
}

#[test]
fn snapshot_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");
    let mut state = SessionState::default();
    state.phase = Phase::TestRunning;
    state.previous_phase = Some(Phase::TestWriting);
    {
        let mut store = StateStore::open(&path).unwrap();
        store.save(&state).unwrap();
    }
    let store = StateStore::open(&path).unwrap();
    assert_eq!(store.load().unwrap(), Some(state));
}
