// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashSet;

#[test]
fn fresh_ids_carry_their_prefix() {
    assert!(SandboxId::fresh().as_str().starts_with("fk-sbx-"));
    assert!(TokenId::fresh().as_str().starts_with("tok-"));
}

#[test]
fn fresh_ids_are_unique() {
    let ids: HashSet<String> = (0..256).map(|_| TokenId::fresh().0).collect();
    assert_eq!(ids.len(), 256);
}

#[test]
fn compares_against_plain_strings() {
    let id = SandboxId::from("fk-sbx-abc");
    assert_eq!(id, "fk-sbx-abc");
    assert_ne!(id, "fk-sbx-def");
}

#[test]
fn serde_is_transparent() {
    let id = TokenId::from("tok-xyz");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"tok-xyz\"");
    let back: TokenId = serde_json::from_str("\"tok-xyz\"").unwrap();
    assert_eq!(back, id);
}
