// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layer-aggregation tests for the policy engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use fk_core::{CallerContext, Decision, PeerIdentity};

use super::*;
use crate::policy::evaluator::{Evaluator, EvaluatorError};
use crate::token::{MintSpec, TokenIssuer};

const NOW: u64 = 1_700_000_000_000;

const ALLOW_WRITES_DOC: &str = r#"
capabilities:
  - name: allow-writes
    match: {syscall: fs.write}
    action: allow
"#;

fn ctx(syscall: &str, path: Option<&str>) -> SyscallContext {
    let mut args = Map::new();
    if let Some(path) = path {
        args.insert("path".to_string(), Value::String(path.to_string()));
    }
    SyscallContext::new(
        syscall,
        args,
        CallerContext::for_peer(PeerIdentity { pid: 9, uid: 1000, gid: 1000 }),
    )
}

fn engine() -> (PolicyEngine, Arc<TokenIssuer>) {
    let tokens = Arc::new(TokenIssuer::new());
    (PolicyEngine::new(Arc::clone(&tokens), None), tokens)
}

fn engine_with_evaluator(decision: Result<Decision, ()>) -> PolicyEngine {
    struct Fixed(Result<Decision, ()>);
    #[async_trait]
    impl Evaluator for Fixed {
        async fn evaluate(&self, _ctx: &SyscallContext) -> Result<Decision, EvaluatorError> {
            self.0.map_err(|_| EvaluatorError::Unreachable("boom".to_string()))
        }
    }
    PolicyEngine::new(
        Arc::new(TokenIssuer::new()),
        Some(Arc::new(Fixed(decision)) as Arc<dyn Evaluator>),
    )
}

fn mint(tokens: &TokenIssuer, syscall: &str, path_glob: Option<Vec<String>>) -> crate::TokenClaim {
    tokens.mint(
        MintSpec {
            syscall: syscall.to_string(),
            container_id: "peer-9".to_string(),
            peer_pid: 9,
            path_glob,
            max_ops: None,
            ttl_ms: None,
        },
        NOW,
    )
}

#[tokio::test]
async fn default_is_deny() {
    let (engine, _) = engine();
    let outcome = engine.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await;
    assert_eq!(outcome.decision, Decision::Deny);
    assert!(outcome.reason.is_some());
}

#[tokio::test]
async fn builtin_deny_is_terminal_even_with_a_valid_token() {
    let (engine, tokens) = engine();
    let claim = mint(&tokens, "fs.write", None);
    let context = ctx("fs.write", Some(".fluffy/policy.yaml")).with_token(Some(claim));
    let outcome = engine.evaluate(&context, NOW).await;
    assert_eq!(outcome.decision, Decision::Deny);
}

#[tokio::test]
async fn valid_token_yields_allow_and_consumes() {
    let (engine, tokens) = engine();
    let claim = mint(&tokens, "fs.write", Some(vec!["src/safe.ts".to_string()]));

    let context = ctx("fs.write", Some("src/safe.ts")).with_token(Some(claim.clone()));
    let outcome = engine.evaluate(&context, NOW).await;
    assert_eq!(outcome.decision, Decision::Allow);

    // Exhausted now; no declarative allow exists, so the default deny wins.
    let again = ctx("fs.write", Some("src/safe.ts")).with_token(Some(claim));
    let outcome = engine.evaluate(&again, NOW).await;
    assert_eq!(outcome.decision, Decision::Deny);
}

#[tokio::test]
async fn builtin_review_downgrades_a_valid_token() {
    let (engine, tokens) = engine();
    let claim = mint(&tokens, "fs.write", None);
    let context = ctx("fs.write", Some("src/bootstrap/index.ts")).with_token(Some(claim));
    let outcome = engine.evaluate(&context, NOW).await;
    assert_eq!(outcome.decision, Decision::RequireReview);
}

#[tokio::test]
async fn declarative_allow_grants_and_declarative_deny_overrides_it() {
    let (engine, _) = engine();
    engine
        .load_document(
            r#"
capabilities:
  - name: allow-src
    match: {syscall: fs.write, path_glob: ["src/**"]}
    action: allow
  - name: deny-secrets
    match: {syscall: fs.write, path_glob: ["src/secrets/**"]}
    action: deny
"#,
        )
        .unwrap();

    let allowed = engine.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await;
    assert_eq!(allowed.decision, Decision::Allow);

    // Both rules match; deny is terminal regardless of the earlier allow.
    let denied = engine.evaluate(&ctx("fs.write", Some("src/secrets/key.ts")), NOW).await;
    assert_eq!(denied.decision, Decision::Deny);
}

#[tokio::test]
async fn review_beats_allow_in_final_aggregation() {
    let (engine, _) = engine();
    engine
        .load_document(
            r#"
capabilities:
  - name: allow-all-writes
    match: {syscall: fs.write}
    action: allow
  - name: review-writes
    match: {syscall: fs.write}
    action: require_review
"#,
        )
        .unwrap();

    let outcome = engine.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await;
    assert_eq!(outcome.decision, Decision::RequireReview);
}

#[tokio::test]
async fn load_document_replaces_the_previous_set() {
    let (engine, _) = engine();
    engine
        .load_document(ALLOW_WRITES_DOC)
        .unwrap();
    assert_eq!(
        engine.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await.decision,
        Decision::Allow
    );

    engine.load_document("capabilities: []\n").unwrap();
    assert_eq!(
        engine.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await.decision,
        Decision::Deny
    );
}

#[tokio::test]
async fn evaluator_allow_contributes_and_deny_terminates() {
    let allow = engine_with_evaluator(Ok(Decision::Allow));
    assert_eq!(
        allow.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await.decision,
        Decision::Allow
    );

    let deny = engine_with_evaluator(Ok(Decision::Deny));
    deny.load_document(ALLOW_WRITES_DOC).unwrap();
    assert_eq!(
        deny.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await.decision,
        Decision::Deny
    );
}

#[tokio::test]
async fn evaluator_pass_leaves_the_default_deny() {
    let engine = engine_with_evaluator(Ok(Decision::Pass));
    assert_eq!(
        engine.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await.decision,
        Decision::Deny
    );
}

#[tokio::test]
async fn evaluator_failure_is_fail_closed() {
    let engine = engine_with_evaluator(Err(()));
    engine
        .load_document(ALLOW_WRITES_DOC)
        .unwrap();
    let outcome = engine.evaluate(&ctx("fs.write", Some("src/a.ts")), NOW).await;
    assert_eq!(outcome.decision, Decision::Deny);
}
