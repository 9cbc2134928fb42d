// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use fk_core::{CallerContext, Decision, FakeClock, PeerIdentity};

use super::*;
use crate::context::SyscallContext;

fn ctx() -> SyscallContext {
    SyscallContext::new(
        "fs.write",
        serde_json::Map::new(),
        CallerContext::for_peer(PeerIdentity { pid: 1, uid: 0, gid: 0 }),
    )
}

/// Inner evaluator scripted per call: sleep forever, fail, or answer.
struct Scripted {
    calls: AtomicUsize,
    script: Vec<ScriptStep>,
}

#[derive(Clone, Copy)]
enum ScriptStep {
    Answer(Decision),
    Fail,
    Hang,
}

#[async_trait]
impl Evaluator for Scripted {
    async fn evaluate(&self, _ctx: &SyscallContext) -> Result<Decision, EvaluatorError> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(i).copied().unwrap_or(ScriptStep::Hang) {
            ScriptStep::Answer(d) => Ok(d),
            ScriptStep::Fail => Err(EvaluatorError::Unreachable("crashed".to_string())),
            ScriptStep::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Decision::Allow)
            }
        }
    }
}

fn guarded(script: Vec<ScriptStep>, clock: &FakeClock) -> (GuardedEvaluator, Arc<Scripted>) {
    let inner = Arc::new(Scripted { calls: AtomicUsize::new(0), script });
    let guard = GuardedEvaluator::with_limits(
        Arc::clone(&inner) as Arc<dyn Evaluator>,
        Arc::new(clock.clone()),
        Duration::from_millis(100),
        Duration::from_secs(30),
    );
    (guard, inner)
}

#[tokio::test(start_paused = true)]
async fn answer_passes_through() {
    let clock = FakeClock::new();
    let (guard, _) = guarded(vec![ScriptStep::Answer(Decision::RequireReview)], &clock);
    assert_eq!(guard.evaluate(&ctx()).await.unwrap(), Decision::RequireReview);
}

#[tokio::test(start_paused = true)]
async fn timeout_contributes_pass_and_keeps_the_evaluator_live() {
    let clock = FakeClock::new();
    let (guard, inner) =
        guarded(vec![ScriptStep::Hang, ScriptStep::Answer(Decision::Allow)], &clock);

    assert_eq!(guard.evaluate(&ctx()).await.unwrap(), Decision::Pass);
    // Not disabled: the next call reaches the inner evaluator.
    assert_eq!(guard.evaluate(&ctx()).await.unwrap(), Decision::Allow);
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn crash_surfaces_the_error_then_cools_down() {
    let clock = FakeClock::new();
    let (guard, inner) =
        guarded(vec![ScriptStep::Fail, ScriptStep::Answer(Decision::Allow)], &clock);

    assert!(guard.evaluate(&ctx()).await.is_err());

    // During cooldown the inner evaluator is skipped entirely.
    assert_eq!(guard.evaluate(&ctx()).await.unwrap(), Decision::Pass);
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

    // After the cooldown it is consulted again.
    clock.advance(Duration::from_secs(31));
    assert_eq!(guard.evaluate(&ctx()).await.unwrap(), Decision::Allow);
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}
