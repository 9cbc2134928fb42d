// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External policy evaluator: host-run code on a dedicated socket.
//!
//! The evaluator speaks the same frame protocol as the kernel itself. A
//! frozen evaluator must never stall the engine, so every call is bounded by
//! a short deadline (timeout contributes `pass`), and a crashed evaluator is
//! disabled for a cooldown after its terminal deny.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tokio::net::UnixStream;
use tracing::debug;

use fk_core::{Clock, Decision};
use fk_wire::{read_message, write_message, Message};

use crate::context::SyscallContext;

/// Default per-call deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(100);
/// Default disable window after a crash.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluator unreachable: {0}")]
    Unreachable(String),

    #[error("evaluator returned a malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, ctx: &SyscallContext) -> Result<Decision, EvaluatorError>;
}

/// Evaluator client over a unix socket, one request/response per call.
pub struct SocketEvaluator {
    socket_path: PathBuf,
}

impl SocketEvaluator {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }
}

#[async_trait]
impl Evaluator for SocketEvaluator {
    async fn evaluate(&self, ctx: &SyscallContext) -> Result<Decision, EvaluatorError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| EvaluatorError::Unreachable(e.to_string()))?;

        let request = Message::request(
            nanoid::nanoid!(8),
            "policy.evaluate",
            json!({
                "type": &ctx.syscall,
                "args": &ctx.args,
                "caller": &ctx.caller,
            }),
        );
        write_message(&mut stream, &request)
            .await
            .map_err(|e| EvaluatorError::Unreachable(e.to_string()))?;

        let response = read_message(&mut stream)
            .await
            .map_err(|e| EvaluatorError::Unreachable(e.to_string()))?;

        let decision = response
            .result
            .as_ref()
            .and_then(|r| r.get("decision"))
            .and_then(|d| d.as_str())
            .and_then(Decision::parse)
            .ok_or_else(|| EvaluatorError::Malformed(format!("{response:?}")))?;
        Ok(decision)
    }
}

/// Deadline + crash-cooldown wrapper around any evaluator.
///
/// - Timeout: the call contributes `pass` and the inner evaluator stays live.
/// - Error: surfaced to the engine (which treats it as a terminal deny) and
///   the evaluator is skipped (`pass`) until the cooldown elapses.
pub struct GuardedEvaluator {
    inner: Arc<dyn Evaluator>,
    clock: Arc<dyn Clock>,
    deadline: Duration,
    cooldown: Duration,
    disabled_until: Mutex<Option<Instant>>,
}

impl GuardedEvaluator {
    pub fn new(inner: Arc<dyn Evaluator>, clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(inner, clock, DEFAULT_DEADLINE, DEFAULT_COOLDOWN)
    }

    pub fn with_limits(
        inner: Arc<dyn Evaluator>,
        clock: Arc<dyn Clock>,
        deadline: Duration,
        cooldown: Duration,
    ) -> Self {
        Self { inner, clock, deadline, cooldown, disabled_until: Mutex::new(None) }
    }

    fn is_disabled(&self) -> bool {
        let mut disabled = self.disabled_until.lock();
        match *disabled {
            Some(until) if self.clock.now() < until => true,
            Some(_) => {
                *disabled = None;
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl Evaluator for GuardedEvaluator {
    async fn evaluate(&self, ctx: &SyscallContext) -> Result<Decision, EvaluatorError> {
        if self.is_disabled() {
            debug!("external evaluator cooling down, contributing pass");
            return Ok(Decision::Pass);
        }

        match tokio::time::timeout(self.deadline, self.inner.evaluate(ctx)).await {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(e)) => {
                *self.disabled_until.lock() = Some(self.clock.now() + self.cooldown);
                Err(e)
            }
            Err(_elapsed) => {
                debug!("external evaluator deadline elapsed, contributing pass");
                Ok(Decision::Pass)
            }
        }
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
