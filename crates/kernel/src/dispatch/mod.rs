// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: method table, response envelopes, audit emission.
//!
//! Every dispatched request produces exactly one best-effort audit entry:
//! the operation's own decision on success, deny on error.

mod handlers;
mod params;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use fk_core::audit::AuditCategory;
use fk_core::{CallerContext, Clock, Decision, ErrorCode};
use fk_engine::{AuditLogger, AuditSink, PolicyEngine, StateMachine, TokenIssuer};
use fk_sandbox::SandboxManager;
use fk_wire::{ErrorPayload, Message, MessageKind};

/// Everything a handler can reach, wired once by the orchestrator.
pub struct KernelCtx {
    pub machine: Arc<StateMachine>,
    pub policy: Arc<PolicyEngine>,
    pub tokens: Arc<TokenIssuer>,
    pub audit: AuditLogger,
    pub sandboxes: SandboxManager,
    pub clock: Arc<dyn Clock>,
    pub workspace_dir: PathBuf,
}

/// Handler failure carrying a stable code for the wire envelope.
#[derive(Debug)]
pub struct DispatchError {
    pub code: ErrorCode,
    pub message: String,
}

impl DispatchError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code.code().to_string(),
            message: self.message.clone(),
            retryable: self.code.retryable(),
        }
    }
}

impl From<fk_engine::MachineError> for DispatchError {
    fn from(e: fk_engine::MachineError) -> Self {
        Self::new(e.error_code(), e.to_string())
    }
}

impl From<fk_engine::TokenError> for DispatchError {
    fn from(e: fk_engine::TokenError) -> Self {
        Self::new(e.error_code(), e.to_string())
    }
}

impl From<fk_engine::PolicyError> for DispatchError {
    fn from(e: fk_engine::PolicyError) -> Self {
        Self::new(ErrorCode::ParamValidation, e.to_string())
    }
}

impl From<fk_engine::LoggerError> for DispatchError {
    fn from(e: fk_engine::LoggerError) -> Self {
        Self::new(ErrorCode::StorageFailure, e.to_string())
    }
}

impl From<fk_sandbox::SandboxError> for DispatchError {
    fn from(e: fk_sandbox::SandboxError) -> Self {
        Self::new(e.error_code(), e.to_string())
    }
}

impl From<fk_storage::StorageError> for DispatchError {
    fn from(e: fk_storage::StorageError) -> Self {
        Self::new(ErrorCode::StorageFailure, e.to_string())
    }
}

/// Dispatch one inbound message and envelope the outcome.
pub async fn dispatch(ctx: &KernelCtx, caller: &CallerContext, message: Message) -> Message {
    let id = message.id.clone();

    if message.kind != MessageKind::Request {
        let err =
            DispatchError::new(ErrorCode::InvalidRequest, "only request messages are dispatched");
        return Message::error_response(id, err.payload());
    }
    let Some(method) = message.method.clone().filter(|m| !m.is_empty()) else {
        let err = DispatchError::new(ErrorCode::InvalidRequest, "request is missing a method");
        return Message::error_response(id, err.payload());
    };

    debug!(method = %method, peer = caller.peer.pid, "dispatching request");
    let outcome = handlers::route(ctx, caller, &method, &message.params).await;

    match outcome {
        Ok(result) => {
            audit_request(ctx, caller, &method, &message.params, &result, None);
            Message::response(id, result)
        }
        Err(err) => {
            audit_request(ctx, caller, &method, &message.params, &Value::Null, Some(&err));
            Message::error_response(id, err.payload())
        }
    }
}

/// Best-effort audit entry for one dispatched request. Never fails the
/// request.
fn audit_request(
    ctx: &KernelCtx,
    caller: &CallerContext,
    method: &str,
    params: &Option<Value>,
    result: &Value,
    error: Option<&DispatchError>,
) {
    let (category, decision, detail) = match error {
        Some(err) => (
            AuditCategory::Error,
            Decision::Deny,
            json!({
                "params": params,
                "error": err.code.code(),
                "message": err.message,
            }),
        ),
        None => {
            // Operations that themselves produce a decision (tool.authorize,
            // policy.evaluate) audit that decision; everything else is allow.
            let decision = result
                .get("decision")
                .and_then(Value::as_str)
                .and_then(Decision::parse)
                .unwrap_or(Decision::Allow);
            (category_for(method), decision, json!({ "params": params }))
        }
    };

    ctx.audit.record(
        category,
        &format!("ipc.{method}"),
        &caller.container_id,
        detail,
        Some(decision),
    );
}

fn category_for(method: &str) -> AuditCategory {
    if method.starts_with("policy.") || method.starts_with("token.") || method == "tool.authorize"
    {
        AuditCategory::Policy
    } else if method.starts_with("container.") || method.starts_with("session.") {
        AuditCategory::Lifecycle
    } else {
        AuditCategory::Tool
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
