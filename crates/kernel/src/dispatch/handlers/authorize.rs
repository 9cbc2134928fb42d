// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tool.authorize` — the layered gate on the hot path.
//!
//! Strict order: state-machine gate first, low-risk shortcut second, full
//! policy pipeline only for the high-risk tools. The first layer that denies
//! stops the pipeline, and the response names the layer that decided.

use serde_json::{json, Value};

use fk_core::{CallerContext, Decision, ErrorCode, Tool};
use fk_engine::SyscallContext;

use crate::dispatch::params;
use crate::dispatch::{DispatchError, KernelCtx};

pub async fn authorize(
    ctx: &KernelCtx,
    caller: &CallerContext,
    params: &Option<Value>,
) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let tool_name = params::required_str(&obj, "tool")?;
    let tool = Tool::parse(tool_name).ok_or_else(|| {
        DispatchError::new(ErrorCode::ParamValidation, format!("unknown tool {tool_name:?}"))
    })?;
    let target_path = params::optional_str(&obj, "target_path")?.map(String::from);

    // Layer 1: the state gate.
    let verdict = ctx.machine.gate(tool, target_path.as_deref());
    if !verdict.allowed {
        return Ok(json!({
            "allowed": false,
            "layer": "state",
            "decision": "deny",
            "reason": verdict.reason,
        }));
    }

    // Layer 2: low-risk tools stop here.
    if !tool.is_high_risk() {
        return Ok(json!({"allowed": true, "layer": "state", "decision": "allow"}));
    }

    // Layer 3: the policy pipeline.
    let mut args = params::optional_object(&obj, "args")?;
    if let Some(path) = &target_path {
        args.insert("path".to_string(), json!(path));
    }
    let token = super::tokens::claim_from_params(&obj)?;
    let context = SyscallContext::new(tool.syscall(), args, caller.clone()).with_token(token);

    let outcome = ctx.policy.evaluate(&context, ctx.clock.epoch_ms()).await;
    Ok(match outcome.decision {
        Decision::Allow => json!({"allowed": true, "layer": "policy", "decision": "allow"}),
        Decision::RequireReview => json!({
            "allowed": false,
            "layer": "policy",
            "decision": "require_review",
            "reason": "Operation requires human review",
        }),
        Decision::Deny | Decision::Pass => json!({
            "allowed": false,
            "layer": "policy",
            "decision": "deny",
            "reason": outcome.reason,
        }),
    })
}
