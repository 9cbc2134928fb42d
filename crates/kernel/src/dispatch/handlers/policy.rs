// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy document loading and direct evaluation.

use serde_json::{json, Value};

use fk_core::{CallerContext, ErrorCode};
use fk_engine::SyscallContext;

use crate::dispatch::params;
use crate::dispatch::{DispatchError, KernelCtx};

pub fn load_yaml(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let path = params::required_str(&obj, "path")?;

    // Relative paths resolve against the workspace root.
    let resolved = ctx.workspace_dir.join(path);
    let text = std::fs::read_to_string(&resolved).map_err(|e| {
        DispatchError::new(
            ErrorCode::InvalidRequest,
            format!("cannot read policy document {}: {e}", resolved.display()),
        )
    })?;
    let rules = ctx.policy.load_document(&text)?;
    Ok(json!({"ok": true, "rules": rules}))
}

pub async fn evaluate(
    ctx: &KernelCtx,
    caller: &CallerContext,
    params: &Option<Value>,
) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let syscall = params::required_str(&obj, "type")?;
    let args = params::optional_object(&obj, "args")?;
    let token = super::tokens::claim_from_params(&obj)?;

    let context = SyscallContext::new(syscall, args, caller.clone()).with_token(token);
    let outcome = ctx.policy.evaluate(&context, ctx.clock.epoch_ms()).await;

    let mut result = json!({"decision": outcome.decision.as_str()});
    if let Some(reason) = outcome.reason {
        result["reason"] = json!(reason);
    }
    Ok(result)
}
