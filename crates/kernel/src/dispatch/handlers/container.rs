// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox lifecycle methods, thin over the sandbox manager.

use serde_json::{json, Value};

use fk_core::SandboxId;
use fk_sandbox::{ExecOpts, SandboxError};

use crate::dispatch::params;
use crate::dispatch::{DispatchError, KernelCtx};

/// Cap on lines returned by a single `container.logs` request.
const LOG_LINE_CAP: usize = 10_000;

fn sandbox_id(obj: &serde_json::Map<String, Value>) -> Result<SandboxId, DispatchError> {
    Ok(SandboxId::from(params::required_str(obj, "id")?))
}

pub async fn create(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let template = params::optional_str(&obj, "template")?.unwrap_or("default");
    let overrides = obj.get("config").cloned().unwrap_or(Value::Null);
    let id = ctx.sandboxes.create(template, &overrides).await?;
    Ok(json!(id.as_str()))
}

pub async fn destroy(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    ctx.sandboxes.destroy(&sandbox_id(&obj)?).await?;
    Ok(json!({"ok": true}))
}

pub fn state(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let id = sandbox_id(&obj)?;
    let state = ctx
        .sandboxes
        .state(&id)
        .ok_or_else(|| DispatchError::from(SandboxError::NotFound(id.clone())))?;
    Ok(json!({"id": id.as_str(), "state": state.as_str()}))
}

pub async fn pause(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    ctx.sandboxes.pause(&sandbox_id(&obj)?).await?;
    Ok(json!({"ok": true}))
}

pub async fn resume(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    ctx.sandboxes.resume(&sandbox_id(&obj)?).await?;
    Ok(json!({"ok": true}))
}

pub async fn exec(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let id = sandbox_id(&obj)?;
    let command = params::required_str_array(&obj, "command")?;
    let opts_obj = params::optional_object(&obj, "opts")?;
    let opts = ExecOpts {
        timeout_ms: params::optional_u64(&opts_obj, "timeout")?,
        stdin: params::optional_str(&opts_obj, "stdin")?.map(String::from),
    };

    let output = ctx.sandboxes.exec(&id, &command, &opts).await?;
    Ok(json!({
        "stdout": output.stdout,
        "stderr": output.stderr,
        "exit_code": output.exit_code,
    }))
}

pub async fn logs(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let id = sandbox_id(&obj)?;
    let follow = params::optional_bool(&obj, "follow")?.unwrap_or(false);
    let tail = params::optional_u64(&obj, "tail")?;

    // The response is a single frame, so even a follow request is bounded;
    // dropping the stream at the cap signals the follower for termination.
    let stream = ctx.sandboxes.logs(&id, follow, tail).await?;
    let lines = stream
        .collect_lines(LOG_LINE_CAP)
        .await
        .map_err(|e| DispatchError::from(SandboxError::from(e)))?;
    Ok(json!({"lines": lines}))
}
