// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability token issuance and revocation.

use serde_json::{json, Map, Value};

use fk_core::{CallerContext, ErrorCode};
use fk_engine::{MintSpec, TokenClaim};

use crate::dispatch::params;
use crate::dispatch::{DispatchError, KernelCtx};

pub fn issue(
    ctx: &KernelCtx,
    caller: &CallerContext,
    params: &Option<Value>,
) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let syscall = params::required_str(&obj, "syscall")?;
    let container_id = params::optional_str(&obj, "container_id")?
        .unwrap_or(&caller.container_id)
        .to_string();
    let peer_pid = match params::optional_u64(&obj, "peer_pid")? {
        Some(pid) => i32::try_from(pid).map_err(|_| {
            DispatchError::new(ErrorCode::ParamValidation, "peer_pid out of range")
        })?,
        None => caller.peer.pid,
    };
    let max_ops = match params::optional_u64(&obj, "max_ops")? {
        Some(n) => Some(u32::try_from(n).map_err(|_| {
            DispatchError::new(ErrorCode::ParamValidation, "max_ops out of range")
        })?),
        None => None,
    };

    let spec = MintSpec {
        syscall: syscall.to_string(),
        container_id,
        peer_pid,
        path_glob: params::optional_str_array(&obj, "path_glob")?,
        max_ops,
        ttl_ms: params::optional_u64(&obj, "ttl_ms")?,
    };

    let claim = ctx.tokens.mint(spec, ctx.clock.epoch_ms());
    serde_json::to_value(claim)
        .map_err(|e| DispatchError::new(ErrorCode::Internal, format!("claim encoding: {e}")))
}

pub fn revoke(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let token_id = params::required_str(&obj, "token_id")?;
    ctx.tokens.revoke(token_id);
    Ok(json!({"ok": true}))
}

/// Decode an optional `token` param into a claim.
pub fn claim_from_params(obj: &Map<String, Value>) -> Result<Option<TokenClaim>, DispatchError> {
    match obj.get("token") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            DispatchError::new(ErrorCode::ParamValidation, format!("malformed token claim: {e}"))
        }),
    }
}
