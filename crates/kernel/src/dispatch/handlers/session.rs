// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state-machine methods. Every handler answers with the full
//! session snapshot so clients never need a follow-up `session.get`.

use serde_json::Value;

use fk_core::{ErrorCode, Mode, SessionState};

use crate::dispatch::params;
use crate::dispatch::{DispatchError, KernelCtx};

fn snapshot_value(state: SessionState) -> Result<Value, DispatchError> {
    serde_json::to_value(state)
        .map_err(|e| DispatchError::new(ErrorCode::Internal, format!("snapshot encoding: {e}")))
}

pub fn get(ctx: &KernelCtx) -> Result<Value, DispatchError> {
    snapshot_value(ctx.machine.snapshot())
}

pub fn submit_task(ctx: &KernelCtx) -> Result<Value, DispatchError> {
    snapshot_value(ctx.machine.submit_task()?)
}

pub fn complete_planning(ctx: &KernelCtx) -> Result<Value, DispatchError> {
    snapshot_value(ctx.machine.complete_planning()?)
}

pub fn register_test_file(
    ctx: &KernelCtx,
    params: &Option<Value>,
) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let path = params::required_str(&obj, "path")?;
    snapshot_value(ctx.machine.register_test_file(path)?)
}

pub fn complete_test_writing(ctx: &KernelCtx) -> Result<Value, DispatchError> {
    snapshot_value(ctx.machine.complete_test_writing()?)
}

pub fn report_test_result(
    ctx: &KernelCtx,
    params: &Option<Value>,
) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let passed = params::required_bool(&obj, "passed")?;
    snapshot_value(ctx.machine.report_test_result(passed)?)
}

pub fn complete_coding(ctx: &KernelCtx) -> Result<Value, DispatchError> {
    snapshot_value(ctx.machine.complete_coding()?)
}

pub fn set_mode(ctx: &KernelCtx, params: &Option<Value>) -> Result<Value, DispatchError> {
    let obj = params::object(params)?;
    let mode = params::enumerated(&obj, "mode", &["strict", "explore", "debug"])?;
    let mode = Mode::parse(mode)
        .ok_or_else(|| DispatchError::new(ErrorCode::ParamValidation, "unknown mode"))?;
    snapshot_value(ctx.machine.set_mode(mode)?)
}

pub fn reset(ctx: &KernelCtx) -> Result<Value, DispatchError> {
    snapshot_value(ctx.machine.reset()?)
}
