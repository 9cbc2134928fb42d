// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method handlers, grouped by subsystem.

mod authorize;
mod container;
mod policy;
mod session;
mod tokens;

use serde_json::{json, Value};

use fk_core::{CallerContext, ErrorCode};

use crate::dispatch::{DispatchError, KernelCtx};

/// Route a method name to its handler.
pub async fn route(
    ctx: &KernelCtx,
    caller: &CallerContext,
    method: &str,
    params: &Option<Value>,
) -> Result<Value, DispatchError> {
    match method {
        "test.ping" => Ok(json!({"pong": true})),

        "container.create" => container::create(ctx, params).await,
        "container.destroy" => container::destroy(ctx, params).await,
        "container.state" => container::state(ctx, params),
        "container.pause" => container::pause(ctx, params).await,
        "container.resume" => container::resume(ctx, params).await,
        // `container.run` is a legacy alias for exec.
        "container.exec" | "container.run" => container::exec(ctx, params).await,
        "container.logs" => container::logs(ctx, params).await,

        "session.get" => session::get(ctx),
        "session.submit_task" => session::submit_task(ctx),
        "session.complete_planning" => session::complete_planning(ctx),
        "session.register_test_file" => session::register_test_file(ctx, params),
        "session.complete_test_writing" => session::complete_test_writing(ctx),
        "session.report_test_result" => session::report_test_result(ctx, params),
        "session.complete_coding" => session::complete_coding(ctx),
        "session.set_mode" => session::set_mode(ctx, params),
        "session.reset" => session::reset(ctx),

        "policy.load_yaml" => policy::load_yaml(ctx, params),
        "policy.evaluate" => policy::evaluate(ctx, caller, params).await,
        "token.issue" => tokens::issue(ctx, caller, params),
        "token.revoke" => tokens::revoke(ctx, params),

        "tool.authorize" => authorize::authorize(ctx, caller, params).await,

        "audit.verify" => {
            let obj = super::params::object(params)?;
            let last_n = super::params::optional_u64(&obj, "last_n")?;
            match ctx.audit.verify(last_n)? {
                fk_core::ChainVerdict::Valid => Ok(json!({"valid": true})),
                fk_core::ChainVerdict::Broken { at } => {
                    Ok(json!({"valid": false, "broken_at": at}))
                }
            }
        }

        _ => Err(DispatchError::new(
            ErrorCode::MethodNotFound,
            format!("unknown method {method:?}"),
        )),
    }
}
