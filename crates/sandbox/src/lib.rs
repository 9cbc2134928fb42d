// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fk-sandbox: sandbox lifecycle over a narrow container-runtime adapter.
//!
//! The kernel does not implement isolation itself; it drives an external
//! runtime (Docker by default) through the [`ContainerRuntime`] trait and
//! tracks per-sandbox lifecycle state, duration timers, and cleanup.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod docker;
mod manager;
mod runtime;
mod template;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRuntime, RuntimeCall};

pub use docker::DockerRuntime;
pub use manager::{SandboxManager, SandboxState, NAME_PREFIX};
pub use runtime::{
    ContainerRuntime, ExecOpts, ExecOutput, LogStream, RuntimeError, RuntimeStatus, SandboxConfig,
};
pub use template::SandboxTemplate;

use thiserror::Error;

use fk_core::{ErrorCode, SandboxId};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unknown sandbox {0}")]
    NotFound(SandboxId),

    #[error("unknown template {0:?}")]
    UnknownTemplate(String),

    #[error("sandbox {id} cannot {op} while {state}")]
    Lifecycle { id: SandboxId, state: SandboxState, op: &'static str },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl SandboxError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            SandboxError::NotFound(_) => ErrorCode::InvalidRequest,
            SandboxError::UnknownTemplate(_) => ErrorCode::ParamValidation,
            SandboxError::Lifecycle { .. } => ErrorCode::SandboxLifecycleInvalid,
            SandboxError::Runtime(_) => ErrorCode::UnavailableDependency,
        }
    }
}
