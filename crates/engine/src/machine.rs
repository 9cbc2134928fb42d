// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-discipline state machine.
//!
//! Drives the strict test-first loop: plan, write tests, run them, code
//! until they pass. Every successful mutation overwrites the persisted
//! snapshot; a disallowed trigger parks the session in `failed` and records
//! where it came from so strict-mode gating can still recover.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use fk_core::audit::AuditCategory;
use fk_core::{
    exempt_patterns, test_file_patterns, Decision, ErrorCode, Mode, Phase, SessionState, Tool,
};
use fk_storage::{StateStore, StorageError};

use crate::audit_logger::AuditSink;

/// Failure streak that triggers a require_review audit entry.
const FAILURE_REVIEW_THRESHOLD: u32 = 3;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid transition: {trigger} from {from}")]
    InvalidTransition { from: Phase, trigger: &'static str },

    #[error("{0:?} does not match any test-file pattern")]
    NotATestFile(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MachineError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MachineError::InvalidTransition { .. } => ErrorCode::StateTransitionInvalid,
            MachineError::NotATestFile(_) => ErrorCode::ParamValidation,
            MachineError::Storage(_) => ErrorCode::StorageFailure,
        }
    }
}

/// Answer from the tool gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl GateVerdict {
    fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

struct MachineInner {
    state: SessionState,
    store: StateStore,
}

pub struct StateMachine {
    inner: Mutex<MachineInner>,
    sink: Arc<dyn AuditSink>,
}

impl StateMachine {
    /// Hydrate from the persisted snapshot, or start at the initial state.
    pub fn new(store: StateStore, sink: Arc<dyn AuditSink>) -> Result<Self, MachineError> {
        let state = match store.load()? {
            Some(state) => {
                info!(phase = %state.phase, mode = %state.mode, "restored session snapshot");
                state
            }
            None => SessionState::default(),
        };
        Ok(Self { inner: Mutex::new(MachineInner { state, store }), sink })
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    pub fn submit_task(&self) -> Result<SessionState, MachineError> {
        self.transition("submit_task", |state| {
            if state.phase != Phase::Idle {
                return None;
            }
            state.previous_phase = Some(Phase::Idle);
            state.phase = Phase::Planning;
            Some(())
        })
    }

    pub fn complete_planning(&self) -> Result<SessionState, MachineError> {
        self.transition("complete_planning", |state| {
            if state.phase != Phase::Planning {
                return None;
            }
            state.previous_phase = Some(Phase::Planning);
            state.phase = Phase::TestWriting;
            Some(())
        })
    }

    /// Append a test file path. The path must match a test-file pattern;
    /// duplicates are ignored. Registering outside `test_writing` is a
    /// disallowed trigger.
    pub fn register_test_file(&self, path: &str) -> Result<SessionState, MachineError> {
        let mut inner = self.inner.lock();
        if inner.state.phase != Phase::TestWriting {
            return Err(self.fail_locked(&mut inner, "register_test_file"));
        }
        if !test_file_patterns().matches(path) {
            return Err(MachineError::NotATestFile(path.to_string()));
        }
        if !inner.state.test_files.iter().any(|f| f == path) {
            inner.state.test_files.push(path.to_string());
            let snapshot = inner.state.clone();
            inner.store.save(&snapshot)?;
            self.emit(
                "session.register_test_file",
                json!({"path": path, "count": snapshot.test_files.len()}),
            );
        }
        Ok(inner.state.clone())
    }

    pub fn complete_test_writing(&self) -> Result<SessionState, MachineError> {
        self.transition("complete_test_writing", |state| {
            if state.phase != Phase::TestWriting || state.test_files.is_empty() {
                return None;
            }
            state.previous_phase = Some(Phase::TestWriting);
            state.phase = Phase::TestRunning;
            Some(())
        })
    }

    pub fn complete_coding(&self) -> Result<SessionState, MachineError> {
        self.transition("complete_coding", |state| {
            if state.phase != Phase::Coding {
                return None;
            }
            state.previous_phase = Some(Phase::Coding);
            state.phase = Phase::TestRunning;
            Some(())
        })
    }

    /// Route a test outcome. Passing tests return to `test_writing` when the
    /// run validated freshly written tests, or finish the task when it
    /// validated the coding phase. Failures send the session to `coding`.
    pub fn report_test_result(&self, passed: bool) -> Result<SessionState, MachineError> {
        let mut review_due = false;
        let result = self.transition("report_test_result", |state| {
            if state.phase != Phase::TestRunning {
                return None;
            }
            let next = if passed {
                match state.previous_phase {
                    Some(Phase::TestWriting) => Phase::TestWriting,
                    Some(Phase::Coding) => Phase::Done,
                    _ => return None,
                }
            } else {
                Phase::Coding
            };
            state.last_test_passed = Some(passed);
            if passed {
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures += 1;
                review_due = state.consecutive_failures == FAILURE_REVIEW_THRESHOLD;
            }
            state.previous_phase = Some(Phase::TestRunning);
            state.phase = next;
            Some(())
        });

        if review_due {
            if let Ok(state) = &result {
                warn!(
                    failures = state.consecutive_failures,
                    "consecutive test failures reached the review threshold"
                );
                self.sink.record(
                    AuditCategory::Policy,
                    "session.failure_threshold",
                    "kernel",
                    json!({"consecutive_failures": state.consecutive_failures}),
                    Some(Decision::RequireReview),
                );
            }
        }
        result
    }

    pub fn set_mode(&self, mode: Mode) -> Result<SessionState, MachineError> {
        let mut inner = self.inner.lock();
        inner.state.mode = mode;
        let snapshot = inner.state.clone();
        inner.store.save(&snapshot)?;
        self.emit("session.set_mode", json!({"mode": mode.as_str()}));
        Ok(snapshot)
    }

    /// Restore the initial snapshot: counters zeroed, lists cleared.
    pub fn reset(&self) -> Result<SessionState, MachineError> {
        let mut inner = self.inner.lock();
        inner.state = SessionState::default();
        let snapshot = inner.state.clone();
        inner.store.save(&snapshot)?;
        self.emit("session.reset", json!({}));
        Ok(snapshot)
    }

    /// The per-phase tool gate consulted by `tool.authorize`.
    pub fn gate(&self, tool: Tool, target_path: Option<&str>) -> GateVerdict {
        let state = self.snapshot();
        match state.mode {
            Mode::Debug => GateVerdict::allow(),
            Mode::Explore => {
                if tool.is_read_only() {
                    GateVerdict::allow()
                } else {
                    GateVerdict::deny(format!("{tool} is not allowed in explore mode"))
                }
            }
            Mode::Strict => Self::strict_gate(&state, tool, target_path),
        }
    }

    fn strict_gate(state: &SessionState, tool: Tool, target_path: Option<&str>) -> GateVerdict {
        let effective = if state.phase != Phase::Failed {
            state.phase
        } else {
            // Best-effort recovery: gate by where the session was working
            // before it failed.
            match state.previous_phase {
                Some(Phase::Coding) => Phase::Coding,
                Some(Phase::TestWriting) | Some(Phase::TestRunning) => Phase::TestWriting,
                _ => return GateVerdict::deny("session is failed"),
            }
        };

        match effective {
            Phase::Idle | Phase::Done => {
                GateVerdict::deny(format!("no tools allowed in {effective} phase"))
            }
            Phase::Planning => {
                if tool.is_read_only() {
                    GateVerdict::allow()
                } else {
                    GateVerdict::deny("planning phase allows read-only tools")
                }
            }
            Phase::TestWriting => {
                if tool.is_read_only() {
                    return GateVerdict::allow();
                }
                if tool == Tool::FsWrite {
                    return match target_path {
                        Some(path) if test_file_patterns().matches(path) => GateVerdict::allow(),
                        _ => GateVerdict::deny(
                            "test_writing phase only allows writes to test files",
                        ),
                    };
                }
                GateVerdict::deny(format!("{tool} is not allowed in test_writing phase"))
            }
            Phase::TestRunning => {
                if tool == Tool::TestRun {
                    GateVerdict::allow()
                } else {
                    GateVerdict::deny("test_running phase only allows test.run")
                }
            }
            Phase::Coding => {
                if tool.is_read_only() {
                    return GateVerdict::allow();
                }
                if tool == Tool::FsWrite {
                    let is_test = target_path.map(|p| test_file_patterns().matches(p));
                    let is_exempt = target_path.map(|p| exempt_patterns().matches(p));
                    return match (is_test, is_exempt) {
                        (Some(true), Some(false)) => GateVerdict::deny(
                            "coding phase does not allow writes to test files",
                        ),
                        _ => GateVerdict::allow(),
                    };
                }
                GateVerdict::deny(format!("{tool} is not allowed in coding phase"))
            }
            Phase::Failed => GateVerdict::deny("session is failed"),
        }
    }

    /// Run a phase transition: validate-and-mutate under the lock, persist,
    /// emit audit. `mutate` returns `None` when the trigger is disallowed.
    fn transition(
        &self,
        trigger: &'static str,
        mutate: impl FnOnce(&mut SessionState) -> Option<()>,
    ) -> Result<SessionState, MachineError> {
        let mut inner = self.inner.lock();
        let mut candidate = inner.state.clone();
        match mutate(&mut candidate) {
            Some(()) => {
                inner.state = candidate.clone();
                inner.store.save(&candidate)?;
                self.emit(
                    &format!("session.{trigger}"),
                    json!({"phase": candidate.phase.as_str()}),
                );
                Ok(candidate)
            }
            None => Err(self.fail_locked(&mut inner, trigger)),
        }
    }

    /// Park the session in `failed`, persist, and report the bad trigger.
    fn fail_locked(&self, inner: &mut MachineInner, trigger: &'static str) -> MachineError {
        let from = inner.state.phase;
        if from != Phase::Failed {
            inner.state.previous_phase = Some(from);
            inner.state.phase = Phase::Failed;
        }
        if let Err(e) = inner.store.save(&inner.state) {
            warn!(error = %e, "failed to persist failed-session snapshot");
        }
        self.sink.record(
            AuditCategory::Error,
            &format!("session.{trigger}"),
            "kernel",
            json!({"from": from.as_str(), "trigger": trigger}),
            Some(Decision::Deny),
        );
        MachineError::InvalidTransition { from, trigger }
    }

    fn emit(&self, action: &str, detail: serde_json::Value) {
        self.sink.record(AuditCategory::Lifecycle, action, "kernel", detail, None);
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
