// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory runtime for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::runtime::{
    ContainerRuntime, ExecOpts, ExecOutput, LogStream, RuntimeError, RuntimeStatus, SandboxConfig,
};

/// One recorded adapter invocation: operation name plus its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub op: &'static str,
    pub target: String,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<RuntimeCall>,
    containers: HashMap<String, RuntimeStatus>,
    volumes: HashSet<String>,
    fail_ops: HashSet<&'static str>,
    log_lines: Vec<String>,
    exec_output: Option<ExecOutput>,
}

/// Records every call and lets tests script failures per operation.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call to `op` fail.
    pub fn fail_on(&self, op: &'static str) {
        self.state.lock().fail_ops.insert(op);
    }

    pub fn set_log_lines(&self, lines: Vec<String>) {
        self.state.lock().log_lines = lines;
    }

    pub fn set_exec_output(&self, output: ExecOutput) {
        self.state.lock().exec_output = Some(output);
    }

    /// Pre-seed a runtime-visible container (for orphan tests).
    pub fn seed_container(&self, name: &str, status: RuntimeStatus) {
        self.state.lock().containers.insert(name.to_string(), status);
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.state.lock().volumes.iter().cloned().collect()
    }

    fn record(&self, op: &'static str, target: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall { op, target: target.to_string() });
        if state.fail_ops.contains(op) {
            return Err(RuntimeError::CommandFailed {
                op,
                detail: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, config: &SandboxConfig) -> Result<(), RuntimeError> {
        self.record("create", &config.name)?;
        self.state.lock().containers.insert(config.name.clone(), RuntimeStatus::Running);
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("start", name)?;
        self.state.lock().containers.insert(name.to_string(), RuntimeStatus::Running);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("stop", name)?;
        self.state.lock().containers.insert(name.to_string(), RuntimeStatus::Exited);
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("kill", name)?;
        self.state.lock().containers.insert(name.to_string(), RuntimeStatus::Exited);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("remove", name)?;
        self.state.lock().containers.remove(name);
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<RuntimeStatus, RuntimeError> {
        self.record("inspect", name)?;
        self.state
            .lock()
            .containers
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    async fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("pause", name)?;
        self.state.lock().containers.insert(name.to_string(), RuntimeStatus::Paused);
        Ok(())
    }

    async fn resume(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("resume", name)?;
        self.state.lock().containers.insert(name.to_string(), RuntimeStatus::Running);
        Ok(())
    }

    async fn run(
        &self,
        name: &str,
        command: &[String],
        _opts: &ExecOpts,
    ) -> Result<ExecOutput, RuntimeError> {
        self.record("run", name)?;
        Ok(self.state.lock().exec_output.clone().unwrap_or(ExecOutput {
            stdout: command.join(" "),
            stderr: String::new(),
            exit_code: 0,
        }))
    }

    async fn logs(
        &self,
        name: &str,
        _follow: bool,
        tail: Option<u64>,
    ) -> Result<LogStream, RuntimeError> {
        self.record("logs", name)?;
        let mut lines = self.state.lock().log_lines.clone();
        if let Some(tail) = tail {
            let skip = lines.len().saturating_sub(tail as usize);
            lines.drain(..skip);
        }
        Ok(LogStream::fixed(lines))
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("create_volume", name)?;
        self.state.lock().volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("remove_volume", name)?;
        self.state.lock().volumes.remove(name);
        Ok(())
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.record("ping", "")
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RuntimeError> {
        self.record("list", prefix)?;
        Ok(self
            .state
            .lock()
            .containers
            .keys()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect())
    }
}
