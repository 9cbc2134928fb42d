// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The container-runtime adapter interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("{op} failed: {detail}")]
    CommandFailed { op: &'static str, detail: String },

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Full configuration for one sandbox, produced by template merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Runtime-visible name; equals the sandbox id.
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Output volume mounted at `/output`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    /// Wall-clock budget; the manager destroys the sandbox when it elapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub network: bool,
}

/// Observed container state, normalized across runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Running,
    Paused,
    Exited,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Lazy line-delimited log sequence.
///
/// Dropping the stream mid-iteration signals the underlying process for
/// termination, so a caller that stops reading does not leak a follower.
pub struct LogStream {
    inner: LogStreamInner,
}

enum LogStreamInner {
    Process { child: Child, lines: Lines<BufReader<ChildStdout>> },
    Fixed(std::vec::IntoIter<String>),
}

impl LogStream {
    pub(crate) fn from_child(mut child: Child) -> Result<Self, RuntimeError> {
        let stdout = child.stdout.take().ok_or_else(|| RuntimeError::CommandFailed {
            op: "logs",
            detail: "child stdout not captured".to_string(),
        })?;
        let lines = BufReader::new(stdout).lines();
        Ok(Self { inner: LogStreamInner::Process { child, lines } })
    }

    /// Stream over a fixed set of lines (used by fakes).
    pub fn fixed(lines: Vec<String>) -> Self {
        Self { inner: LogStreamInner::Fixed(lines.into_iter()) }
    }

    pub async fn next_line(&mut self) -> Result<Option<String>, RuntimeError> {
        match &mut self.inner {
            LogStreamInner::Process { lines, .. } => Ok(lines.next_line().await?),
            LogStreamInner::Fixed(iter) => Ok(iter.next()),
        }
    }

    /// Collect at most `limit` lines, then stop (terminating any follower).
    pub async fn collect_lines(mut self, limit: usize) -> Result<Vec<String>, RuntimeError> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.next_line().await? {
                Some(line) => out.push(line),
                None => break,
            }
        }
        Ok(out)
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        if let LogStreamInner::Process { child, .. } = &mut self.inner {
            let _ = child.start_kill();
        }
    }
}

/// Narrow interface the sandbox manager drives.
///
/// `list` exists for orphan reclamation: it enumerates runtime-visible
/// container names under a reserved prefix.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create(&self, config: &SandboxConfig) -> Result<(), RuntimeError>;
    async fn start(&self, name: &str) -> Result<(), RuntimeError>;
    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;
    async fn kill(&self, name: &str) -> Result<(), RuntimeError>;
    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;
    async fn inspect(&self, name: &str) -> Result<RuntimeStatus, RuntimeError>;
    async fn pause(&self, name: &str) -> Result<(), RuntimeError>;
    async fn resume(&self, name: &str) -> Result<(), RuntimeError>;
    async fn run(
        &self,
        name: &str,
        command: &[String],
        opts: &ExecOpts,
    ) -> Result<ExecOutput, RuntimeError>;
    async fn logs(
        &self,
        name: &str,
        follow: bool,
        tail: Option<u64>,
    ) -> Result<LogStream, RuntimeError>;
    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError>;
    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;
    async fn ping(&self) -> Result<(), RuntimeError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, RuntimeError>;
}
