// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker CLI runtime adapter.
//!
//! Container lifecycle is driven through the `docker` binary. Each call is
//! bounded by a timeout so a wedged daemon cannot stall a handler.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::runtime::{
    ContainerRuntime, ExecOpts, ExecOutput, LogStream, RuntimeError, RuntimeStatus, SandboxConfig,
};

const DOCKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Label attached to every sandbox container and volume.
const SANDBOX_LABEL: &str = "fk.sandbox=1";

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    bin: String,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self { bin: "docker".to_string() }
    }

    pub fn with_binary(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn docker(&self, op: &'static str, args: &[&str]) -> Result<String, RuntimeError> {
        debug!(op, ?args, "docker invocation");
        let mut cmd = Command::new(&self.bin);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = tokio::time::timeout(DOCKER_TIMEOUT, cmd.output())
            .await
            .map_err(|_| RuntimeError::Timeout(op))?
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim().to_string();
            if detail.contains("No such container") || detail.contains("no such container") {
                return Err(RuntimeError::NotFound(detail));
            }
            Err(RuntimeError::CommandFailed { op, detail })
        }
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, config: &SandboxConfig) -> Result<(), RuntimeError> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            config.name.clone(),
            "--label".into(),
            SANDBOX_LABEL.into(),
        ];
        if let Some(volume) = &config.volume {
            args.push("-v".into());
            args.push(format!("{volume}:/output"));
        }
        if let Some(workdir) = &config.workdir {
            args.push("-w".into());
            args.push(workdir.clone());
        }
        if let Some(memory) = &config.memory {
            args.push("--memory".into());
            args.push(memory.clone());
        }
        if let Some(cpus) = config.cpus {
            args.push("--cpus".into());
            args.push(cpus.to_string());
        }
        if !config.network {
            args.push("--network".into());
            args.push("none".into());
        }
        for (key, value) in &config.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push(config.image.clone());
        args.extend(config.command.iter().cloned());

        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker("create", &borrowed).await.map(|_| ())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("start", &["start", name]).await.map(|_| ())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("stop", &["stop", "-t", "5", name]).await.map(|_| ())
    }

    async fn kill(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("kill", &["kill", name]).await.map(|_| ())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("remove", &["rm", "-f", name]).await.map(|_| ())
    }

    async fn inspect(&self, name: &str) -> Result<RuntimeStatus, RuntimeError> {
        let out =
            self.docker("inspect", &["inspect", "-f", "{{.State.Status}}", name]).await?;
        Ok(match out.trim() {
            "running" => RuntimeStatus::Running,
            "paused" => RuntimeStatus::Paused,
            "exited" | "dead" | "created" => RuntimeStatus::Exited,
            _ => RuntimeStatus::Unknown,
        })
    }

    async fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("pause", &["pause", name]).await.map(|_| ())
    }

    async fn resume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("resume", &["unpause", name]).await.map(|_| ())
    }

    async fn run(
        &self,
        name: &str,
        command: &[String],
        opts: &ExecOpts,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut args: Vec<&str> = vec!["exec"];
        if opts.stdin.is_some() {
            args.push("-i");
        }
        args.push(name);
        args.extend(command.iter().map(String::as_str));

        let mut cmd = Command::new(&self.bin);
        cmd.args(&args).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if opts.stdin.is_some() { Stdio::piped() } else { Stdio::null() });

        let mut child = cmd.spawn().map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        if let (Some(input), Some(mut stdin)) = (&opts.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            drop(stdin);
        }

        let timeout = opts.timeout_ms.map(Duration::from_millis).unwrap_or(DOCKER_TIMEOUT);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(RuntimeError::Timeout("exec")),
        };

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn logs(
        &self,
        name: &str,
        follow: bool,
        tail: Option<u64>,
    ) -> Result<LogStream, RuntimeError> {
        let tail_arg;
        let mut args: Vec<&str> = vec!["logs"];
        if follow {
            args.push("-f");
        }
        if let Some(tail) = tail {
            tail_arg = tail.to_string();
            args.push("--tail");
            args.push(&tail_arg);
        }
        args.push(name);

        let child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        LogStream::from_child(child)
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("create_volume", &["volume", "create", "--label", SANDBOX_LABEL, name])
            .await
            .map(|_| ())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker("remove_volume", &["volume", "rm", "-f", name]).await.map(|_| ())
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker("ping", &["version", "--format", "{{.Server.Version}}"]).await.map(|_| ())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RuntimeError> {
        let filter = format!("name={prefix}");
        let out = self
            .docker("list", &["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with(prefix))
            .map(String::from)
            .collect())
    }
}
