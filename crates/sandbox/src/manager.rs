// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox lifecycle manager.
//!
//! Tracks per-id lifecycle state over the runtime adapter, arms a
//! max-duration timer that destroys the sandbox when it fires, and performs
//! best-effort cleanup that accumulates partial failures into log warnings
//! without propagating them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fk_core::SandboxId;

use crate::runtime::{ContainerRuntime, ExecOpts, ExecOutput, LogStream, RuntimeError};
use crate::template::SandboxTemplate;
use crate::SandboxError;

/// Reserved runtime-name prefix scanned during orphan reclamation.
pub const NAME_PREFIX: &str = SandboxId::PREFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Creating,
    Running,
    Stopping,
    Cleanup,
    Failed,
    Destroyed,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxState::Creating => "creating",
            SandboxState::Running => "running",
            SandboxState::Stopping => "stopping",
            SandboxState::Cleanup => "cleanup",
            SandboxState::Failed => "failed",
            SandboxState::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SandboxRecord {
    state: SandboxState,
    volume: String,
    timer: Option<JoinHandle<()>>,
}

struct ManagerInner {
    runtime: Arc<dyn ContainerRuntime>,
    templates: HashMap<String, SandboxTemplate>,
    records: Mutex<HashMap<SandboxId, SandboxRecord>>,
}

#[derive(Clone)]
pub struct SandboxManager {
    inner: Arc<ManagerInner>,
}

impl SandboxManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                runtime,
                templates: SandboxTemplate::builtin(),
                records: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a sandbox from a template plus overrides: allocate the output
    /// volume, create the container, arm the duration timer. On any failure
    /// the record goes to `failed`, cleanup runs best-effort, and the
    /// original error surfaces.
    pub async fn create(
        &self,
        template: &str,
        overrides: &serde_json::Value,
    ) -> Result<SandboxId, SandboxError> {
        let tpl = self
            .inner
            .templates
            .get(template)
            .ok_or_else(|| SandboxError::UnknownTemplate(template.to_string()))?;

        let id = SandboxId::fresh();
        let volume = format!("vol-{id}");
        let mut config = tpl.resolve(id.as_str().to_string(), overrides)?;
        config.volume = Some(volume.clone());

        self.inner.records.lock().insert(
            id.clone(),
            SandboxRecord { state: SandboxState::Creating, volume: volume.clone(), timer: None },
        );

        let provision: Result<(), RuntimeError> = async {
            self.inner.runtime.create_volume(&volume).await?;
            self.inner.runtime.create(&config).await?;
            Ok(())
        }
        .await;

        if let Err(e) = provision {
            warn!(sandbox_id = %id, error = %e, "sandbox provisioning failed");
            self.mark_failed(&id);
            self.destroy(&id).await?;
            return Err(e.into());
        }

        {
            let mut records = self.inner.records.lock();
            if let Some(record) = records.get_mut(&id) {
                record.state = SandboxState::Running;
                record.timer = config.max_duration_ms.map(|ms| self.arm_timer(id.clone(), ms));
            }
        }

        info!(sandbox_id = %id, template, "sandbox created");
        Ok(id)
    }

    /// Destroy a sandbox. Idempotent and terminal: repeated or racing calls
    /// (manual vs. timer) are safe, and unknown ids are a no-op.
    pub async fn destroy(&self, id: &SandboxId) -> Result<(), SandboxError> {
        let (volume, ran) = {
            let mut records = self.inner.records.lock();
            let Some(record) = records.get_mut(id) else {
                return Ok(());
            };
            match record.state {
                // Another destroy is already past the point of no return.
                SandboxState::Stopping | SandboxState::Cleanup | SandboxState::Destroyed => {
                    return Ok(())
                }
                SandboxState::Creating => record.state = SandboxState::Failed,
                SandboxState::Running => record.state = SandboxState::Stopping,
                SandboxState::Failed => {}
            }
            if let Some(timer) = record.timer.take() {
                timer.abort();
            }
            (record.volume.clone(), record.state == SandboxState::Stopping)
        };

        if ran {
            if let Err(e) = self.inner.runtime.stop(id.as_str()).await {
                warn!(sandbox_id = %id, error = %e, "sandbox stop failed during destroy");
            }
        }

        self.set_state(id, SandboxState::Cleanup);
        self.cleanup(id.as_str(), &volume).await;

        let mut records = self.inner.records.lock();
        if let Some(record) = records.get_mut(id) {
            record.state = SandboxState::Destroyed;
        }
        records.remove(id);
        info!(sandbox_id = %id, "sandbox destroyed");
        Ok(())
    }

    pub async fn pause(&self, id: &SandboxId) -> Result<(), SandboxError> {
        self.require_state(id, SandboxState::Running, "pause")?;
        Ok(self.inner.runtime.pause(id.as_str()).await?)
    }

    pub async fn resume(&self, id: &SandboxId) -> Result<(), SandboxError> {
        self.require_state(id, SandboxState::Running, "resume")?;
        Ok(self.inner.runtime.resume(id.as_str()).await?)
    }

    pub async fn exec(
        &self,
        id: &SandboxId,
        command: &[String],
        opts: &ExecOpts,
    ) -> Result<ExecOutput, SandboxError> {
        self.require_state(id, SandboxState::Running, "exec")?;
        Ok(self.inner.runtime.run(id.as_str(), command, opts).await?)
    }

    /// Lazy log stream; dropping it early signals the follower process.
    pub async fn logs(
        &self,
        id: &SandboxId,
        follow: bool,
        tail: Option<u64>,
    ) -> Result<LogStream, SandboxError> {
        if self.state(id).is_none() {
            return Err(SandboxError::NotFound(id.clone()));
        }
        Ok(self.inner.runtime.logs(id.as_str(), follow, tail).await?)
    }

    pub fn state(&self, id: &SandboxId) -> Option<SandboxState> {
        self.inner.records.lock().get(id).map(|r| r.state)
    }

    pub fn active_ids(&self) -> Vec<SandboxId> {
        self.inner.records.lock().keys().cloned().collect()
    }

    /// Destroy runtime-visible sandboxes under the reserved prefix that this
    /// manager does not track. Returns the reclaimed names.
    pub async fn reclaim_orphans(&self) -> Result<Vec<String>, SandboxError> {
        let visible = self.inner.runtime.list(NAME_PREFIX).await?;
        let tracked: Vec<String> = {
            let records = self.inner.records.lock();
            records.keys().map(|id| id.as_str().to_string()).collect()
        };

        let mut reclaimed = Vec::new();
        for name in visible {
            if tracked.iter().any(|t| *t == name) {
                continue;
            }
            warn!(sandbox = %name, "reclaiming orphaned sandbox");
            self.cleanup(&name, &format!("vol-{name}")).await;
            reclaimed.push(name);
        }
        Ok(reclaimed)
    }

    /// Destroy every non-destroyed sandbox. Never raises.
    pub async fn shutdown(&self) {
        for id in self.active_ids() {
            if let Err(e) = self.destroy(&id).await {
                warn!(sandbox_id = %id, error = %e, "destroy during shutdown failed");
            }
        }
    }

    /// Best-effort teardown of a container and its volume. Partial failures
    /// are accumulated as warnings only.
    async fn cleanup(&self, name: &str, volume: &str) {
        if let Err(e) = self.inner.runtime.stop(name).await {
            warn!(sandbox = %name, error = %e, "cleanup: stop failed");
        }
        if let Err(e) = self.inner.runtime.remove(name).await {
            warn!(sandbox = %name, error = %e, "cleanup: remove failed");
        }
        if let Err(e) = self.inner.runtime.remove_volume(volume).await {
            warn!(sandbox = %name, error = %e, "cleanup: volume remove failed");
        }
    }

    fn arm_timer(&self, id: SandboxId, max_duration_ms: u64) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(max_duration_ms)).await;
            info!(sandbox_id = %id, "max duration elapsed, destroying sandbox");
            if let Err(e) = manager.destroy(&id).await {
                warn!(sandbox_id = %id, error = %e, "timed destroy failed");
            }
        })
    }

    fn mark_failed(&self, id: &SandboxId) {
        self.set_state(id, SandboxState::Failed);
    }

    fn set_state(&self, id: &SandboxId, state: SandboxState) {
        if let Some(record) = self.inner.records.lock().get_mut(id) {
            record.state = state;
        }
    }

    fn require_state(
        &self,
        id: &SandboxId,
        required: SandboxState,
        op: &'static str,
    ) -> Result<(), SandboxError> {
        let records = self.inner.records.lock();
        let record = records.get(id).ok_or_else(|| SandboxError::NotFound(id.clone()))?;
        if record.state != required {
            return Err(SandboxError::Lifecycle { id: id.clone(), state: record.state, op });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
