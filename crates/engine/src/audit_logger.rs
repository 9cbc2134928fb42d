// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffered writer for the hash-chained audit log.
//!
//! Appends are queued in memory and flushed as one batch: when the buffer
//! reaches its threshold, on a fixed interval, on close, or explicitly. Each
//! flush continues the chain from the persisted tail and writes v2 hashes;
//! a busy store triggers exactly one retry after re-reading the tail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use fk_core::audit::{verify_chain, AuditCategory, AuditEntry, ChainVerdict, GENESIS_HASH, HASH_V2};
use fk_core::Decision;
use fk_storage::{AuditStore, StorageError};

/// Sink the state machine (and anything else that must not depend on the
/// logger type) writes audit events through.
pub trait AuditSink: Send + Sync {
    /// Best-effort append; implementations log failures instead of raising.
    fn record(
        &self,
        category: AuditCategory,
        action: &str,
        actor: &str,
        detail: Value,
        decision: Option<Decision>,
    );
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("audit logger is closed")]
    Closed,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct AuditLoggerConfig {
    /// Pending entries that force a flush.
    pub flush_threshold: usize,
    /// Interval for the background flusher.
    pub flush_interval: Duration,
    /// Database size that triggers the one-shot warning.
    pub size_warn_bytes: u64,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 64,
            flush_interval: Duration::from_millis(500),
            size_warn_bytes: 100 * 1024 * 1024,
        }
    }
}

/// An entry waiting to be chained and persisted.
struct Pending {
    timestamp: String,
    category: AuditCategory,
    action: String,
    actor: String,
    detail: Value,
    decision: Option<Decision>,
}

struct LoggerInner {
    store: Mutex<AuditStore>,
    pending: Mutex<Vec<Pending>>,
    /// Prevents re-entrant flushes; late callers piggyback on the one in
    /// flight.
    flushing: Mutex<()>,
    last_timestamp: Mutex<String>,
    closed: AtomicBool,
    size_warned: AtomicBool,
    config: AuditLoggerConfig,
}

#[derive(Clone)]
pub struct AuditLogger {
    inner: Arc<LoggerInner>,
}

impl AuditLogger {
    pub fn new(store: AuditStore, config: AuditLoggerConfig) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                store: Mutex::new(store),
                pending: Mutex::new(Vec::new()),
                flushing: Mutex::new(()),
                last_timestamp: Mutex::new(String::new()),
                closed: AtomicBool::new(false),
                size_warned: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Spawn the interval flusher. The task exits once the logger closes.
    pub fn spawn_flusher(&self) -> JoinHandle<()> {
        let logger = self.clone();
        let interval = logger.inner.config.flush_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if logger.inner.closed.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = logger.flush() {
                    error!(error = %e, "interval audit flush failed");
                }
            }
        })
    }

    /// Queue an entry. Flushes inline when the buffer crosses the threshold.
    pub fn append(
        &self,
        category: AuditCategory,
        action: impl Into<String>,
        actor: impl Into<String>,
        detail: Value,
        decision: Option<Decision>,
    ) -> Result<(), LoggerError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(LoggerError::Closed);
        }

        let entry = Pending {
            timestamp: self.next_timestamp(),
            category,
            action: action.into(),
            actor: actor.into(),
            detail,
            decision,
        };

        let should_flush = {
            let mut pending = self.inner.pending.lock();
            pending.push(entry);
            pending.len() >= self.inner.config.flush_threshold
        };

        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Drain the buffer into the store, continuing the persisted chain.
    pub fn flush(&self) -> Result<(), LoggerError> {
        // A flush already in progress will pick up entries queued meanwhile.
        let Some(_guard) = self.inner.flushing.try_lock() else {
            return Ok(());
        };

        let batch: Vec<Pending> = std::mem::take(&mut *self.inner.pending.lock());
        if batch.is_empty() {
            return Ok(());
        }

        let mut store = self.inner.store.lock();
        let result = match Self::write_batch(&mut store, &batch) {
            Err(StorageError::Busy) => {
                // A concurrent writer advanced the tail; re-read and retry
                // exactly once.
                warn!("audit store busy, retrying flush once");
                Self::write_batch(&mut store, &batch)
            }
            other => other,
        };
        if let Err(e) = result {
            // Put the batch back so a later flush can try again.
            let mut pending = self.inner.pending.lock();
            let tail = std::mem::take(&mut *pending);
            *pending = batch;
            pending.extend(tail);
            return Err(e.into());
        }

        self.warn_if_oversized(&store);
        Ok(())
    }

    fn write_batch(store: &mut AuditStore, batch: &[Pending]) -> Result<(), StorageError> {
        let tail = store.last()?;
        let (mut next_id, mut prev_hash) = match tail {
            Some(entry) => (entry.id + 1, entry.hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let mut entries = Vec::with_capacity(batch.len());
        for pending in batch {
            let mut entry = AuditEntry {
                id: next_id,
                timestamp: pending.timestamp.clone(),
                category: pending.category,
                action: pending.action.clone(),
                actor: pending.actor.clone(),
                detail: pending.detail.clone(),
                decision: pending.decision,
                hash_v: HASH_V2,
                prev_hash,
                hash: String::new(),
            };
            entry.hash = entry.compute_hash();
            prev_hash = entry.hash.clone();
            next_id += 1;
            entries.push(entry);
        }

        store.append_batch(&entries)
    }

    /// Flush remaining entries and refuse any further appends.
    pub fn close(&self) -> Result<(), LoggerError> {
        let result = self.flush();
        self.inner.closed.store(true, Ordering::SeqCst);
        result
    }

    /// Verify the chain over the last `last_n` entries (all when `None`).
    pub fn verify(&self, last_n: Option<u64>) -> Result<ChainVerdict, LoggerError> {
        self.flush()?;
        let entries = self.inner.store.lock().tail(last_n)?;
        Ok(verify_chain(&entries))
    }

    /// ISO 8601 UTC, clamped non-decreasing within this writer.
    fn next_timestamp(&self) -> String {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut last = self.inner.last_timestamp.lock();
        if now.as_str() > last.as_str() {
            *last = now;
        }
        last.clone()
    }

    fn warn_if_oversized(&self, store: &AuditStore) {
        let size = store.file_size();
        if size > self.inner.config.size_warn_bytes
            && !self.inner.size_warned.swap(true, Ordering::SeqCst)
        {
            warn!(
                size_bytes = size,
                limit_bytes = self.inner.config.size_warn_bytes,
                path = %store.path().display(),
                "audit log exceeds the size threshold"
            );
        }
    }
}

impl AuditSink for AuditLogger {
    fn record(
        &self,
        category: AuditCategory,
        action: &str,
        actor: &str,
        detail: Value,
        decision: Option<Decision>,
    ) {
        if let Err(e) = self.append(category, action, actor, detail, decision) {
            error!(error = %e, action, "audit append failed");
        }
    }
}

#[cfg(test)]
#[path = "audit_logger_tests.rs"]
mod tests;
