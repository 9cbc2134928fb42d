// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit log storage.
//!
//! Rows are written in batches inside one transaction so a crash never
//! leaves a partial batch, and ids stay gapless. Hashing happens upstream
//! in the logger; this layer persists and reads back entries verbatim.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use fk_core::audit::{AuditCategory, AuditEntry};
use fk_core::Decision;

use crate::StorageError;

pub struct AuditStore {
    conn: Connection,
    path: PathBuf,
}

impl AuditStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|source| StorageError::Open { path: path.to_path_buf(), source })?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                category  TEXT NOT NULL,
                action    TEXT NOT NULL,
                actor     TEXT NOT NULL,
                detail    TEXT NOT NULL,
                decision  TEXT,
                hash_v    INTEGER NOT NULL DEFAULT 1,
                prev_hash TEXT NOT NULL,
                hash      TEXT NOT NULL
            )",
        )?;

        Ok(Self { conn, path: path.to_path_buf() })
    }

    /// Last persisted entry, i.e. the chain tail.
    pub fn last(&self) -> Result<Option<AuditEntry>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, timestamp, category, action, actor, detail, decision, hash_v,
                    prev_hash, hash
             FROM audit_log ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_entry(row)?)),
            None => Ok(None),
        }
    }

    /// Append a pre-hashed batch atomically. Entry ids must continue the
    /// persisted chain; the caller recomputes them from `last()` on retry.
    pub fn append_batch(&mut self, entries: &[AuditEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO audit_log
                   (id, timestamp, category, action, actor, detail, decision, hash_v,
                    prev_hash, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.id,
                    entry.timestamp,
                    entry.category.as_str(),
                    entry.action,
                    entry.actor,
                    entry.detail.to_string(),
                    entry.decision.map(|d| d.as_str()),
                    entry.hash_v,
                    entry.prev_hash,
                    entry.hash,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Last `n` entries in ascending id order; all entries when `n` is None.
    pub fn tail(&self, n: Option<u64>) -> Result<Vec<AuditEntry>, StorageError> {
        let mut entries = match n {
            Some(n) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT id, timestamp, category, action, actor, detail, decision, hash_v,
                            prev_hash, hash
                     FROM audit_log ORDER BY id DESC LIMIT ?1",
                )?;
                let mut rows = stmt.query([n])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_entry(row)?);
                }
                out
            }
            None => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT id, timestamp, category, action, actor, detail, decision, hash_v,
                            prev_hash, hash
                     FROM audit_log ORDER BY id DESC",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_entry(row)?);
                }
                out
            }
        };
        entries.reverse();
        Ok(entries)
    }

    /// Size of the database file on disk, best-effort.
    pub fn file_size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<AuditEntry, StorageError> {
    let category: String = row.get(2)?;
    let category = AuditCategory::parse(&category)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown audit category {category:?}")))?;

    let decision: Option<String> = row.get(6)?;
    let decision = match decision {
        Some(s) => Some(
            Decision::parse(&s)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown decision {s:?}")))?,
        ),
        None => None,
    };

    let detail: String = row.get(5)?;
    let detail = serde_json::from_str(&detail)
        .map_err(|e| StorageError::Corrupt(format!("detail is not JSON: {e}")))?;

    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        category,
        action: row.get(3)?,
        actor: row.get(4)?,
        detail,
        decision,
        hash_v: row.get(7)?,
        prev_hash: row.get(8)?,
        hash: row.get(9)?,
    })
}

#[cfg(test)]
#[path = "audit_store_tests.rs"]
mod tests;
