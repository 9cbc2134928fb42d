// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-row persistence for the session snapshot.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use fk_core::SessionState;

use crate::StorageError;

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|source| StorageError::Open { path: PathBuf::from(path), source })?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_state (
                id       INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot TEXT NOT NULL
            )",
        )?;

        Ok(Self { conn })
    }

    /// Overwrite the snapshot row.
    pub fn save(&mut self, state: &SessionState) -> Result<(), StorageError> {
        let snapshot = serde_json::to_string(state)
            .map_err(|e| StorageError::Corrupt(format!("snapshot serialization failed: {e}")))?;
        self.conn.execute(
            "INSERT INTO session_state (id, snapshot) VALUES (1, ?1)
             ON CONFLICT (id) DO UPDATE SET snapshot = excluded.snapshot",
            params![snapshot],
        )?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<SessionState>, StorageError> {
        let mut stmt =
            self.conn.prepare_cached("SELECT snapshot FROM session_state WHERE id = 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let snapshot: String = row.get(0)?;
                let state = serde_json::from_str(&snapshot)
                    .map_err(|e| StorageError::Corrupt(format!("snapshot is not JSON: {e}")))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "state_store_tests.rs"]
mod tests;
