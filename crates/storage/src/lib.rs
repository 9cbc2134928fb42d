// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fk-storage: embedded durable stores under `.fluffy/`.
//!
//! Two single-writer SQLite databases with WAL journaling: the append-only
//! audit log (`audit.db`) and the single-row session snapshot (`state.db`).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod audit_store;
mod state_store;

pub use audit_store::AuditStore;
pub use state_store::StateStore;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Another writer held the database; the caller may retry once after
    /// re-reading the tail.
    #[error("database is busy")]
    Busy,

    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StorageError::Busy;
            }
        }
        StorageError::Sqlite(e)
    }
}

impl StorageError {
    pub fn is_busy(&self) -> bool {
        matches!(self, StorageError::Busy)
    }
}
