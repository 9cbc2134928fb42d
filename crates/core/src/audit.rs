// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit entry model and the two hash-chain recipes.
//!
//! Entries form an append-only chain: each entry hashes its own fields plus
//! the previous entry's hash. Two recipes exist on disk; new entries are
//! always written with v2, and verification honors whichever version an
//! entry declares.
//!
//! - v1 (legacy): SHA-256 over a pipe-joined concatenation of the fields.
//! - v2: SHA-256 over a canonical JSON object (keys sorted recursively),
//!   robust to pipe characters inside field values.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::canonical;
use crate::decision::Decision;

/// prev_hash of the first entry in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub const HASH_V1: u8 = 1;
pub const HASH_V2: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Policy,
    Tool,
    Ai,
    Lifecycle,
    Error,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Policy => "policy",
            AuditCategory::Tool => "tool",
            AuditCategory::Ai => "ai",
            AuditCategory::Lifecycle => "lifecycle",
            AuditCategory::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "policy" => Some(AuditCategory::Policy),
            "tool" => Some(AuditCategory::Tool),
            "ai" => Some(AuditCategory::Ai),
            "lifecycle" => Some(AuditCategory::Lifecycle),
            "error" => Some(AuditCategory::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Strictly increasing, gapless.
    pub id: i64,
    /// ISO 8601 UTC, monotonic within a writer.
    pub timestamp: String,
    pub category: AuditCategory,
    pub action: String,
    pub actor: String,
    pub detail: Value,
    pub decision: Option<Decision>,
    pub hash_v: u8,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEntry {
    /// Recompute this entry's hash under its declared recipe.
    pub fn compute_hash(&self) -> String {
        match self.hash_v {
            HASH_V2 => self.hash_v2(),
            _ => self.hash_v1(),
        }
    }

    fn hash_v1(&self) -> String {
        let decision = self.decision.map(|d| d.as_str()).unwrap_or("");
        let detail = self.detail.to_string();
        let joined = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.id,
            self.timestamp,
            self.category,
            self.action,
            self.actor,
            detail,
            decision,
            self.prev_hash,
        );
        hex_sha256(joined.as_bytes())
    }

    fn hash_v2(&self) -> String {
        let decision = match self.decision {
            Some(d) => json!(d.as_str()),
            None => Value::Null,
        };
        let body = json!({
            "v": 2,
            "id": self.id,
            "timestamp": self.timestamp,
            "category": self.category.as_str(),
            "action": self.action,
            "actor": self.actor,
            "detail": self.detail,
            "decision": decision,
            "prev_hash": self.prev_hash,
        });
        hex_sha256(canonical::to_string(&body).as_bytes())
    }
}

/// Result of verifying a contiguous ascending run of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVerdict {
    Valid,
    /// First entry whose hash or back-link fails to verify.
    Broken { at: i64 },
}

impl ChainVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainVerdict::Valid)
    }
}

/// Verify hashes and back-links over `entries` (ascending id order).
///
/// The first entry's `prev_hash` is checked against the genesis hash only
/// when it is the true head of the chain (id 1); for a tail window the
/// back-link of the oldest entry cannot be checked and is skipped.
pub fn verify_chain(entries: &[AuditEntry]) -> ChainVerdict {
    let mut prev: Option<&AuditEntry> = None;
    for entry in entries {
        if entry.compute_hash() != entry.hash {
            return ChainVerdict::Broken { at: entry.id };
        }
        match prev {
            Some(p) => {
                if entry.prev_hash != p.hash {
                    return ChainVerdict::Broken { at: entry.id };
                }
            }
            None => {
                if entry.id == 1 && entry.prev_hash != GENESIS_HASH {
                    return ChainVerdict::Broken { at: entry.id };
                }
            }
        }
        prev = Some(entry);
    }
    ChainVerdict::Valid
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = std::fmt::Write::write_fmt(&mut out, format_args!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
