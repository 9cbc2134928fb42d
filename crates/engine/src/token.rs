// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability tokens: short-lived, single-use, signed grants.
//!
//! A token bypasses declarative and external policy layers but never a
//! built-in deny. The issuer keys every claim with an HMAC-SHA256 over the
//! canonical serialization of its fields; the 256-bit secret is generated at
//! process start and never persisted, so tokens die with the kernel.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use fk_core::{canonical, ErrorCode, PathMatcher, TokenId};

use crate::context::SyscallContext;

type HmacSha256 = Hmac<Sha256>;

/// Default time-to-live for a minted token.
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Signed claim handed to the client. Opaque apart from its field contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaim {
    pub token_id: TokenId,
    pub container_id: String,
    pub peer_pid: i32,
    pub syscall: String,
    /// When present, the operation's `path` must match one of these globs.
    /// An explicitly empty list matches nothing, making the token inert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_glob: Option<Vec<String>>,
    pub max_ops: u32,
    pub expires_at_ms: u64,
    pub nonce: u64,
    pub signature: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token invalid: {0}")]
    Invalid(String),

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("token exhausted")]
    Exhausted,
}

impl TokenError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TokenError::Invalid(_) => ErrorCode::TokenInvalid,
            TokenError::Expired => ErrorCode::TokenExpired,
            TokenError::Revoked => ErrorCode::TokenRevoked,
            TokenError::Exhausted => ErrorCode::TokenExhausted,
        }
    }
}

/// What to mint. Defaults: one op, 30 s ttl, no path restriction.
#[derive(Debug, Clone)]
pub struct MintSpec {
    pub syscall: String,
    pub container_id: String,
    pub peer_pid: i32,
    pub path_glob: Option<Vec<String>>,
    pub max_ops: Option<u32>,
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    ops_consumed: u32,
    revoked: bool,
}

#[derive(Default)]
struct IssuerState {
    next_nonce: u64,
    books: HashMap<String, Bookkeeping>,
}

/// Mints, validates and revokes capability tokens.
pub struct TokenIssuer {
    secret: [u8; 32],
    state: Mutex<IssuerState>,
}

impl TokenIssuer {
    pub fn new() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret, state: Mutex::new(IssuerState::default()) }
    }

    pub fn mint(&self, spec: MintSpec, now_ms: u64) -> TokenClaim {
        let mut state = self.state.lock();
        state.next_nonce += 1;

        let mut claim = TokenClaim {
            token_id: TokenId::fresh(),
            container_id: spec.container_id,
            peer_pid: spec.peer_pid,
            syscall: spec.syscall,
            path_glob: spec.path_glob,
            max_ops: spec.max_ops.unwrap_or(1).max(1),
            expires_at_ms: now_ms + spec.ttl_ms.unwrap_or(DEFAULT_TTL_MS),
            nonce: state.next_nonce,
            signature: String::new(),
        };
        claim.signature = self.sign(&claim);
        state.books.insert(claim.token_id.as_str().to_string(), Bookkeeping::default());
        claim
    }

    /// Validate every check in order and consume one op only when all pass.
    ///
    /// `now_ms` is supplied by the caller so the expiry check happens against
    /// the same instant the surrounding evaluation uses.
    pub fn validate_and_consume(
        &self,
        claim: &TokenClaim,
        ctx: &SyscallContext,
        now_ms: u64,
    ) -> Result<(), TokenError> {
        self.verify_signature(claim)?;

        if claim.expires_at_ms <= now_ms {
            return Err(TokenError::Expired);
        }

        // Single critical section per token id: bookkeeping checks and the
        // consume increment happen under one lock acquisition.
        let mut state = self.state.lock();
        let book = state
            .books
            .get_mut(claim.token_id.as_str())
            .ok_or_else(|| TokenError::Invalid("unknown token".to_string()))?;
        if book.revoked {
            return Err(TokenError::Revoked);
        }
        if book.ops_consumed >= claim.max_ops {
            return Err(TokenError::Exhausted);
        }

        if claim.container_id != ctx.caller.container_id {
            return Err(TokenError::Invalid("container mismatch".to_string()));
        }
        if claim.peer_pid != ctx.caller.peer.pid {
            return Err(TokenError::Invalid("peer mismatch".to_string()));
        }
        if claim.syscall != ctx.syscall {
            return Err(TokenError::Invalid("syscall mismatch".to_string()));
        }
        if let Some(globs) = &claim.path_glob {
            let matcher = PathMatcher::compile(globs)
                .map_err(|e| TokenError::Invalid(format!("bad path glob: {e}")))?;
            let path = ctx.path().ok_or_else(|| {
                TokenError::Invalid("path-restricted token used without a path".to_string())
            })?;
            if !matcher.matches(path) {
                return Err(TokenError::Invalid("path mismatch".to_string()));
            }
        }

        book.ops_consumed += 1;
        debug!(token_id = %claim.token_id, ops_consumed = book.ops_consumed, "token consumed");
        Ok(())
    }

    /// Mark a token revoked. Idempotent; unknown ids are a no-op.
    pub fn revoke(&self, token_id: &str) {
        if let Some(book) = self.state.lock().books.get_mut(token_id) {
            book.revoked = true;
        }
    }

    fn sign(&self, claim: &TokenClaim) -> String {
        let digest = self.mac_for(claim).finalize().into_bytes();
        fk_core::audit::to_hex(&digest)
    }

    fn verify_signature(&self, claim: &TokenClaim) -> Result<(), TokenError> {
        let sig = decode_hex(&claim.signature)
            .ok_or_else(|| TokenError::Invalid("malformed signature".to_string()))?;
        // verify_slice is a constant-time comparison.
        self.mac_for(claim)
            .verify_slice(&sig)
            .map_err(|_| TokenError::Invalid("bad signature".to_string()))
    }

    /// MAC over the canonical serialization of every claim field but the
    /// signature itself, keys sorted.
    fn mac_for(&self, claim: &TokenClaim) -> HmacSha256 {
        let body = json!({
            "token_id": claim.token_id,
            "container_id": claim.container_id,
            "peer_pid": claim.peer_pid,
            "syscall": claim.syscall,
            "path_glob": claim.path_glob,
            "max_ops": claim.max_ops,
            "expires_at_ms": claim.expires_at_ms,
            "nonce": claim.nonce,
        });
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            // A 32-byte key is always accepted by HMAC.
            Err(_) => unreachable!("HMAC key of fixed size rejected"),
        };
        mac.update(canonical::to_string(&body).as_bytes());
        mac
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
