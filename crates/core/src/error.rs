// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error codes surfaced in IPC error envelopes.
//!
//! Subsystem errors are converted to one of these codes at the dispatch
//! boundary; the code string is part of the wire contract and never changes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    MethodNotFound,
    ParamValidation,
    UnavailableDependency,
    PolicyDenied,
    ReviewRequired,
    StateTransitionInvalid,
    TokenInvalid,
    TokenExpired,
    TokenRevoked,
    TokenExhausted,
    SandboxLifecycleInvalid,
    ChainBroken,
    PeerIdentityUnavailable,
    SocketInUse,
    NonSocketPath,
    StorageFailure,
    ExternalEvaluatorUnavailable,
    Internal,
}

impl ErrorCode {
    /// Short stable code carried in the wire error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::ParamValidation => "PARAM_VALIDATION",
            ErrorCode::UnavailableDependency => "UNAVAILABLE_DEPENDENCY",
            ErrorCode::PolicyDenied => "POLICY_DENIED",
            ErrorCode::ReviewRequired => "REVIEW_REQUIRED",
            ErrorCode::StateTransitionInvalid => "INVALID_TRANSITION",
            ErrorCode::TokenInvalid => "TOKEN_INVALID",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenRevoked => "TOKEN_REVOKED",
            ErrorCode::TokenExhausted => "TOKEN_EXHAUSTED",
            ErrorCode::SandboxLifecycleInvalid => "SANDBOX_LIFECYCLE_INVALID",
            ErrorCode::ChainBroken => "CHAIN_BROKEN",
            ErrorCode::PeerIdentityUnavailable => "PEER_IDENTITY_UNAVAILABLE",
            ErrorCode::SocketInUse => "SOCKET_IN_USE",
            ErrorCode::NonSocketPath => "NON_SOCKET_PATH",
            ErrorCode::StorageFailure => "STORAGE_FAILURE",
            ErrorCode::ExternalEvaluatorUnavailable => "EVALUATOR_UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL_ERROR",
        }
    }

    /// Only transient storage failures are worth retrying.
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorCode::StorageFailure)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_screaming_snake_case() {
        for code in [
            ErrorCode::InvalidRequest,
            ErrorCode::MethodNotFound,
            ErrorCode::StateTransitionInvalid,
            ErrorCode::TokenExhausted,
            ErrorCode::Internal,
        ] {
            let s = code.code();
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{s}");
        }
    }

    #[test]
    fn only_storage_failure_is_retryable() {
        assert!(ErrorCode::StorageFailure.retryable());
        assert!(!ErrorCode::PolicyDenied.retryable());
        assert!(!ErrorCode::Internal.retryable());
    }
}
