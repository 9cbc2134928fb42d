// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered policy evaluation with default-deny aggregation.
//!
//! Order: built-in rules, capability token fast-path, declarative rules,
//! external evaluator. A deny from any layer is terminal. A valid token
//! bypasses the declarative and external layers but never a built-in deny,
//! and is downgraded to require_review when a built-in rule flagged one.

pub mod evaluator;
pub mod rules;

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use fk_core::{Decision, PatternError};

use crate::context::SyscallContext;
use crate::policy::evaluator::Evaluator;
use crate::policy::rules::{builtin_rules, parse_document, RuleSet};
use crate::token::TokenIssuer;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy document parse error: {0}")]
    Parse(String),

    #[error("policy rule {rule}: {reason}")]
    Schema { rule: usize, reason: &'static str },

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Final decision plus the matched rule's human reason, when one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub decision: Decision,
    pub reason: Option<String>,
}

impl PolicyOutcome {
    fn deny(reason: impl Into<String>) -> Self {
        Self { decision: Decision::Deny, reason: Some(reason.into()) }
    }
}

pub struct PolicyEngine {
    builtin: RuleSet,
    declarative: RwLock<Arc<RuleSet>>,
    tokens: Arc<TokenIssuer>,
    evaluator: Option<Arc<dyn Evaluator>>,
}

impl PolicyEngine {
    pub fn new(tokens: Arc<TokenIssuer>, evaluator: Option<Arc<dyn Evaluator>>) -> Self {
        Self {
            builtin: builtin_rules(),
            declarative: RwLock::new(Arc::new(RuleSet::default())),
            tokens,
            evaluator,
        }
    }

    /// Parse a policy document and swap the declarative rule set atomically.
    /// Returns the number of loaded rules.
    pub fn load_document(&self, text: &str) -> Result<usize, PolicyError> {
        let rules = parse_document(text)?;
        let count = rules.len();
        *self.declarative.write() = Arc::new(rules);
        debug!(count, "declarative policy rules loaded");
        Ok(count)
    }

    pub fn declarative_rule_count(&self) -> usize {
        self.declarative.read().len()
    }

    /// Evaluate a syscall context. `now_ms` anchors the token expiry check
    /// to the caller's clock read.
    pub async fn evaluate(&self, ctx: &SyscallContext, now_ms: u64) -> PolicyOutcome {
        let mut has_allow = false;
        let mut has_review = false;
        let mut review_reason: Option<String> = None;

        // Phase 1: built-in rules. Deny is immediately terminal.
        for rule in self.builtin.candidates(&ctx.syscall) {
            if !rule.matches(ctx) {
                continue;
            }
            match rule.action {
                Decision::Deny => {
                    return PolicyOutcome::deny(
                        rule.reason.clone().unwrap_or_else(|| format!("Denied by {}", rule.name)),
                    )
                }
                Decision::RequireReview => {
                    has_review = true;
                    review_reason.get_or_insert_with(|| {
                        rule.reason
                            .clone()
                            .unwrap_or_else(|| "Operation requires human review".to_string())
                    });
                }
                Decision::Allow => has_allow = true,
                Decision::Pass => {}
            }
        }

        // Phase 2: token fast-path. A valid token short-circuits the
        // declarative and external layers.
        if let Some(claim) = &ctx.token {
            match self.tokens.validate_and_consume(claim, ctx, now_ms) {
                Ok(()) => {
                    if has_review {
                        return PolicyOutcome {
                            decision: Decision::RequireReview,
                            reason: review_reason,
                        };
                    }
                    return PolicyOutcome { decision: Decision::Allow, reason: None };
                }
                Err(e) => {
                    debug!(token_id = %claim.token_id, error = %e, "token rejected, falling through");
                }
            }
        }

        // Phase 3: declarative rules.
        let declarative = Arc::clone(&self.declarative.read());
        for rule in declarative.candidates(&ctx.syscall) {
            if !rule.matches(ctx) {
                continue;
            }
            match rule.action {
                Decision::Deny => {
                    return PolicyOutcome::deny(
                        rule.reason.clone().unwrap_or_else(|| format!("Denied by {}", rule.name)),
                    )
                }
                Decision::RequireReview => {
                    has_review = true;
                    review_reason.get_or_insert_with(|| {
                        rule.reason
                            .clone()
                            .unwrap_or_else(|| "Operation requires human review".to_string())
                    });
                }
                Decision::Allow => has_allow = true,
                Decision::Pass => {}
            }
        }

        // Phase 4: external evaluator, fail-closed.
        if let Some(ev) = &self.evaluator {
            match ev.evaluate(ctx).await {
                Ok(Decision::Deny) => return PolicyOutcome::deny("Denied by external evaluator"),
                Ok(Decision::Allow) => has_allow = true,
                Ok(Decision::RequireReview) => {
                    has_review = true;
                    review_reason
                        .get_or_insert_with(|| "Operation requires human review".to_string());
                }
                Ok(Decision::Pass) => {}
                Err(e) => {
                    warn!(error = %e, "external evaluator failed, denying");
                    return PolicyOutcome::deny("External evaluator unavailable");
                }
            }
        }

        if has_review {
            return PolicyOutcome {
                decision: Decision::RequireReview,
                reason: review_reason
                    .or_else(|| Some("Operation requires human review".to_string())),
            };
        }
        if has_allow {
            return PolicyOutcome { decision: Decision::Allow, reason: None };
        }
        PolicyOutcome::deny("No rule allowed this operation")
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
