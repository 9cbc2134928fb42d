// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization decision returned by the policy engine and tool gate.

use serde::{Deserialize, Serialize};

/// Outcome of a rule, a layer, or a whole evaluation.
///
/// `Pass` is a contribution only: a layer that passes leaves the decision to
/// the remaining layers. It never appears in a final evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    RequireReview,
    Pass,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::RequireReview => "require_review",
            Decision::Pass => "pass",
        }
    }

    /// Parse a decision keyword. Used for policy documents and evaluator
    /// responses, which travel as plain strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Decision::Allow),
            "deny" => Some(Decision::Deny),
            "require_review" => Some(Decision::RequireReview),
            "pass" => Some(Decision::Pass),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
