// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule compilation: built-in constants and the declarative policy document.
//!
//! Policy documents are a single top-level `capabilities` sequence. Unknown
//! fields are ignored; a missing `name`, missing `match` or invalid `action`
//! fails the load. Glob matchers are compiled once per rule at load time.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use fk_core::{Decision, PathMatcher};

use crate::context::SyscallContext;
use crate::policy::PolicyError;

/// A match or except condition with every matcher precompiled.
#[derive(Debug, Clone)]
pub struct CompiledCond {
    /// Syscall names this condition applies to; `None` means any, and the
    /// literal `"*"` inside the list also means any.
    syscalls: Option<Vec<String>>,
    caller_tags: Option<Vec<String>>,
    paths: Option<PathMatcher>,
}

impl CompiledCond {
    pub fn matches(&self, ctx: &SyscallContext) -> bool {
        if let Some(syscalls) = &self.syscalls {
            if !syscalls.iter().any(|s| s == "*" || *s == ctx.syscall) {
                return false;
            }
        }
        if let Some(tags) = &self.caller_tags {
            if !tags.iter().any(|t| ctx.caller.has_tag(t)) {
                return false;
            }
        }
        if let Some(matcher) = &self.paths {
            // Requires a string path; an empty glob set matches nothing.
            match ctx.path() {
                Some(path) if matcher.matches(path) => {}
                _ => return false,
            }
        }
        true
    }

    fn applies_to_any_syscall(&self) -> bool {
        match &self.syscalls {
            None => true,
            Some(list) => list.iter().any(|s| s == "*"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub action: Decision,
    pub cond: CompiledCond,
    pub except: Vec<CompiledCond>,
    pub reason: Option<String>,
}

impl CompiledRule {
    pub fn matches(&self, ctx: &SyscallContext) -> bool {
        self.cond.matches(ctx) && !self.except.iter().any(|e| e.matches(ctx))
    }
}

/// An ordered rule list indexed by syscall name, with a wildcard bucket for
/// rules that name no syscall (or name `"*"`).
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    by_syscall: HashMap<String, Vec<usize>>,
    wildcard: Vec<usize>,
}

impl RuleSet {
    pub fn new(rules: Vec<CompiledRule>) -> Self {
        let mut by_syscall: HashMap<String, Vec<usize>> = HashMap::new();
        let mut wildcard = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            if rule.cond.applies_to_any_syscall() {
                wildcard.push(i);
            } else if let Some(syscalls) = &rule.cond.syscalls {
                for syscall in syscalls {
                    by_syscall.entry(syscall.clone()).or_default().push(i);
                }
            }
        }
        Self { rules, by_syscall, wildcard }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules that could match `syscall`, in document order.
    pub fn candidates(&self, syscall: &str) -> impl Iterator<Item = &CompiledRule> {
        let mut indices: Vec<usize> = self.wildcard.clone();
        if let Some(bucket) = self.by_syscall.get(syscall) {
            indices.extend(bucket.iter().copied());
        }
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(move |i| &self.rules[i])
    }
}

// ── Declarative document parsing ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDoc {
    capabilities: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    name: Option<String>,
    #[serde(rename = "match")]
    cond: Option<RawCond>,
    action: Option<String>,
    except: Option<RawExcept>,
    reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RawCond {
    syscall: Option<OneOrMany>,
    caller_tag: Option<OneOrMany>,
    path_glob: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum RawExcept {
    One(RawCond),
    Many(Vec<RawCond>),
}

impl RawExcept {
    fn into_vec(self) -> Vec<RawCond> {
        match self {
            RawExcept::One(c) => vec![c],
            RawExcept::Many(v) => v,
        }
    }
}

fn compile_cond(raw: RawCond) -> Result<CompiledCond, PolicyError> {
    let paths = match &raw.path_glob {
        Some(globs) => Some(PathMatcher::compile(globs)?),
        None => None,
    };
    Ok(CompiledCond {
        syscalls: raw.syscall.map(OneOrMany::into_vec),
        caller_tags: raw.caller_tag.map(OneOrMany::into_vec),
        paths,
    })
}

/// Parse and compile a policy document.
pub fn parse_document(text: &str) -> Result<RuleSet, PolicyError> {
    let doc: RawDoc =
        serde_yaml::from_str(text).map_err(|e| PolicyError::Parse(e.to_string()))?;

    let mut rules = Vec::with_capacity(doc.capabilities.len());
    for (i, raw) in doc.capabilities.into_iter().enumerate() {
        let name = raw
            .name
            .filter(|n| !n.is_empty())
            .ok_or(PolicyError::Schema { rule: i, reason: "missing name" })?;
        let cond =
            raw.cond.ok_or(PolicyError::Schema { rule: i, reason: "missing match condition" })?;
        let action = raw
            .action
            .as_deref()
            .and_then(Decision::parse)
            .filter(|d| !matches!(d, Decision::Pass))
            .ok_or(PolicyError::Schema { rule: i, reason: "invalid action" })?;

        let except = raw.except.map(RawExcept::into_vec).unwrap_or_default();
        if except.iter().any(|e| *e == cond) {
            warn!(rule = %name, "rule has an except condition identical to its match");
        }

        rules.push(CompiledRule {
            name,
            action,
            cond: compile_cond(cond)?,
            except: except.into_iter().map(compile_cond).collect::<Result<_, _>>()?,
            reason: raw.reason,
        });
    }

    Ok(RuleSet::new(rules))
}

/// Built-in rules protecting the kernel's own files and sensitive subtrees.
/// These are evaluated before everything else; a deny here is terminal.
pub fn builtin_rules() -> RuleSet {
    let protected = CompiledRule {
        name: "protect-kernel-files".to_string(),
        action: Decision::Deny,
        cond: CompiledCond {
            syscalls: Some(vec!["fs.write".to_string()]),
            caller_tags: None,
            paths: compile_static(&[
                ".fluffy/policy.yaml",
                ".fluffy/audit.db",
                ".fluffy/state.db",
                "**/.fluffy/policy.yaml",
                "**/.fluffy/audit.db",
                "**/.fluffy/state.db",
            ]),
        },
        except: Vec::new(),
        reason: Some("Kernel-owned file".to_string()),
    };

    let sensitive = CompiledRule {
        name: "review-sensitive-source".to_string(),
        action: Decision::RequireReview,
        cond: CompiledCond {
            syscalls: Some(vec!["fs.write".to_string()]),
            caller_tags: None,
            paths: compile_static(&[
                "src/bootstrap/**",
                "src/kernel/**",
                "**/src/bootstrap/**",
                "**/src/kernel/**",
            ]),
        },
        except: Vec::new(),
        reason: Some("Sensitive source tree".to_string()),
    };

    RuleSet::new(vec![protected, sensitive])
}

fn compile_static(patterns: &[&str]) -> Option<PathMatcher> {
    match PathMatcher::compile(patterns) {
        Ok(matcher) => Some(matcher),
        // Built-in patterns are literals; failing to compile is a bug.
        Err(e) => unreachable!("built-in pattern set failed to compile: {e}"),
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
