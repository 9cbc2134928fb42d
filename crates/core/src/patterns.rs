// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compiled glob matchers for workspace paths.
//!
//! The fixed pattern sets (test files, exempt files) are compiled once per
//! process; policy rules and token claims compile their own matcher per glob
//! set at load time.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// A glob set compiled once. An empty pattern list matches nothing.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    set: GlobSet,
    empty: bool,
}

impl PathMatcher {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern.as_ref()).map_err(|source| PatternError::InvalidGlob {
                pattern: pattern.as_ref().to_string(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| PatternError::InvalidGlob {
            pattern: String::new(),
            source,
        })?;
        Ok(Self { set, empty: patterns.is_empty() })
    }

    pub fn matches(&self, path: &str) -> bool {
        !self.empty && self.set.is_match(path)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

/// Paths recognized as test files by the state machine.
pub fn test_file_patterns() -> &'static PathMatcher {
    static MATCHER: OnceLock<PathMatcher> = OnceLock::new();
    MATCHER.get_or_init(|| {
        compile_static(&[
            "**/*.test.*",
            "**/*.spec.*",
            "tests/**",
            "test/**",
            "**/__tests__/**",
            "**/test_*.py",
            "**/*_test.go",
            "**/*_test.rs",
        ])
    })
}

/// Files always writable in the coding phase: configuration, documentation,
/// and ignore files.
pub fn exempt_patterns() -> &'static PathMatcher {
    static MATCHER: OnceLock<PathMatcher> = OnceLock::new();
    MATCHER.get_or_init(|| {
        compile_static(&[
            "**/*.md",
            "**/*.txt",
            "**/*.json",
            "**/*.yaml",
            "**/*.yml",
            "**/*.toml",
            "**/*.ini",
            "**/.gitignore",
            "**/.*ignore",
            "*.md",
            "*.txt",
            "*.json",
            "*.yaml",
            "*.yml",
            "*.toml",
            "*.ini",
            ".gitignore",
            ".*ignore",
        ])
    })
}

fn compile_static(patterns: &[&str]) -> PathMatcher {
    match PathMatcher::compile(patterns) {
        Ok(matcher) => matcher,
        // The static sets are literals; a failure here is a programming error.
        Err(e) => unreachable!("static pattern set failed to compile: {e}"),
    }
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
