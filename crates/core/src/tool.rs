// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool identifiers gated by `tool.authorize`.

use serde::{Deserialize, Serialize};

/// A tool the driven agent may ask to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    #[serde(rename = "fs.read")]
    FsRead,
    #[serde(rename = "fs.write")]
    FsWrite,
    #[serde(rename = "fs.list")]
    FsList,
    #[serde(rename = "fs.exists")]
    FsExists,
    #[serde(rename = "search.grep")]
    SearchGrep,
    #[serde(rename = "search.glob")]
    SearchGlob,
    #[serde(rename = "test.run")]
    TestRun,
    #[serde(rename = "shell.exec")]
    ShellExec,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::FsRead,
        Tool::FsWrite,
        Tool::FsList,
        Tool::FsExists,
        Tool::SearchGrep,
        Tool::SearchGlob,
        Tool::TestRun,
        Tool::ShellExec,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::FsRead => "fs.read",
            Tool::FsWrite => "fs.write",
            Tool::FsList => "fs.list",
            Tool::FsExists => "fs.exists",
            Tool::SearchGrep => "search.grep",
            Tool::SearchGlob => "search.glob",
            Tool::TestRun => "test.run",
            Tool::ShellExec => "shell.exec",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Tool::ALL.into_iter().find(|t| t.name() == s)
    }

    /// Syscall name the policy engine evaluates for this tool.
    pub fn syscall(&self) -> &'static str {
        self.name()
    }

    /// High-risk tools go through the full policy pipeline; everything else
    /// short-circuits to allow once the state gate has passed.
    pub fn is_high_risk(&self) -> bool {
        matches!(self, Tool::FsWrite | Tool::ShellExec)
    }

    /// Tools that cannot mutate the workspace.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Tool::FsRead | Tool::FsList | Tool::FsExists | Tool::SearchGrep | Tool::SearchGlob
        )
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;
