// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity of the peer behind an IPC connection.

use serde::{Deserialize, Serialize};

/// Credentials read from the socket at accept time. Immutable for the life
/// of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

/// Request context derived when a connection is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerContext {
    pub container_id: String,
    pub plugin_name: String,
    #[serde(default)]
    pub capability_tags: Vec<String>,
    pub peer: PeerIdentity,
}

impl CallerContext {
    /// Context for a local client process identified only by its peer pid.
    pub fn for_peer(peer: PeerIdentity) -> Self {
        Self {
            container_id: format!("peer-{}", peer.pid),
            plugin_name: "cli".to_string(),
            capability_tags: Vec::new(),
            peer,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.capability_tags.iter().any(|t| t == tag)
    }
}
