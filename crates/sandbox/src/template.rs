// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox templates and override merging.

use std::collections::HashMap;

use serde_json::Value;

use crate::runtime::SandboxConfig;
use crate::SandboxError;

/// A named base configuration. `container.create` picks one by short name
/// and merges request overrides on top.
#[derive(Debug, Clone)]
pub struct SandboxTemplate {
    pub image: String,
    pub command: Vec<String>,
    pub max_duration_ms: Option<u64>,
    pub memory: Option<String>,
    pub cpus: Option<f64>,
    pub network: bool,
}

impl SandboxTemplate {
    /// Built-in template table.
    pub fn builtin() -> HashMap<String, SandboxTemplate> {
        let mut table = HashMap::new();
        table.insert(
            "default".to_string(),
            SandboxTemplate {
                image: "fk-sandbox:latest".to_string(),
                command: Vec::new(),
                max_duration_ms: Some(30 * 60 * 1000),
                memory: Some("2g".to_string()),
                cpus: Some(2.0),
                network: false,
            },
        );
        table.insert(
            "heavy".to_string(),
            SandboxTemplate {
                image: "fk-sandbox:latest".to_string(),
                command: Vec::new(),
                max_duration_ms: Some(60 * 60 * 1000),
                memory: Some("8g".to_string()),
                cpus: Some(4.0),
                network: false,
            },
        );
        table
    }

    /// Build the full configuration for `name`, applying request overrides.
    pub fn resolve(
        &self,
        name: String,
        overrides: &Value,
    ) -> Result<SandboxConfig, SandboxError> {
        let mut config = SandboxConfig {
            name,
            image: self.image.clone(),
            command: self.command.clone(),
            env: Vec::new(),
            volume: None,
            workdir: None,
            max_duration_ms: self.max_duration_ms,
            memory: self.memory.clone(),
            cpus: self.cpus,
            network: self.network,
        };

        if let Some(obj) = overrides.as_object() {
            if let Some(image) = obj.get("image").and_then(Value::as_str) {
                config.image = image.to_string();
            }
            if let Some(command) = obj.get("command").and_then(Value::as_array) {
                config.command = command
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect();
            }
            if let Some(env) = obj.get("env").and_then(Value::as_object) {
                config.env = env
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect();
            }
            if let Some(workdir) = obj.get("workdir").and_then(Value::as_str) {
                config.workdir = Some(workdir.to_string());
            }
            if let Some(ms) = obj.get("max_duration_ms").and_then(Value::as_u64) {
                config.max_duration_ms = Some(ms);
            }
            if let Some(memory) = obj.get("memory").and_then(Value::as_str) {
                config.memory = Some(memory.to_string());
            }
            if let Some(cpus) = obj.get("cpus").and_then(Value::as_f64) {
                config.cpus = Some(cpus);
            }
            if let Some(network) = obj.get("network").and_then(Value::as_bool) {
                config.network = network;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_table_has_default_and_heavy() {
        let table = SandboxTemplate::builtin();
        assert!(table.contains_key("default"));
        assert!(table.contains_key("heavy"));
        assert!(table["heavy"].max_duration_ms > table["default"].max_duration_ms);
    }

    #[test]
    fn overrides_merge_on_top_of_the_template() {
        let table = SandboxTemplate::builtin();
        let config = table["default"]
            .resolve(
                "fk-sbx-x".to_string(),
                &json!({
                    "image": "custom:1",
                    "command": ["sleep", "600"],
                    "env": {"MODE": "ci"},
                    "max_duration_ms": 1000,
                    "network": true,
                }),
            )
            .unwrap();

        assert_eq!(config.image, "custom:1");
        assert_eq!(config.command, vec!["sleep", "600"]);
        assert_eq!(config.env, vec![("MODE".to_string(), "ci".to_string())]);
        assert_eq!(config.max_duration_ms, Some(1000));
        assert!(config.network);
        // Untouched fields keep template values.
        assert_eq!(config.memory.as_deref(), Some("2g"));
    }

    #[test]
    fn empty_overrides_keep_the_template() {
        let table = SandboxTemplate::builtin();
        let config = table["default"].resolve("fk-sbx-y".to_string(), &json!({})).unwrap();
        assert_eq!(config.image, "fk-sandbox:latest");
        assert!(!config.network);
    }
}
