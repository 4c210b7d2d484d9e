//! The free-form configuration document delivered via `Initialize` (§6.3).
//!
//! `ConfigDocument` wraps a [`serde_json::Value`] tree with typed, dotted-path
//! accessors that fail with the offending key path (§7: "Startup errors are
//! immediate, with a structured reason and the offending key path") and collect
//! unrecognized top-level keys as warnings instead of failing (§6.3: "Unknown keys
//! are ignored by the runtime and surfaced in warnings").

use serde_json::Value;

use crate::error::CoreError;

/// Top-level keys the runtime understands; anything else becomes a warning.
const RECOGNIZED_TOP_LEVEL: &[&str] = &["slots", "behavior"];

#[derive(Clone, Debug, Default)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    pub fn empty() -> Self {
        Self { root: Value::Null }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let root: Value = serde_json::from_str(raw)
            .map_err(|e| CoreError::config("config.parse_error", e.to_string()))?;
        Ok(Self { root })
    }

    /// Top-level keys present in the document that aren't in
    /// [`RECOGNIZED_TOP_LEVEL`] (§6.3).
    pub fn unknown_key_warnings(&self) -> Vec<String> {
        let Some(map) = self.root.as_object() else {
            return Vec::new();
        };
        map.keys()
            .filter(|k| !RECOGNIZED_TOP_LEVEL.contains(&k.as_str()))
            .map(|k| format!("unrecognized top-level config key `{k}`"))
            .collect()
    }

    fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    pub fn require_str(&self, path: &str) -> Result<&str, CoreError> {
        self.get_str(path).ok_or_else(|| {
            CoreError::config(
                "config.missing_key",
                format!("missing required string config key `{path}`"),
            )
        })
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get_path(path).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_path(path).and_then(Value::as_bool)
    }

    pub fn get_object(&self, path: &str) -> Option<&serde_json::Map<String, Value>> {
        self.get_path(path).and_then(Value::as_object)
    }

    /// `slots.<name>.driver` — the driver name configured for a slot (§6.3).
    pub fn slot_driver(&self, slot_name: &str) -> Option<&str> {
        self.get_str(&format!("slots.{slot_name}.driver"))
    }

    /// `slots.<name>.config` — the driver-specific config object, passed through
    /// verbatim (§6.3).
    pub fn slot_config(&self, slot_name: &str) -> ConfigDocument {
        self.get_path(&format!("slots.{slot_name}.config"))
            .cloned()
            .map(ConfigDocument::from_value)
            .unwrap_or_else(ConfigDocument::empty)
    }

    /// `behavior.*` pattern-specific knobs (§6.3).
    pub fn behavior_u64(&self, key: &str, default: u64) -> u64 {
        self.get_u64(&format!("behavior.{key}")).unwrap_or(default)
    }

    pub fn behavior_bool(&self, key: &str, default: bool) -> bool {
        self.get_bool(&format!("behavior.{key}")).unwrap_or(default)
    }

    pub fn behavior_str(&self, key: &str) -> Option<&str> {
        self.get_str(&format!("behavior.{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_driver_and_config_roundtrip() {
        let doc = ConfigDocument::from_json_str(
            r#"{"slots":{"message_sink":{"driver":"memqueue","config":{"topic":"orders"}}}}"#,
        )
        .unwrap();
        assert_eq!(doc.slot_driver("message_sink"), Some("memqueue"));
        assert_eq!(doc.slot_config("message_sink").get_str("topic"), Some("orders"));
    }

    #[test]
    fn unknown_top_level_keys_are_warnings_not_errors() {
        let doc = ConfigDocument::from_json_str(r#"{"slots":{},"mystery":true}"#).unwrap();
        let warnings = doc.unknown_key_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("mystery"));
    }

    #[test]
    fn behavior_defaults_apply_when_absent() {
        let doc = ConfigDocument::empty();
        assert_eq!(doc.behavior_u64("max_retries", 3), 3);
        assert!(!doc.behavior_bool("auto_commit", false));
    }

    #[test]
    fn claim_check_threshold_is_inclusive_by_convention() {
        let doc =
            ConfigDocument::from_json_str(r#"{"behavior":{"claim_check":{"threshold":1048576}}}"#)
                .unwrap();
        assert_eq!(doc.behavior_u64("claim_check.threshold", 0), 1_048_576);
    }
}
