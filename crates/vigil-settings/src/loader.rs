//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::VigilSettings;

/// Resolve the path to the settings file (`~/.vigil/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".vigil").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<VigilSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<VigilSettings> {
    let defaults = serde_json::to_value(VigilSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: VigilSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                if source_value.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_value) => deep_merge(target_value, source_value),
                    None => source_value,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        // Arrays and primitives are replaced entirely.
        (_, source) => source,
    }
}

/// Apply `VIGIL_*` environment variable overrides.
fn apply_env_overrides(settings: &mut VigilSettings) {
    if let Ok(url) = std::env::var("VIGIL_SERVER_URL") {
        settings.server.url = url;
    }
    if let Ok(url) = std::env::var("VIGIL_AUTH_URL") {
        settings.server.auth_base_url = url;
    }
    if let Ok(raw) = std::env::var("VIGIL_MAX_RECONNECT_ATTEMPTS") {
        if let Ok(attempts) = raw.parse() {
            settings.connection.max_reconnect_attempts = attempts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, VigilSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"url":"wss://assistant.example/ws"},"connection":{"max_reconnect_attempts":3}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.url, "wss://assistant.example/ws");
        assert_eq!(settings.connection.max_reconnect_attempts, 3);
        // Untouched sections keep defaults.
        assert_eq!(settings.plans.history_limit, 10);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn null_in_source_preserves_target() {
        let merged = deep_merge(
            json!({"a": 1, "b": {"c": 2}}),
            json!({"a": null, "b": {"c": 3}}),
        );
        assert_eq!(merged, json!({"a": 1, "b": {"c": 3}}));
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let merged = deep_merge(json!({"xs": [1, 2, 3]}), json!({"xs": [9]}));
        assert_eq!(merged, json!({"xs": [9]}));
    }
}
