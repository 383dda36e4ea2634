//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PulseSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `PULSE_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::PulseSettings;

/// Resolve the default settings file (`~/.pulse/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pulse").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PulseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PulseSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

/// Load from `path`, resolving overrides through `lookup` instead of the
/// process environment.
pub fn load_with<F>(path: &Path, lookup: F) -> Result<PulseSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(PulseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PulseSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PULSE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut PulseSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply `PULSE_*` overrides resolved through `lookup`.
///
/// Invalid values are logged and ignored.
pub fn apply_overrides<F>(settings: &mut PulseSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    if let Some(v) = env.string("PULSE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("PULSE_PORT", |s| parse_u16_range(s, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("PULSE_HISTORY_CAPACITY", |s| parse_usize_range(s, 0, 100_000)) {
        settings.realtime.history_capacity = v;
    }
    if let Some(v) = env.parsed("PULSE_SEND_TIMEOUT_MS", |s| parse_u64_range(s, 1, 600_000)) {
        settings.realtime.send_timeout_ms = v;
    }
    if let Some(v) = env.parsed("PULSE_LIVENESS_PERIOD_SECS", |s| parse_u64_range(s, 1, 86_400)) {
        settings.realtime.liveness_period_secs = v;
    }
    if let Some(v) = env.parsed("PULSE_STALE_THRESHOLD_SECS", |s| parse_u64_range(s, 1, 86_400)) {
        settings.realtime.stale_threshold_secs = v;
    }
    if let Some(v) = env.string("PULSE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("PULSE_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"port": 8080, "host": "localhost"}});
        let merged = deep_merge(target, json!({"server": {"port": 9090}}));
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1, "b": 2}), json!({"a": null}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4]}));
        assert_eq!(merged["items"], json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"a": {"nested": true}}), json!({"a": 42}));
        assert_eq!(merged["a"], 42);
    }

    // ── loading ─────────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_with(Path::new("/nonexistent/settings.json"), no_env).unwrap();
        assert_eq!(settings, PulseSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "realtime": {"historyCapacity": 25, "slaWarningPercent": 80}}"#,
        )
        .unwrap();

        let settings = load_with(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.realtime.history_capacity, 25);
        assert!((settings.realtime.sla_warning_percent - 80.0).abs() < f64::EPSILON);
        assert_eq!(settings.realtime.send_timeout_ms, 2000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert_matches!(load_with(&path, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn invalid_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"realtime": {"staleThresholdSecs": 0}}"#).unwrap();
        assert_matches!(load_with(&path, no_env), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn env_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9090}, "logging": {"level": "warn"}}"#).unwrap();

        let env = vars(&[
            ("PULSE_PORT", "7070"),
            ("PULSE_HOST", "127.0.0.1"),
            ("PULSE_STALE_THRESHOLD_SECS", "45"),
            ("PULSE_LOG_JSON", "yes"),
        ]);
        let settings = load_with(&path, env).unwrap();
        assert_eq!(settings.server.port, 7070);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.realtime.stale_threshold_secs, 45);
        assert!(settings.logging.json);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = PulseSettings::default();
        apply_overrides(
            &mut settings,
            vars(&[
                ("PULSE_PORT", "99999"),
                ("PULSE_SEND_TIMEOUT_MS", "0"),
                ("PULSE_LOG_JSON", "maybe"),
                ("PULSE_HOST", ""),
            ]),
        );
        assert_eq!(settings, PulseSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range(" 15 ", 1, 100), Some(15));
        assert_eq!(parse_u64_range("abc", 1, 100), None);
        assert_eq!(parse_usize_range("101", 0, 100), None);
    }
}
