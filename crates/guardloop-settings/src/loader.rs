//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use guardloop_core::Mode;

use crate::errors::SettingsError;
use crate::types::Settings;

/// Resolve the path to the settings file (`~/.guardloop/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".guardloop").join("settings.json")
}

/// Expand a leading `~` against `$HOME`.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings, SettingsError> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
#[must_use]
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut Settings) {
    // ── Mode ────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GUARDLOOP_MODE") {
        if let Ok(mode) = Mode::try_from(v.as_str()) {
            settings.mode = mode;
        }
    }
    if let Some(v) = read_env_string("GUARDLOOP_DEFAULT_AGENT") {
        settings.default_agent = v;
    }

    // ── Tool paths and deadlines ────────────────────────────────────
    for (tool, var) in [
        ("claude", "GUARDLOOP_CLAUDE_PATH"),
        ("gemini", "GUARDLOOP_GEMINI_PATH"),
        ("codex", "GUARDLOOP_CODEX_PATH"),
    ] {
        if let Some(v) = read_env_string(var) {
            if let Some(tool_settings) = settings.tools.get_mut(tool) {
                tool_settings.cli_path = v;
            }
        }
    }
    if let Some(v) = read_env_u64("GUARDLOOP_TIMEOUT_SECS", 1, 3600) {
        for tool_settings in settings.tools.values_mut() {
            tool_settings.timeout_secs = v;
        }
    }

    // ── Paths ───────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GUARDLOOP_BASE_PATH") {
        settings.guardrails.base_path = v;
    }
    if let Some(v) = read_env_string("GUARDLOOP_AGENTS_PATH") {
        settings.guardrails.agents_path = v;
    }
    if let Some(v) = read_env_string("GUARDLOOP_DB_PATH") {
        settings.database.path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GUARDLOOP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("GUARDLOOP_LOG_FILE") {
        settings.logging.file = v;
    }
    if let Some(v) = read_env_u64("GUARDLOOP_LOG_MAX_SIZE_MB", 1, 10_240) {
        settings.logging.max_size_mb = v;
    }

    // ── Features ────────────────────────────────────────────────────
    if let Some(v) = read_env_bool("GUARDLOOP_BACKGROUND_ANALYSIS") {
        settings.features.background_analysis = v;
    }
    if let Some(v) = read_env_bool("GUARDLOOP_ADAPTIVE_LEARNING") {
        settings.features.v2_adaptive_learning = v;
    }
    if let Some(v) = read_env_bool("GUARDLOOP_AUTO_SAVE_FILES") {
        settings.features.v2_auto_save_files = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
#[must_use]
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
#[must_use]
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_bool(&v))
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_u64_range(&v, min, max))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.version, "2.0");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_settings_from_path(file.path()).is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"mode": "strict", "database": {{"path": "/tmp/g.db"}}}}"#
        )
        .unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.mode, Mode::Strict);
        assert_eq!(settings.database.path, "/tmp/g.db");
        // Untouched siblings keep defaults through the deep merge.
        assert!(settings.database.backup_enabled);
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let target = serde_json::json!({"a": 1, "b": {"c": 2}});
        let source = serde_json::json!({"a": null, "b": {"d": 3}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": 1, "b": {"c": 2, "d": 3}}));
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let target = serde_json::json!({"files": ["a.md", "b.md"]});
        let source = serde_json::json!({"files": ["c.md"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["files"], serde_json::json!(["c.md"]));
    }

    #[test]
    fn parse_bool_accepts_forms() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_enforces_bounds() {
        assert_eq!(parse_u64_range("120", 1, 3600), Some(120));
        assert_eq!(parse_u64_range("0", 1, 3600), None);
        assert_eq!(parse_u64_range("9999", 1, 3600), None);
        assert_eq!(parse_u64_range("abc", 1, 3600), None);
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde("~/x/y.db");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("x/y.db"));
        assert_eq!(expand_tilde("/abs/p"), PathBuf::from("/abs/p"));
    }
}
