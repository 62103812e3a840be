//! Settings type definitions.
//!
//! All field names are snake_case in JSON. Each type implements [`Default`]
//! with production default values and uses `#[serde(default)]` so partial
//! files are accepted — missing fields get their default value during
//! deserialization. Unknown top-level keys survive a load/save round-trip
//! through the flattened `extra` map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use guardloop_core::{ConfigError, Mode};

/// Root settings type for the GuardLoop daemon.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Settings {
    /// Settings schema version.
    pub version: String,
    /// Enforcement posture applied to every request.
    pub mode: Mode,
    /// Agent to route to when the request does not name one.
    pub default_agent: String,
    /// Wrapped tool configurations keyed by tool name.
    pub tools: BTreeMap<String, ToolSettings>,
    /// Guardrail policy file locations.
    pub guardrails: GuardrailFileSettings,
    /// Embedded database location and backups.
    pub database: DatabaseSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Feature flags.
    pub features: FeatureSettings,
    /// Team synchronisation (external collaborator).
    pub team: TeamSettings,
    /// Unknown keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut tools = BTreeMap::new();
        let _ = tools.insert("claude".to_string(), ToolSettings::new("claude"));
        let _ = tools.insert("gemini".to_string(), ToolSettings::new("gemini"));
        let _ = tools.insert("codex".to_string(), ToolSettings::new("codex"));
        Self {
            version: "2.0".to_string(),
            mode: Mode::Standard,
            default_agent: "auto".to_string(),
            tools,
            guardrails: GuardrailFileSettings::default(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
            features: FeatureSettings::default(),
            team: TeamSettings::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Look up an enabled tool, rejecting unknown or disabled tools.
    pub fn tool(&self, name: &str) -> Result<&ToolSettings, ConfigError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ConfigError::ToolUnknown { tool: name.into() })?;
        if !tool.enabled {
            return Err(ConfigError::ToolDisabled { tool: name.into() });
        }
        Ok(tool)
    }

    /// Names of the tools that are currently enabled.
    #[must_use]
    pub fn enabled_tools(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|(_, t)| t.enabled)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// A single wrapped tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ToolSettings {
    /// Path to the CLI binary (bare name resolved against `$PATH`).
    pub cli_path: String,
    /// Whether requests may target this tool.
    pub enabled: bool,
    /// Per-attempt subprocess deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ToolSettings {
    /// Tool settings with the default two-minute deadline.
    ///
    /// Two minutes because injected guardrails add significant context.
    #[must_use]
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            enabled: true,
            timeout_secs: 120,
        }
    }
}

/// Guardrail policy file locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct GuardrailFileSettings {
    /// Root of the static policy tree.
    pub base_path: String,
    /// Root of the per-agent instruction tree.
    pub agents_path: String,
    /// Legacy top-level policy files still honoured by status checks.
    pub files: Vec<String>,
}

impl Default for GuardrailFileSettings {
    fn default() -> Self {
        Self {
            base_path: "~/.guardloop/guardrails".to_string(),
            agents_path: "~/.guardloop/guardrails/agents".to_string(),
            files: vec![
                "BPSBS.md".to_string(),
                "AI_Guardrails.md".to_string(),
                "UX_UI_Guardrails.md".to_string(),
            ],
        }
    }
}

/// Embedded database location and backup policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DatabaseSettings {
    /// SQLite file path.
    pub path: String,
    /// Whether periodic backups run.
    pub backup_enabled: bool,
    /// Hours between backups.
    pub backup_interval_hours: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "~/.guardloop/data/guardloop.db".to_string(),
            backup_enabled: true,
            backup_interval_hours: 24,
        }
    }
}

/// Logging configuration consumed by `guardloop-logging`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`..`error`), fed to the env filter.
    pub level: String,
    /// Optional log file; empty means stderr only.
    pub file: String,
    /// Size threshold that triggers rotation of the previous file.
    pub max_size_mb: u64,
    /// Rotated files to keep.
    pub backup_count: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: "~/.guardloop/logs/guardloop.log".to_string(),
            max_size_mb: 100,
            backup_count: 5,
        }
    }
}

/// Feature flags.
///
/// Everything defaults on; flipping a flag off removes the corresponding
/// pipeline step or worker without touching the rest.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct FeatureSettings {
    /// Master switch for the background analysis loop.
    pub background_analysis: bool,
    /// Adaptive guardrail learning (pattern mining feeds retrieval).
    pub v2_adaptive_learning: bool,
    /// Prompt task classification before context assembly.
    pub v2_task_classification: bool,
    /// Automatic writing of safe extracted files.
    pub v2_auto_save_files: bool,
    /// Multi-turn conversation tracking.
    pub v2_conversation_history: bool,
    /// Injection of learned rules into the context.
    pub v2_dynamic_guardrails: bool,
    /// Periodic failure-trend analysis worker.
    pub analysis_worker: bool,
    /// Periodic metrics aggregation worker.
    pub metrics_worker: bool,
    /// Periodic markdown export worker.
    pub markdown_export: bool,
    /// Daily retention/vacuum worker.
    pub cleanup_worker: bool,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            background_analysis: true,
            v2_adaptive_learning: true,
            v2_task_classification: true,
            v2_auto_save_files: true,
            v2_conversation_history: true,
            v2_dynamic_guardrails: true,
            analysis_worker: true,
            metrics_worker: true,
            markdown_export: true,
            cleanup_worker: true,
        }
    }
}

/// Team synchronisation settings (consumed by an external collaborator).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TeamSettings {
    /// Whether team sync runs at all.
    pub enabled: bool,
    /// Git remote holding the shared guardrails.
    pub sync_repo: String,
    /// Hours between sync attempts.
    pub sync_interval_hours: u64,
    /// Branch to track.
    pub branch: String,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sync_repo: String::new(),
            sync_interval_hours: 1,
            branch: "main".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
