//! Adapter resolution from the configured tool map.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use guardloop_core::{ConfigError, RetryPolicy};
use guardloop_settings::ToolSettings;

use crate::adapter::{CliAdapter, ToolAdapter};

/// Creates and caches adapters for the configured tools.
///
/// Tests (and embedders) can pre-register replacement adapters; configured
/// CLI adapters are built lazily on first request.
pub struct AdapterFactory {
    tools: BTreeMap<String, ToolSettings>,
    retry: RetryPolicy,
    overrides: BTreeMap<String, Arc<dyn ToolAdapter>>,
}

impl std::fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterFactory {
    /// Build a factory over the configured tool map.
    #[must_use]
    pub fn new(tools: BTreeMap<String, ToolSettings>) -> Self {
        Self {
            tools,
            retry: RetryPolicy::default(),
            overrides: BTreeMap::new(),
        }
    }

    /// Override the retry policy for every constructed adapter.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register a replacement adapter (used by tests and embedders).
    #[must_use]
    pub fn with_adapter(mut self, name: impl Into<String>, adapter: Arc<dyn ToolAdapter>) -> Self {
        let _ = self.overrides.insert(name.into(), adapter);
        self
    }

    /// Resolve the adapter for `tool`.
    ///
    /// Unknown tools and disabled tools are configuration errors; the
    /// pipeline aborts before any subprocess is spawned.
    pub fn get(&self, tool: &str) -> Result<Arc<dyn ToolAdapter>, ConfigError> {
        if let Some(adapter) = self.overrides.get(tool) {
            return Ok(Arc::clone(adapter));
        }

        let settings = self
            .tools
            .get(tool)
            .ok_or_else(|| ConfigError::ToolUnknown { tool: tool.into() })?;
        if !settings.enabled {
            return Err(ConfigError::ToolDisabled { tool: tool.into() });
        }

        debug!(tool, cli_path = %settings.cli_path, "adapter created");
        Ok(Arc::new(
            CliAdapter::new(
                tool,
                settings.cli_path.clone(),
                Duration::from_secs(settings.timeout_secs),
            )
            .with_retry(self.retry),
        ))
    }

    /// Names of all configured tools (enabled or not).
    #[must_use]
    pub fn supported_tools(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Check installation of every enabled tool.
    #[must_use]
    pub fn validate_all(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for (name, settings) in &self.tools {
            if !settings.enabled {
                let _ = results.insert(name.clone(), false);
                continue;
            }
            match self.get(name) {
                Ok(adapter) => {
                    let _ = results.insert(name.clone(), adapter.validate_installation());
                }
                Err(e) => {
                    error!(tool = %name, error = %e, "tool validation failed");
                    let _ = results.insert(name.clone(), false);
                }
            }
        }
        results
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> BTreeMap<String, ToolSettings> {
        let mut map = BTreeMap::new();
        let _ = map.insert("claude".to_string(), ToolSettings::new("echo"));
        let mut disabled = ToolSettings::new("echo");
        disabled.enabled = false;
        let _ = map.insert("gemini".to_string(), disabled);
        map
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let factory = AdapterFactory::new(tools());
        let err = factory.get("copilot").unwrap_err();
        assert_eq!(err.code(), "CONFIG_TOOL_UNKNOWN");
    }

    #[test]
    fn disabled_tool_is_rejected() {
        let factory = AdapterFactory::new(tools());
        let err = factory.get("gemini").unwrap_err();
        assert_eq!(err.code(), "CONFIG_TOOL_DISABLED");
    }

    #[test]
    fn enabled_tool_resolves() {
        let factory = AdapterFactory::new(tools());
        let adapter = factory.get("claude").unwrap();
        assert_eq!(adapter.name(), "claude");
    }

    #[test]
    fn validate_all_marks_disabled_false() {
        let factory = AdapterFactory::new(tools());
        let results = factory.validate_all();
        assert_eq!(results.get("gemini"), Some(&false));
        // `echo` exists on any sane PATH.
        assert_eq!(results.get("claude"), Some(&true));
    }
}
