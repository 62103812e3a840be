//! # guardloop-settings
//!
//! Typed settings for the GuardLoop daemon.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If `~/.guardloop/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Unknown keys are preserved through a flattened `extra` map; paths beginning
//! with `~` are expanded against `$HOME`.

#![deny(unsafe_code)]

mod errors;
mod loader;
mod types;

pub use errors::SettingsError;
pub use loader::{
    apply_env_overrides, deep_merge, expand_tilde, load_settings, load_settings_from_path,
    parse_bool, parse_u64_range, settings_path,
};
pub use types::{
    DatabaseSettings, FeatureSettings, GuardrailFileSettings, LoggingSettings, Settings,
    TeamSettings, ToolSettings,
};
