//! Settings loading errors.

use thiserror::Error;

/// Error raised while loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file contains invalid JSON or fails the typed schema.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<SettingsError> for guardloop_core::ConfigError {
    fn from(err: SettingsError) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}
