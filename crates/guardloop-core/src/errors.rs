//! Error hierarchy for GuardLoop.
//!
//! Provides a structured error type system built on [`thiserror`]:
//!
//! - [`GuardLoopError`]: top-level enum covering all error domains
//! - [`ConfigError`]: tool/mode/path configuration failures
//! - [`AdapterError`]: subprocess spawn, exit, and timeout failures
//! - [`StoreError`]: database/storage errors with table and operation context
//!
//! The orchestrator surfaces `Config` and `Adapter` errors to the caller;
//! store errors are logged and swallowed on the fire-and-forget write path.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// GuardLoopError — top-level error enum
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for GuardLoop.
#[derive(Debug, Error)]
pub enum GuardLoopError {
    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Tool adapter / subprocess error.
    #[error("{0}")]
    Adapter(#[from] AdapterError),

    /// Database / storage error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Generic internal error with a machine-readable code.
    #[error("[{code}] {message}")]
    Internal {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl GuardLoopError {
    /// Create an internal error with a code and message.
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Config(e) => e.code(),
            Self::Adapter(e) => e.code(),
            Self::Store(e) => &e.code,
            Self::Internal { code, .. } => code,
        }
    }

    /// Whether retrying the request could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Adapter(AdapterError::Timeout { .. } | AdapterError::NonZeroExit { .. })
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConfigError
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration error raised before any subprocess is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested tool is not present in the configuration.
    #[error("tool {tool} is not configured")]
    ToolUnknown {
        /// Requested tool name.
        tool: String,
    },

    /// The requested tool exists but is disabled.
    #[error("tool {tool} is disabled")]
    ToolDisabled {
        /// Requested tool name.
        tool: String,
    },

    /// The mode string is not a member of the closed set.
    #[error("invalid mode: {mode}")]
    InvalidMode {
        /// Rejected mode value.
        mode: String,
    },

    /// A required path setting is missing or unreadable.
    #[error("missing required path: {path}")]
    MissingPath {
        /// The offending path.
        path: String,
    },

    /// Settings file could not be parsed.
    #[error("settings parse failed: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
    },
}

impl ConfigError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ToolUnknown { .. } => "CONFIG_TOOL_UNKNOWN",
            Self::ToolDisabled { .. } => "CONFIG_TOOL_DISABLED",
            Self::InvalidMode { .. } => "CONFIG_INVALID_MODE",
            Self::MissingPath { .. } => "CONFIG_MISSING_PATH",
            Self::Parse { .. } => "CONFIG_PARSE_ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AdapterError
// ─────────────────────────────────────────────────────────────────────────────

/// Tool adapter failure after retries are exhausted.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The CLI binary could not be spawned.
    #[error("failed to spawn {cli_path}: {message}")]
    SpawnFailed {
        /// Configured binary path.
        cli_path: String,
        /// OS diagnostic.
        message: String,
    },

    /// The subprocess exited non-zero on every attempt.
    #[error("{tool} exited with code {exit_code} after {attempts} attempt(s): {stderr}")]
    NonZeroExit {
        /// Tool name.
        tool: String,
        /// Final exit code.
        exit_code: i32,
        /// Attempts made.
        attempts: u32,
        /// Captured stderr (truncated).
        stderr: String,
    },

    /// The subprocess exceeded its deadline on every attempt.
    #[error("Timeout after {timeout_secs}s ({attempts} attempt(s))")]
    Timeout {
        /// Per-attempt deadline in seconds.
        timeout_secs: u64,
        /// Attempts made.
        attempts: u32,
    },
}

impl AdapterError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SpawnFailed { .. } => "ADAPTER_SPAWN_FAILED",
            Self::NonZeroExit { .. } => "ADAPTER_NONZERO_EXIT",
            Self::Timeout { .. } => "ADAPTER_TIMEOUT",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StoreError
// ─────────────────────────────────────────────────────────────────────────────

/// Database operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    /// Reading from the store.
    Read,
    /// Writing to the store.
    Write,
    /// Deleting from the store.
    Delete,
    /// Running a migration.
    Migrate,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Delete => write!(f, "delete"),
            Self::Migrate => write!(f, "migrate"),
        }
    }
}

/// Database / storage error with table and operation context.
#[derive(Debug, Error)]
#[error("store {operation} failed on {table}: {message}")]
pub struct StoreError {
    /// Table or store that failed.
    pub table: String,
    /// Operation that failed.
    pub operation: StoreOperation,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable error code.
    pub code: String,
    /// Original cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        operation: StoreOperation,
        message: impl Into<String>,
    ) -> Self {
        let op_upper = operation.to_string().to_uppercase();
        Self {
            table: table.into(),
            operation,
            message: message.into(),
            code: format!("STORE_{op_upper}_ERROR"),
            source: None,
        }
    }

    /// Set the error cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
