//! # guardloop-adapters
//!
//! Subprocess adapters for the wrapped AI CLI tools.
//!
//! - [`ToolAdapter`]: the adapter seam (execute, validate, version)
//! - [`CliAdapter`]: spawns `cli_path <prompt>`, captures stdout/stderr,
//!   enforces the per-attempt deadline, retries with exponential backoff,
//!   and optionally streams stdout line-by-line through a callback
//! - [`AdapterFactory`]: resolves adapters from the configured tool map and
//!   accepts injected replacements for testing
//!
//! Adapters never return `Err`: a final failure yields an [`AiResponse`]
//! with a non-zero exit code and a populated `error` field, and the caller
//! decides how to surface it.

#![deny(unsafe_code)]

mod adapter;
mod factory;
mod response;
mod version;

pub use adapter::{CliAdapter, StreamCallback, ToolAdapter};
pub use factory::AdapterFactory;
pub use response::AiResponse;
pub use version::parse_version;
