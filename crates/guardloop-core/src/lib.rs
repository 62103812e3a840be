//! # guardloop-core
//!
//! Foundation types, errors, branded IDs, and utilities for GuardLoop.
//!
//! This crate provides the shared vocabulary that all other GuardLoop crates
//! depend on:
//!
//! - **Branded IDs**: `SessionId`, `ConversationId` as newtypes for type safety
//! - **Domain enums**: `Severity`, `Mode`, `TaskType`, `Complexity`, and the
//!   adaptive-rule lifecycle/enforcement enums — all closed sets
//! - **Errors**: `GuardLoopError` hierarchy via `thiserror`
//! - **Retry**: exponential backoff policy shared by the tool adapters
//! - **Tokens**: the chars/4 fallback token estimator

#![deny(unsafe_code)]

pub mod enums;
pub mod errors;
pub mod ids;
pub mod retry;
pub mod tokens;

pub use enums::{
    Complexity, ContextType, EnforcementMode, GuardrailType, Mode, Role, RuleStatus, Severity,
    TaskType,
};
pub use errors::{AdapterError, ConfigError, GuardLoopError, StoreError};
pub use ids::{ConversationId, SessionId};
pub use retry::RetryPolicy;
pub use tokens::{estimate_tokens, CHARS_PER_TOKEN};
