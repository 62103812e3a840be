//! # guardloop-learning
//!
//! The adaptive learning loop:
//!
//! - [`PatternAnalyzer`]: mines historical failures and violations into
//!   [`LearnedPattern`](guardloop_store::rows::LearnedPatternRow)s with
//!   deterministic signature hashes and upsert semantics
//! - [`AdaptiveGuardrailManager`]: mints dynamic guardrails from patterns,
//!   drives their lifecycle (`trial → validated → enforced`, `deprecated`
//!   terminal), tracks daily effectiveness, and serves ranked rules for
//!   context injection

#![deny(unsafe_code)]

mod adaptive;
mod analyzer;

pub use adaptive::AdaptiveGuardrailManager;
pub use analyzer::{pattern_hash, PatternAnalyzer};
