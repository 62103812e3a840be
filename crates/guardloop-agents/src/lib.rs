//! # guardloop-agents
//!
//! Policy reviewers applied to a parsed response.
//!
//! Reviewers are configuration, not code: each is a [`ReviewerSpec`] — an
//! ordered list of keyword/structure probes with severities — interpreted by
//! one evaluation engine. The [`ChainOptimizer`] picks a minimal ordered
//! chain for the task; the [`ChainRunner`] executes it sequentially and
//! halts at the first rejection.

#![deny(unsafe_code)]

mod chain;
mod roster;
mod runner;
mod types;

pub use chain::ChainOptimizer;
pub use roster::{reviewer, reviewer_names, ReviewerSpec};
pub use runner::ChainRunner;
pub use types::{AgentContext, AgentDecision};
