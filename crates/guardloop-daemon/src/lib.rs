//! # guardloop-daemon
//!
//! The orchestrator that sequences the GuardLoop pipeline per request:
//! classification → context assembly → subprocess invocation → parsing →
//! validation → failure detection → reviewer chain → enforcement →
//! optional file materialisation → fire-and-forget persistence.
//!
//! Also home to the [`FileExecutor`] (safe writing of files extracted from
//! tool output) and the [`WorkerManager`] with its four periodic workers
//! (analysis, metrics, markdown export, cleanup).

#![deny(unsafe_code)]

mod daemon;
mod enforcement;
mod executor;
mod workers;

pub use daemon::{AiRequest, AiResult, DaemonStats, GuardLoopDaemon};
pub use enforcement::enforce;
pub use executor::{ExecutionSummary, FileExecutor, FileOperation};
pub use workers::WorkerManager;
