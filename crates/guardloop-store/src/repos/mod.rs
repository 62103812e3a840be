//! Stateless repositories, one per entity cluster.
//!
//! All methods take a `&Connection` and are pure SQL translation; pooling
//! and transactions are the caller's concern.

mod conversations;
mod failures;
mod metrics;
mod patterns;
mod rules;
mod sessions;
mod violations;

pub use conversations::ConversationRepository;
pub use failures::FailureRepository;
pub use metrics::MetricsRepository;
pub use patterns::PatternRepository;
pub use rules::{EffectivenessRepository, RuleRepository};
pub use sessions::{ActivityRepository, ClassificationRepository, SessionRepository};
pub use violations::ViolationRepository;

use guardloop_core::errors::{StoreError, StoreOperation};

pub(crate) fn read_err(table: &str, err: rusqlite::Error) -> StoreError {
    StoreError::new(table, StoreOperation::Read, err.to_string()).with_source(err)
}

pub(crate) fn write_err(table: &str, err: rusqlite::Error) -> StoreError {
    StoreError::new(table, StoreOperation::Write, err.to_string()).with_source(err)
}
