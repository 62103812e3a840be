//! # guardloop-store
//!
//! Embedded `SQLite` persistence for GuardLoop.
//!
//! - [`Store`]: r2d2 connection pool with WAL mode and foreign keys enabled
//! - Numbered migrations applied on open
//! - One stateless repository per entity; all methods take a `&Connection`
//!   and translate between Rust types and SQL
//! - Enum columns carry CHECK constraints so unknown values are rejected at
//!   write; deleting a session cascades to every child row

#![deny(unsafe_code)]

pub mod migrations;
pub mod repos;
pub mod rows;
mod store;

pub use store::{Store, StoreStats};

use chrono::{DateTime, Utc};

/// Get the current UTC timestamp in the store's canonical text form.
#[must_use]
pub fn now_iso() -> String {
    to_iso(Utc::now())
}

/// Render a timestamp in the store's canonical text form.
///
/// Second precision, fixed width, so lexicographic comparison matches
/// chronological order in SQL.
#[must_use]
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Cutoff timestamp `days` back from now, in canonical text form.
#[must_use]
pub fn days_ago_iso(days: i64) -> String {
    to_iso(Utc::now() - chrono::Duration::days(days))
}

/// Today's date (UTC) as `YYYY-MM-DD`, the effectiveness rollup key.
#[must_use]
pub fn today_date() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
