//! Connection pool and store-wide maintenance operations.

use std::path::{Path, PathBuf};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;
use tracing::info;

use guardloop_core::errors::{StoreError, StoreOperation};

use crate::migrations::apply_migrations;

/// Aggregate row counts and on-disk size.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StoreStats {
    /// Total recorded sessions.
    pub total_sessions: i64,
    /// Total detected failures.
    pub total_failures: i64,
    /// Total recorded violations.
    pub total_violations: i64,
    /// Total agent activity rows.
    pub total_agent_activity: i64,
    /// Total learned patterns.
    pub total_patterns: i64,
    /// Total dynamic guardrails.
    pub total_dynamic_guardrails: i64,
    /// Database file size in megabytes.
    pub db_size_mb: f64,
}

/// The embedded relational store.
///
/// Each caller acquires its own short-lived pooled connection; the pool's
/// init hook enables WAL journaling and foreign-key enforcement so cascades
/// hold on every connection.
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open (creating if needed) the store at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::new("store", StoreOperation::Write, e.to_string()).with_source(e)
            })?;
        }

        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = Pool::builder().max_size(8).build(manager).map_err(|e| {
            StoreError::new("store", StoreOperation::Write, e.to_string()).with_source(e)
        })?;

        let store = Self { pool, path };
        let conn = store.conn()?;
        apply_migrations(&conn)?;

        info!(path = %store.path.display(), "store opened");
        Ok(store)
    }

    /// Acquire a pooled connection.
    pub fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool.get().map_err(|e| {
            StoreError::new("store", StoreOperation::Read, e.to_string()).with_source(e)
        })
    }

    /// Path of the backing database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row counts and on-disk size.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<i64, StoreError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .map_err(|e| {
                    StoreError::new(table, StoreOperation::Read, e.to_string()).with_source(e)
                })
        };

        let db_size_mb = std::fs::metadata(&self.path)
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);

        Ok(StoreStats {
            total_sessions: count("sessions")?,
            total_failures: count("failure_modes")?,
            total_violations: count("violations")?,
            total_agent_activity: count("agent_activity")?,
            total_patterns: count("learned_patterns")?,
            total_dynamic_guardrails: count("dynamic_guardrails")?,
            db_size_mb,
        })
    }

    /// Copy the database file to `backup_path`, defaulting to a timestamped
    /// sibling of the live file.
    pub fn backup(&self, backup_path: Option<&Path>) -> Result<PathBuf, StoreError> {
        let target = backup_path.map_or_else(
            || {
                let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
                self.path
                    .with_file_name(format!("guardloop_backup_{stamp}.db"))
            },
            Path::to_path_buf,
        );

        // Flush the WAL into the main file so the copy is complete.
        let _ = self
            .conn()?
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");

        let _ = std::fs::copy(&self.path, &target).map_err(|e| {
            StoreError::new("store", StoreOperation::Write, e.to_string()).with_source(e)
        })?;
        info!(target = %target.display(), "store backed up");
        Ok(target)
    }

    /// Reclaim free pages.
    pub fn vacuum(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch("VACUUM;").map_err(|e| {
            StoreError::new("store", StoreOperation::Write, e.to_string()).with_source(e)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("guardloop.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_parent_dirs_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("nested/data/guardloop.db")).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_sessions, 0);
    }

    #[test]
    fn foreign_keys_are_enforced_per_connection() {
        let (_dir, store) = temp_store();
        let conn = store.conn().unwrap();
        let orphan = conn.execute(
            "INSERT INTO violations
             (session_id, timestamp, guardrail_type, rule, severity, description, created_at)
             VALUES ('missing', '2026-01-01T00:00:00Z', 'bpsbs', 'r', 'low', 'd',
                     '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(orphan.is_err());
    }

    #[test]
    fn backup_copies_file() {
        let (dir, store) = temp_store();
        let target = dir.path().join("backup.db");
        let written = store.backup(Some(&target)).unwrap();
        assert_eq!(written, target);
        assert!(target.exists());
    }

    #[test]
    fn vacuum_runs() {
        let (_dir, store) = temp_store();
        store.vacuum().unwrap();
    }
}
