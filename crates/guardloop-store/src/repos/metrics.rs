//! Daily metrics rollup repository.

use rusqlite::{params, Connection};

use guardloop_core::errors::StoreError;

use crate::rows::{json_to_sql, MetricsRollup};
use crate::{now_iso, repos::write_err};

/// SQL CRUD for the `metrics` table.
pub struct MetricsRepository;

impl MetricsRepository {
    /// Upsert the rollup row for a date.
    pub fn upsert(conn: &Connection, rollup: &MetricsRollup) -> Result<(), StoreError> {
        let now = now_iso();
        let _ = conn
            .execute(
                "INSERT INTO metrics
                 (date, total_sessions, success_rate, avg_execution_time_ms,
                  top_violations, top_failures, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT (date) DO UPDATE SET
                    total_sessions = excluded.total_sessions,
                    success_rate = excluded.success_rate,
                    avg_execution_time_ms = excluded.avg_execution_time_ms,
                    top_violations = excluded.top_violations,
                    top_failures = excluded.top_failures,
                    updated_at = excluded.updated_at",
                params![
                    rollup.date,
                    rollup.total_sessions,
                    rollup.success_rate,
                    rollup.avg_execution_time_ms,
                    json_to_sql(&rollup.top_violations),
                    json_to_sql(&rollup.top_failures),
                    now,
                ],
            )
            .map_err(|e| write_err("metrics", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn upsert_replaces_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let conn = store.conn().unwrap();

        let mut rollup = MetricsRollup {
            date: "2026-08-01".to_string(),
            total_sessions: 10,
            success_rate: 90.0,
            avg_execution_time_ms: 1500,
            top_violations: serde_json::json!([]),
            top_failures: serde_json::json!([]),
        };
        MetricsRepository::upsert(&conn, &rollup).unwrap();
        rollup.total_sessions = 12;
        MetricsRepository::upsert(&conn, &rollup).unwrap();

        let (count, sessions): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), MAX(total_sessions) FROM metrics",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(sessions, 12);
    }
}
