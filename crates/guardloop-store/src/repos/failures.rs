//! Failure-mode repository.

use rusqlite::{params, Connection};

use guardloop_core::errors::StoreError;

use crate::rows::{FailureRow, NewFailure};
use crate::{now_iso, repos::read_err, repos::write_err};

/// SQL CRUD for the `failure_modes` table.
pub struct FailureRepository;

impl FailureRepository {
    /// Insert one detected failure.
    pub fn insert(conn: &Connection, failure: &NewFailure) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO failure_modes
                 (session_id, timestamp, tool, category, pattern, context, severity,
                  suggestion, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?2)",
                params![
                    failure.session_id,
                    now_iso(),
                    failure.tool,
                    failure.category,
                    failure.pattern,
                    failure.context,
                    failure.severity.as_str(),
                    failure.suggestion,
                ],
            )
            .map_err(|e| write_err("failure_modes", e))?;
        Ok(())
    }

    /// Failures recorded at or after `cutoff`, optionally restricted to
    /// specific categories, oldest first.
    pub fn since(
        conn: &Connection,
        cutoff: &str,
        categories: Option<&[String]>,
    ) -> Result<Vec<FailureRow>, StoreError> {
        let rows = match categories {
            Some(cats) if !cats.is_empty() => {
                let placeholders = vec!["?"; cats.len()].join(", ");
                let sql = format!(
                    "SELECT * FROM failure_modes
                     WHERE timestamp >= ? AND category IN ({placeholders})
                     ORDER BY timestamp"
                );
                let mut stmt = conn.prepare(&sql).map_err(|e| read_err("failure_modes", e))?;
                let mut values: Vec<&dyn rusqlite::types::ToSql> = vec![&cutoff];
                for cat in cats {
                    values.push(cat);
                }
                let mapped = stmt
                    .query_map(values.as_slice(), |row| FailureRow::from_row(row))
                    .map_err(|e| read_err("failure_modes", e))?;
                mapped
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| read_err("failure_modes", e))?
            }
            _ => {
                let mut stmt = conn
                    .prepare(
                        "SELECT * FROM failure_modes WHERE timestamp >= ?1 ORDER BY timestamp",
                    )
                    .map_err(|e| read_err("failure_modes", e))?;
                let mapped = stmt
                    .query_map(params![cutoff], |row| FailureRow::from_row(row))
                    .map_err(|e| read_err("failure_modes", e))?;
                mapped
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| read_err("failure_modes", e))?
            }
        };
        Ok(rows)
    }

    /// Most recent failures, newest first.
    pub fn recent(conn: &Connection, limit: i64) -> Result<Vec<FailureRow>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT * FROM failure_modes ORDER BY timestamp DESC LIMIT ?1")
            .map_err(|e| read_err("failure_modes", e))?;
        let mapped = stmt
            .query_map(params![limit], |row| FailureRow::from_row(row))
            .map_err(|e| read_err("failure_modes", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("failure_modes", e))
    }

    /// Occurrence counts per category at or after `cutoff`, most frequent first.
    pub fn counts_by_category_since(
        conn: &Connection,
        cutoff: &str,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT category, COUNT(*) AS n FROM failure_modes
                 WHERE timestamp >= ?1 GROUP BY category ORDER BY n DESC",
            )
            .map_err(|e| read_err("failure_modes", e))?;
        let mapped = stmt
            .query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| read_err("failure_modes", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("failure_modes", e))
    }
}
