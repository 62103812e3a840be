//! Violation repository.

use rusqlite::{params, Connection};

use guardloop_core::errors::StoreError;

use crate::rows::{NewViolation, ViolationRow};
use crate::{now_iso, repos::read_err, repos::write_err};

/// SQL CRUD for the `violations` table.
pub struct ViolationRepository;

impl ViolationRepository {
    /// Insert one violation.
    pub fn insert(conn: &Connection, violation: &NewViolation) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO violations
                 (session_id, timestamp, guardrail_type, rule, severity, description,
                  suggestion, file_path, line_number, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?2)",
                params![
                    violation.session_id,
                    now_iso(),
                    violation.guardrail_type.as_str(),
                    violation.rule,
                    violation.severity.as_str(),
                    violation.description,
                    violation.suggestion,
                    violation.file_path,
                    violation.line_number,
                ],
            )
            .map_err(|e| write_err("violations", e))?;
        Ok(())
    }

    /// Violations recorded at or after `cutoff`, optionally restricted to
    /// specific guardrail types, oldest first.
    pub fn since(
        conn: &Connection,
        cutoff: &str,
        guardrail_types: Option<&[String]>,
    ) -> Result<Vec<ViolationRow>, StoreError> {
        let rows = match guardrail_types {
            Some(types) if !types.is_empty() => {
                let placeholders = vec!["?"; types.len()].join(", ");
                let sql = format!(
                    "SELECT * FROM violations
                     WHERE timestamp >= ? AND guardrail_type IN ({placeholders})
                     ORDER BY timestamp"
                );
                let mut stmt = conn.prepare(&sql).map_err(|e| read_err("violations", e))?;
                let mut values: Vec<&dyn rusqlite::types::ToSql> = vec![&cutoff];
                for t in types {
                    values.push(t);
                }
                let mapped = stmt
                    .query_map(values.as_slice(), |row| ViolationRow::from_row(row))
                    .map_err(|e| read_err("violations", e))?;
                mapped
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| read_err("violations", e))?
            }
            _ => {
                let mut stmt = conn
                    .prepare("SELECT * FROM violations WHERE timestamp >= ?1 ORDER BY timestamp")
                    .map_err(|e| read_err("violations", e))?;
                let mapped = stmt
                    .query_map(params![cutoff], |row| ViolationRow::from_row(row))
                    .map_err(|e| read_err("violations", e))?;
                mapped
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| read_err("violations", e))?
            }
        };
        Ok(rows)
    }

    /// Most frequently violated rules at or after `cutoff`.
    pub fn top_rules_since(
        conn: &Connection,
        cutoff: &str,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT rule, COUNT(*) AS n FROM violations
                 WHERE timestamp >= ?1 GROUP BY rule ORDER BY n DESC LIMIT ?2",
            )
            .map_err(|e| read_err("violations", e))?;
        let mapped = stmt
            .query_map(params![cutoff, limit], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| read_err("violations", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("violations", e))
    }
}
