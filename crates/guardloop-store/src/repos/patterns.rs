//! Learned-pattern repository.

use rusqlite::{params, Connection, OptionalExtension};

use guardloop_core::errors::StoreError;

use crate::rows::{json_to_sql, LearnedPatternRow, NewLearnedPattern};
use crate::{now_iso, repos::read_err, repos::write_err};

/// SQL CRUD for the `learned_patterns` table.
pub struct PatternRepository;

impl PatternRepository {
    /// Insert a new pattern; returns its id.
    ///
    /// The UNIQUE constraint on `pattern_hash` makes duplicate inserts an
    /// error; callers upsert by checking [`Self::find_by_hash`] first.
    pub fn insert(conn: &Connection, pattern: &NewLearnedPattern) -> Result<i64, StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO learned_patterns
                 (pattern_hash, category, signature, description, frequency, severity,
                  first_seen, last_seen, confidence, example_sessions, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    pattern.pattern_hash,
                    pattern.category,
                    pattern.signature,
                    pattern.description,
                    pattern.frequency,
                    pattern.severity.as_str(),
                    pattern.first_seen,
                    pattern.last_seen,
                    pattern.confidence,
                    serde_json::to_string(&pattern.example_sessions)
                        .unwrap_or_else(|_| "[]".to_string()),
                    pattern.metadata.as_ref().map(json_to_sql),
                    now_iso(),
                ],
            )
            .map_err(|e| write_err("learned_patterns", e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Look a pattern up by its deterministic hash.
    pub fn find_by_hash(
        conn: &Connection,
        pattern_hash: &str,
    ) -> Result<Option<LearnedPatternRow>, StoreError> {
        conn.query_row(
            "SELECT * FROM learned_patterns WHERE pattern_hash = ?1",
            params![pattern_hash],
            |row| LearnedPatternRow::from_row(row),
        )
        .optional()
        .map_err(|e| read_err("learned_patterns", e))
    }

    /// Get a pattern by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<LearnedPatternRow>, StoreError> {
        conn.query_row(
            "SELECT * FROM learned_patterns WHERE id = ?1",
            params![id],
            |row| LearnedPatternRow::from_row(row),
        )
        .optional()
        .map_err(|e| read_err("learned_patterns", e))
    }

    /// Refresh an existing pattern after re-observation.
    ///
    /// `frequency` and `last_seen` only move forward; the stored exemplars
    /// are replaced with the latest capped set.
    pub fn update_occurrence(
        conn: &Connection,
        id: i64,
        frequency: i64,
        last_seen: &str,
        confidence: f64,
        example_sessions: &[String],
    ) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "UPDATE learned_patterns
                 SET frequency = MAX(frequency, ?2),
                     last_seen = MAX(last_seen, ?3),
                     confidence = ?4,
                     example_sessions = ?5
                 WHERE id = ?1",
                params![
                    id,
                    frequency,
                    last_seen,
                    confidence,
                    serde_json::to_string(example_sessions).unwrap_or_else(|_| "[]".to_string()),
                ],
            )
            .map_err(|e| write_err("learned_patterns", e))?;
        Ok(())
    }

    /// Most frequent patterns.
    pub fn trending(conn: &Connection, limit: i64) -> Result<Vec<LearnedPatternRow>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT * FROM learned_patterns ORDER BY frequency DESC LIMIT ?1")
            .map_err(|e| read_err("learned_patterns", e))?;
        let mapped = stmt
            .query_map(params![limit], |row| LearnedPatternRow::from_row(row))
            .map_err(|e| read_err("learned_patterns", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("learned_patterns", e))
    }

    /// High-severity patterns above a confidence floor.
    pub fn high_severity(
        conn: &Connection,
        min_confidence: f64,
        limit: i64,
    ) -> Result<Vec<LearnedPatternRow>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM learned_patterns
                 WHERE severity IN ('high', 'critical') AND confidence >= ?1
                 ORDER BY CASE severity WHEN 'critical' THEN 0 ELSE 1 END, frequency DESC
                 LIMIT ?2",
            )
            .map_err(|e| read_err("learned_patterns", e))?;
        let mapped = stmt
            .query_map(params![min_confidence, limit], |row| {
                LearnedPatternRow::from_row(row)
            })
            .map_err(|e| read_err("learned_patterns", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("learned_patterns", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use guardloop_core::Severity;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn pattern(hash: &str, frequency: i64, severity: Severity) -> NewLearnedPattern {
        NewLearnedPattern {
            pattern_hash: hash.to_string(),
            category: "Looping".to_string(),
            signature: "Looping::stack overflow".to_string(),
            description: "Looping: stack overflow (seen 4 times)".to_string(),
            frequency,
            severity,
            first_seen: "2026-01-01T00:00:00Z".to_string(),
            last_seen: "2026-01-05T00:00:00Z".to_string(),
            confidence: 0.7,
            example_sessions: vec!["s1".to_string()],
            metadata: None,
        }
    }

    #[test]
    fn hash_is_unique() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        let _ = PatternRepository::insert(&conn, &pattern("h1", 4, Severity::Critical)).unwrap();
        assert!(PatternRepository::insert(&conn, &pattern("h1", 4, Severity::Critical)).is_err());
    }

    #[test]
    fn occurrence_update_is_monotonic() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        let id = PatternRepository::insert(&conn, &pattern("h1", 5, Severity::High)).unwrap();

        // A stale re-analysis (smaller window) must not move frequency or
        // last_seen backwards.
        PatternRepository::update_occurrence(&conn, id, 3, "2026-01-02T00:00:00Z", 0.65, &[])
            .unwrap();

        let row = PatternRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(row.frequency, 5);
        assert_eq!(row.last_seen, "2026-01-05T00:00:00Z");
        assert!((row.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn high_severity_puts_critical_first() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        let _ = PatternRepository::insert(&conn, &pattern("h1", 10, Severity::High)).unwrap();
        let _ = PatternRepository::insert(&conn, &pattern("h2", 3, Severity::Critical)).unwrap();

        let rows = PatternRepository::high_severity(&conn, 0.5, 10).unwrap();
        assert_eq!(rows[0].severity, Severity::Critical);
    }
}
