//! Session, agent-activity, context-tracking, and classification repositories.

use rusqlite::{params, Connection, OptionalExtension};

use guardloop_core::errors::StoreError;

use crate::rows::{
    json_to_sql, NewAgentActivity, NewContextTracking, NewSession, NewTaskClassification,
    SessionRow,
};
use crate::{now_iso, repos::read_err, repos::write_err};

/// SQL CRUD for the `sessions` table.
pub struct SessionRepository;

impl SessionRepository {
    /// Insert one session row.
    pub fn insert(conn: &Connection, session: &NewSession) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO sessions
                 (id, timestamp, tool, agent, mode, prompt, augmented_prompt, raw_output,
                  parsed_output, violations_count, failures_count, approved,
                  execution_time_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    session.id,
                    session.timestamp,
                    session.tool,
                    session.agent,
                    session.mode.as_str(),
                    session.prompt,
                    session.augmented_prompt,
                    session.raw_output,
                    session.parsed_output.as_ref().map(json_to_sql),
                    session.violations_count,
                    session.failures_count,
                    session.approved,
                    session.execution_time_ms,
                    now_iso(),
                ],
            )
            .map_err(|e| write_err("sessions", e))?;
        Ok(())
    }

    /// Get a session by id.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<SessionRow>, StoreError> {
        conn.query_row("SELECT * FROM sessions WHERE id = ?1", params![id], |row| {
            SessionRow::from_row(row)
        })
        .optional()
        .map_err(|e| read_err("sessions", e))
    }

    /// Total sessions recorded.
    pub fn count(conn: &Connection) -> Result<i64, StoreError> {
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .map_err(|e| read_err("sessions", e))
    }

    /// Sessions recorded at or after `cutoff`.
    pub fn count_since(conn: &Connection, cutoff: &str) -> Result<i64, StoreError> {
        conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE timestamp >= ?1",
            params![cutoff],
            |r| r.get(0),
        )
        .map_err(|e| read_err("sessions", e))
    }

    /// Approved sessions recorded at or after `cutoff`.
    pub fn approved_count_since(conn: &Connection, cutoff: &str) -> Result<i64, StoreError> {
        conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE timestamp >= ?1 AND approved = 1",
            params![cutoff],
            |r| r.get(0),
        )
        .map_err(|e| read_err("sessions", e))
    }

    /// Mean execution time of sessions at or after `cutoff`.
    pub fn avg_execution_ms_since(
        conn: &Connection,
        cutoff: &str,
    ) -> Result<Option<f64>, StoreError> {
        conn.query_row(
            "SELECT AVG(execution_time_ms) FROM sessions WHERE timestamp >= ?1",
            params![cutoff],
            |r| r.get(0),
        )
        .map_err(|e| read_err("sessions", e))
    }

    /// Delete sessions older than `cutoff`; cascades to all child rows.
    /// Returns the number of sessions removed.
    pub fn delete_older_than(conn: &Connection, cutoff: &str) -> Result<usize, StoreError> {
        conn.execute(
            "DELETE FROM sessions WHERE timestamp < ?1",
            params![cutoff],
        )
        .map_err(|e| write_err("sessions", e))
    }
}

/// SQL CRUD for the `agent_activity` table.
pub struct ActivityRepository;

impl ActivityRepository {
    /// Record one reviewer invocation.
    pub fn insert(conn: &Connection, activity: &NewAgentActivity) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO agent_activity
                 (session_id, timestamp, agent, action, success, execution_time_ms,
                  error_message, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?2)",
                params![
                    activity.session_id,
                    now_iso(),
                    activity.agent,
                    activity.action,
                    activity.success,
                    activity.execution_time_ms,
                    activity.error_message,
                    activity.metadata.as_ref().map(json_to_sql),
                ],
            )
            .map_err(|e| write_err("agent_activity", e))?;
        Ok(())
    }

    /// Record one context injection.
    pub fn insert_context(
        conn: &Connection,
        tracking: &NewContextTracking,
    ) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO context_tracking
                 (session_id, timestamp, context_type, context_data, tokens_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?2)",
                params![
                    tracking.session_id,
                    now_iso(),
                    tracking.context_type.as_str(),
                    json_to_sql(&tracking.context_data),
                    tracking.tokens_used,
                ],
            )
            .map_err(|e| write_err("context_tracking", e))?;
        Ok(())
    }
}

/// SQL CRUD for the `task_classifications` table.
pub struct ClassificationRepository;

impl ClassificationRepository {
    /// Record the classifier's verdict for a session.
    pub fn insert(
        conn: &Connection,
        classification: &NewTaskClassification,
    ) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO task_classifications
                 (session_id, task_type, confidence, requires_guardrails, features, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    classification.session_id,
                    classification.task_type.as_str(),
                    classification.confidence,
                    classification.requires_guardrails,
                    classification.features.as_ref().map(json_to_sql),
                    now_iso(),
                ],
            )
            .map_err(|e| write_err("task_classifications", e))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::NewViolation;
    use crate::Store;
    use guardloop_core::{GuardrailType, Mode, Severity, TaskType};

    fn test_session(id: &str, timestamp: &str) -> NewSession {
        NewSession {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            tool: "claude".to_string(),
            agent: "auto".to_string(),
            mode: Mode::Standard,
            prompt: "implement auth".to_string(),
            augmented_prompt: None,
            raw_output: Some("done".to_string()),
            parsed_output: Some(serde_json::json!({"code_blocks": []})),
            violations_count: 0,
            failures_count: 0,
            approved: true,
            execution_time_ms: 1200,
        }
    }

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        SessionRepository::insert(&conn, &test_session("s1", "2026-01-02T00:00:00Z")).unwrap();

        let row = SessionRepository::get(&conn, "s1").unwrap().unwrap();
        assert_eq!(row.tool, "claude");
        assert!(row.approved);
        assert_eq!(row.parsed_output.unwrap()["code_blocks"], serde_json::json!([]));
    }

    #[test]
    fn counts_respect_cutoff() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        SessionRepository::insert(&conn, &test_session("old", "2025-01-01T00:00:00Z")).unwrap();
        SessionRepository::insert(&conn, &test_session("new", "2026-06-01T00:00:00Z")).unwrap();

        assert_eq!(SessionRepository::count(&conn).unwrap(), 2);
        assert_eq!(
            SessionRepository::count_since(&conn, "2026-01-01T00:00:00Z").unwrap(),
            1
        );
    }

    #[test]
    fn delete_cascades_to_children() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        SessionRepository::insert(&conn, &test_session("s1", "2020-01-01T00:00:00Z")).unwrap();
        crate::repos::ViolationRepository::insert(
            &conn,
            &NewViolation {
                session_id: "s1".to_string(),
                guardrail_type: GuardrailType::Bpsbs,
                rule: "rbac".to_string(),
                severity: Severity::High,
                description: "missing".to_string(),
                suggestion: None,
                file_path: None,
                line_number: None,
            },
        )
        .unwrap();

        let deleted =
            SessionRepository::delete_older_than(&conn, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(deleted, 1);

        let orphan_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM violations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(orphan_count, 0);
    }

    #[test]
    fn classification_insert() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        SessionRepository::insert(&conn, &test_session("s1", "2026-01-02T00:00:00Z")).unwrap();
        ClassificationRepository::insert(
            &conn,
            &NewTaskClassification {
                session_id: "s1".to_string(),
                task_type: TaskType::Code,
                confidence: 0.82,
                requires_guardrails: true,
                features: Some(serde_json::json!({"code_keywords": 0.8})),
            },
        )
        .unwrap();
    }
}
