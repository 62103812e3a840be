//! Dynamic-guardrail and effectiveness repositories.

use rusqlite::{params, Connection, OptionalExtension};

use guardloop_core::errors::StoreError;
use guardloop_core::{EnforcementMode, RuleStatus};

use crate::rows::{json_to_sql, DynamicGuardrailRow, EffectivenessTotals, NewDynamicGuardrail};
use crate::{now_iso, repos::read_err, repos::write_err};

/// SQL CRUD for the `dynamic_guardrails` table.
pub struct RuleRepository;

impl RuleRepository {
    /// Mint a new rule in `trial` status; returns its id.
    pub fn insert(conn: &Connection, rule: &NewDynamicGuardrail) -> Result<i64, StoreError> {
        let task_types: Vec<&str> = rule.task_types.iter().map(|t| t.as_str()).collect();
        let now = now_iso();
        let _ = conn
            .execute(
                "INSERT INTO dynamic_guardrails
                 (pattern_id, rule_text, category, confidence, status, enforcement_mode,
                  task_types, created_by, created_at, activated_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, 'trial', ?5, ?6, ?7, ?8, ?8, ?9)",
                params![
                    rule.pattern_id,
                    rule.rule_text,
                    rule.category,
                    rule.confidence,
                    rule.enforcement_mode.as_str(),
                    serde_json::to_string(&task_types).unwrap_or_else(|_| "[]".to_string()),
                    rule.created_by,
                    now,
                    rule.metadata.as_ref().map(json_to_sql),
                ],
            )
            .map_err(|e| write_err("dynamic_guardrails", e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a rule by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<DynamicGuardrailRow>, StoreError> {
        conn.query_row(
            "SELECT * FROM dynamic_guardrails WHERE id = ?1",
            params![id],
            |row| DynamicGuardrailRow::from_row(row),
        )
        .optional()
        .map_err(|e| read_err("dynamic_guardrails", e))
    }

    /// The live (non-deprecated) rule minted for a pattern, if any.
    pub fn find_live_for_pattern(
        conn: &Connection,
        pattern_id: i64,
    ) -> Result<Option<DynamicGuardrailRow>, StoreError> {
        conn.query_row(
            "SELECT * FROM dynamic_guardrails
             WHERE pattern_id = ?1 AND status IN ('trial', 'validated', 'enforced')
             LIMIT 1",
            params![pattern_id],
            |row| DynamicGuardrailRow::from_row(row),
        )
        .optional()
        .map_err(|e| read_err("dynamic_guardrails", e))
    }

    /// Rules eligible for context injection: validated or enforced, live,
    /// and at or above the confidence floor. Task-type filtering happens in
    /// memory because `task_types` is a JSON column.
    pub fn active(
        conn: &Connection,
        min_confidence: f64,
    ) -> Result<Vec<DynamicGuardrailRow>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM dynamic_guardrails
                 WHERE status IN ('validated', 'enforced')
                   AND confidence >= ?1
                   AND deactivated_at IS NULL
                 ORDER BY confidence DESC",
            )
            .map_err(|e| read_err("dynamic_guardrails", e))?;
        let mapped = stmt
            .query_map(params![min_confidence], |row| {
                DynamicGuardrailRow::from_row(row)
            })
            .map_err(|e| read_err("dynamic_guardrails", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("dynamic_guardrails", e))
    }

    /// All rules currently in `trial`.
    pub fn in_trial(conn: &Connection) -> Result<Vec<DynamicGuardrailRow>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT * FROM dynamic_guardrails WHERE status = 'trial'")
            .map_err(|e| read_err("dynamic_guardrails", e))?;
        let mapped = stmt
            .query_map([], |row| DynamicGuardrailRow::from_row(row))
            .map_err(|e| read_err("dynamic_guardrails", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("dynamic_guardrails", e))
    }

    /// Move a rule to a new lifecycle status.
    ///
    /// The caller is responsible for checking transition legality; this just
    /// writes the row, stamping `deactivated_at` on deprecation and
    /// upgrading enforcement to `block` on promotion to enforced.
    pub fn set_status(
        conn: &Connection,
        id: i64,
        status: RuleStatus,
        deprecation_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        match status {
            RuleStatus::Deprecated => {
                let _ = conn
                    .execute(
                        "UPDATE dynamic_guardrails
                         SET status = 'deprecated',
                             deactivated_at = ?2,
                             metadata = json_set(COALESCE(metadata, '{}'),
                                                 '$.deprecation_reason', ?3)
                         WHERE id = ?1",
                        params![id, now_iso(), deprecation_reason.unwrap_or("unspecified")],
                    )
                    .map_err(|e| write_err("dynamic_guardrails", e))?;
            }
            RuleStatus::Enforced => {
                let _ = conn
                    .execute(
                        "UPDATE dynamic_guardrails
                         SET status = 'enforced', enforcement_mode = ?2
                         WHERE id = ?1",
                        params![id, EnforcementMode::Block.as_str()],
                    )
                    .map_err(|e| write_err("dynamic_guardrails", e))?;
            }
            _ => {
                let _ = conn
                    .execute(
                        "UPDATE dynamic_guardrails SET status = ?2 WHERE id = ?1",
                        params![id, status.as_str()],
                    )
                    .map_err(|e| write_err("dynamic_guardrails", e))?;
            }
        }
        Ok(())
    }
}

/// SQL CRUD for the `rule_effectiveness` daily rollups.
pub struct EffectivenessRepository;

impl EffectivenessRepository {
    /// Atomically increment today's rollup for a rule.
    ///
    /// Creates the `(rule_id, date)` row on first trigger; the running
    /// average confidence is folded in on every trigger.
    pub fn record_trigger(
        conn: &Connection,
        rule_id: i64,
        date: &str,
        prevented_failure: bool,
        false_positive: bool,
        true_positive: bool,
        confidence: f64,
    ) -> Result<(), StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO rule_effectiveness
                 (rule_id, date, times_triggered, prevented_failures, true_positives,
                  false_positives, avg_confidence)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6)
                 ON CONFLICT (rule_id, date) DO UPDATE SET
                    times_triggered = times_triggered + 1,
                    prevented_failures = prevented_failures + excluded.prevented_failures,
                    true_positives = true_positives + excluded.true_positives,
                    false_positives = false_positives + excluded.false_positives,
                    avg_confidence = (avg_confidence * times_triggered + excluded.avg_confidence)
                                     / (times_triggered + 1)",
                params![
                    rule_id,
                    date,
                    i64::from(prevented_failure),
                    i64::from(true_positive),
                    i64::from(false_positive),
                    confidence,
                ],
            )
            .map_err(|e| write_err("rule_effectiveness", e))?;
        Ok(())
    }

    /// Lifetime totals for a rule across all daily rollups.
    pub fn totals(conn: &Connection, rule_id: i64) -> Result<EffectivenessTotals, StoreError> {
        conn.query_row(
            "SELECT COALESCE(SUM(times_triggered), 0),
                    COALESCE(SUM(prevented_failures), 0),
                    COALESCE(SUM(true_positives), 0),
                    COALESCE(SUM(false_positives), 0)
             FROM rule_effectiveness WHERE rule_id = ?1",
            params![rule_id],
            |row| {
                Ok(EffectivenessTotals {
                    times_triggered: row.get(0)?,
                    prevented_failures: row.get(1)?,
                    true_positives: row.get(2)?,
                    false_positives: row.get(3)?,
                })
            },
        )
        .map_err(|e| read_err("rule_effectiveness", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::PatternRepository;
    use crate::rows::NewLearnedPattern;
    use crate::Store;
    use guardloop_core::{Severity, TaskType};

    fn store_with_pattern() -> (tempfile::TempDir, Store, i64) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let conn = store.conn().unwrap();
        let pattern_id = PatternRepository::insert(
            &conn,
            &NewLearnedPattern {
                pattern_hash: "h1".to_string(),
                category: "Security".to_string(),
                signature: "Security::sql injection".to_string(),
                description: "Security: missing input sanitisation".to_string(),
                frequency: 5,
                severity: Severity::High,
                first_seen: "2026-01-01T00:00:00Z".to_string(),
                last_seen: "2026-01-05T00:00:00Z".to_string(),
                confidence: 0.75,
                example_sessions: vec![],
                metadata: None,
            },
        )
        .unwrap();
        (dir, store, pattern_id)
    }

    fn rule(pattern_id: i64) -> NewDynamicGuardrail {
        NewDynamicGuardrail {
            pattern_id,
            rule_text: "MUST include: input sanitisation".to_string(),
            category: "Security".to_string(),
            confidence: 0.75,
            enforcement_mode: EnforcementMode::AutoFix,
            task_types: vec![TaskType::Code, TaskType::Mixed],
            created_by: "pattern_analyzer".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn insert_starts_in_trial() {
        let (_dir, store, pattern_id) = store_with_pattern();
        let conn = store.conn().unwrap();
        let id = RuleRepository::insert(&conn, &rule(pattern_id)).unwrap();

        let row = RuleRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(row.status, RuleStatus::Trial);
        assert_eq!(row.task_types, vec![TaskType::Code, TaskType::Mixed]);
        assert!(row.activated_at.is_some());
        assert!(row.deactivated_at.is_none());
    }

    #[test]
    fn trial_rules_are_not_active() {
        let (_dir, store, pattern_id) = store_with_pattern();
        let conn = store.conn().unwrap();
        let id = RuleRepository::insert(&conn, &rule(pattern_id)).unwrap();

        assert!(RuleRepository::active(&conn, 0.5).unwrap().is_empty());

        RuleRepository::set_status(&conn, id, RuleStatus::Validated, None).unwrap();
        assert_eq!(RuleRepository::active(&conn, 0.5).unwrap().len(), 1);
    }

    #[test]
    fn enforced_upgrades_enforcement_to_block() {
        let (_dir, store, pattern_id) = store_with_pattern();
        let conn = store.conn().unwrap();
        let id = RuleRepository::insert(&conn, &rule(pattern_id)).unwrap();
        RuleRepository::set_status(&conn, id, RuleStatus::Validated, None).unwrap();
        RuleRepository::set_status(&conn, id, RuleStatus::Enforced, None).unwrap();

        let row = RuleRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(row.status, RuleStatus::Enforced);
        assert_eq!(row.enforcement_mode, EnforcementMode::Block);
    }

    #[test]
    fn deprecation_stamps_deactivated_at() {
        let (_dir, store, pattern_id) = store_with_pattern();
        let conn = store.conn().unwrap();
        let id = RuleRepository::insert(&conn, &rule(pattern_id)).unwrap();
        RuleRepository::set_status(&conn, id, RuleStatus::Deprecated, Some("low_effectiveness"))
            .unwrap();

        let row = RuleRepository::get(&conn, id).unwrap().unwrap();
        assert!(row.deactivated_at.is_some());
        assert_eq!(
            row.metadata.unwrap()["deprecation_reason"],
            "low_effectiveness"
        );
        assert!(RuleRepository::active(&conn, 0.0).unwrap().is_empty());
    }

    #[test]
    fn effectiveness_upserts_daily() {
        let (_dir, store, pattern_id) = store_with_pattern();
        let conn = store.conn().unwrap();
        let id = RuleRepository::insert(&conn, &rule(pattern_id)).unwrap();

        EffectivenessRepository::record_trigger(&conn, id, "2026-08-01", true, false, true, 0.8)
            .unwrap();
        EffectivenessRepository::record_trigger(&conn, id, "2026-08-01", false, true, false, 0.6)
            .unwrap();

        let totals = EffectivenessRepository::totals(&conn, id).unwrap();
        assert_eq!(totals.times_triggered, 2);
        assert_eq!(totals.prevented_failures, 1);
        assert_eq!(totals.true_positives, 1);
        assert_eq!(totals.false_positives, 1);
        assert!((totals.success_rate() - 0.0).abs() < 1e-9);
    }
}
