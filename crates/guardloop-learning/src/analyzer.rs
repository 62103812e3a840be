//! Mining recurring failures and violations into learned patterns.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::info;

use guardloop_core::errors::StoreError;
use guardloop_core::Severity;
use guardloop_store::repos::{FailureRepository, PatternRepository, ViolationRepository};
use guardloop_store::rows::{FailureRow, LearnedPatternRow, NewLearnedPattern, ViolationRow};
use guardloop_store::{days_ago_iso, Store};

/// Deterministic 256-bit hash over a pattern signature.
///
/// Bit-identical across runs for the same `(category, pattern)` pair.
#[must_use]
pub fn pattern_hash(category: &str, pattern: &str) -> String {
    let signature = format!("{category}::{pattern}");
    let digest = Sha256::digest(signature.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Mines persistence for statistically significant failure signatures.
pub struct PatternAnalyzer {
    store: Store,
    min_frequency: usize,
    min_confidence: f64,
}

impl std::fmt::Debug for PatternAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternAnalyzer")
            .field("min_frequency", &self.min_frequency)
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

impl PatternAnalyzer {
    /// Analyzer with the default gates (frequency ≥ 3, confidence ≥ 0.6).
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self::with_gates(store, 3, 0.6)
    }

    /// Analyzer with explicit gates.
    #[must_use]
    pub fn with_gates(store: Store, min_frequency: usize, min_confidence: f64) -> Self {
        Self {
            store,
            min_frequency,
            min_confidence,
        }
    }

    /// Mine failures within the last `days`, optionally restricted to
    /// categories. Upserts one pattern per `(category, pattern)` group that
    /// passes both gates; writes are committed in one batch.
    pub fn analyze_failures(
        &self,
        days: i64,
        categories: Option<&[String]>,
    ) -> Result<Vec<LearnedPatternRow>, StoreError> {
        let cutoff = days_ago_iso(days);
        let mut conn = self.store.conn()?;
        let failures = FailureRepository::since(&conn, &cutoff, categories)?;

        info!(total_failures = failures.len(), days, "analyzing failures");

        let mut groups: BTreeMap<(String, String), Vec<&FailureRow>> = BTreeMap::new();
        for failure in &failures {
            groups
                .entry((failure.category.clone(), failure.pattern.clone()))
                .or_default()
                .push(failure);
        }

        let tx = conn.transaction().map_err(|e| {
            StoreError::new(
                "learned_patterns",
                guardloop_core::errors::StoreOperation::Write,
                e.to_string(),
            )
        })?;

        let mut learned = Vec::new();
        for ((category, pattern), members) in groups {
            let frequency = members.len();
            if frequency < self.min_frequency {
                continue;
            }

            let confidence = failure_confidence(&members);
            if confidence < self.min_confidence {
                continue;
            }

            let hash = pattern_hash(&category, &pattern);
            let severity = members
                .iter()
                .map(|f| f.severity)
                .max()
                .unwrap_or(Severity::Low);
            let first_seen = members
                .iter()
                .map(|f| f.timestamp.as_str())
                .min()
                .unwrap_or_default()
                .to_string();
            let last_seen = members
                .iter()
                .map(|f| f.timestamp.as_str())
                .max()
                .unwrap_or_default()
                .to_string();
            let examples: Vec<String> = members
                .iter()
                .filter_map(|f| f.session_id.clone())
                .take(5)
                .collect();

            let row = if let Some(existing) = PatternRepository::find_by_hash(&tx, &hash)? {
                PatternRepository::update_occurrence(
                    &tx,
                    existing.id,
                    i64::try_from(frequency).unwrap_or(i64::MAX),
                    &last_seen,
                    confidence,
                    &examples,
                )?;
                PatternRepository::get(&tx, existing.id)?.unwrap_or(existing)
            } else {
                let contexts: Vec<&str> = members
                    .iter()
                    .filter_map(|f| f.context.as_deref())
                    .take(3)
                    .collect();
                let tools: Vec<&str> = {
                    let mut tools: Vec<&str> =
                        members.iter().map(|f| f.tool.as_str()).collect();
                    tools.sort_unstable();
                    tools.dedup();
                    tools
                };
                let id = PatternRepository::insert(
                    &tx,
                    &NewLearnedPattern {
                        pattern_hash: hash.clone(),
                        category: category.clone(),
                        signature: format!("{category}::{pattern}"),
                        description: format!(
                            "{category}: {pattern} (seen {frequency} times)"
                        ),
                        frequency: i64::try_from(frequency).unwrap_or(i64::MAX),
                        severity,
                        first_seen,
                        last_seen,
                        confidence,
                        example_sessions: examples,
                        metadata: Some(serde_json::json!({
                            "common_contexts": contexts,
                            "affected_tools": tools,
                        })),
                    },
                )?;
                PatternRepository::get(&tx, id)?.ok_or_else(|| {
                    StoreError::new(
                        "learned_patterns",
                        guardloop_core::errors::StoreOperation::Read,
                        "inserted pattern vanished",
                    )
                })?
            };
            learned.push(row);
        }

        tx.commit().map_err(|e| {
            StoreError::new(
                "learned_patterns",
                guardloop_core::errors::StoreOperation::Write,
                e.to_string(),
            )
        })?;

        info!(patterns_found = learned.len(), days, "pattern analysis complete");
        Ok(learned)
    }

    /// Mine violations within the last `days`, grouped by
    /// `(guardrail_type, rule)`, symmetrically to [`Self::analyze_failures`].
    pub fn analyze_violations(
        &self,
        days: i64,
        guardrail_types: Option<&[String]>,
    ) -> Result<Vec<LearnedPatternRow>, StoreError> {
        let cutoff = days_ago_iso(days);
        let mut conn = self.store.conn()?;
        let violations = ViolationRepository::since(&conn, &cutoff, guardrail_types)?;

        info!(total_violations = violations.len(), days, "analyzing violations");

        let mut groups: BTreeMap<(String, String), Vec<&ViolationRow>> = BTreeMap::new();
        for violation in &violations {
            groups
                .entry((
                    violation.guardrail_type.as_str().to_string(),
                    violation.rule.clone(),
                ))
                .or_default()
                .push(violation);
        }

        let tx = conn.transaction().map_err(|e| {
            StoreError::new(
                "learned_patterns",
                guardloop_core::errors::StoreOperation::Write,
                e.to_string(),
            )
        })?;

        let mut learned = Vec::new();
        for ((gtype, rule), members) in groups {
            let frequency = members.len();
            if frequency < self.min_frequency {
                continue;
            }

            let confidence = (frequency as f64 / 10.0).min(1.0);
            if confidence < self.min_confidence {
                continue;
            }

            let hash = pattern_hash(&gtype, &rule);
            let severity = members
                .iter()
                .map(|v| v.severity)
                .max()
                .unwrap_or(Severity::Low);
            let first_seen = members
                .iter()
                .map(|v| v.timestamp.as_str())
                .min()
                .unwrap_or_default()
                .to_string();
            let last_seen = members
                .iter()
                .map(|v| v.timestamp.as_str())
                .max()
                .unwrap_or_default()
                .to_string();
            let examples: Vec<String> =
                members.iter().map(|v| v.session_id.clone()).take(5).collect();

            let row = if let Some(existing) = PatternRepository::find_by_hash(&tx, &hash)? {
                PatternRepository::update_occurrence(
                    &tx,
                    existing.id,
                    i64::try_from(frequency).unwrap_or(i64::MAX),
                    &last_seen,
                    confidence,
                    &examples,
                )?;
                PatternRepository::get(&tx, existing.id)?.unwrap_or(existing)
            } else {
                let suggestions: Vec<&str> = members
                    .iter()
                    .filter_map(|v| v.suggestion.as_deref())
                    .take(3)
                    .collect();
                let id = PatternRepository::insert(
                    &tx,
                    &NewLearnedPattern {
                        pattern_hash: hash.clone(),
                        category: format!("violation_{gtype}"),
                        signature: format!("{gtype}::{rule}"),
                        description: format!("Repeated violation: {rule}"),
                        frequency: i64::try_from(frequency).unwrap_or(i64::MAX),
                        severity,
                        first_seen,
                        last_seen,
                        confidence,
                        example_sessions: examples,
                        metadata: Some(serde_json::json!({
                            "guardrail_type": gtype,
                            "rule": rule,
                            "common_suggestions": suggestions,
                        })),
                    },
                )?;
                PatternRepository::get(&tx, id)?.ok_or_else(|| {
                    StoreError::new(
                        "learned_patterns",
                        guardloop_core::errors::StoreOperation::Read,
                        "inserted pattern vanished",
                    )
                })?
            };
            learned.push(row);
        }

        tx.commit().map_err(|e| {
            StoreError::new(
                "learned_patterns",
                guardloop_core::errors::StoreOperation::Write,
                e.to_string(),
            )
        })?;

        info!(patterns_found = learned.len(), days, "violation analysis complete");
        Ok(learned)
    }

    /// Most frequent patterns.
    pub fn trending(&self, limit: i64) -> Result<Vec<LearnedPatternRow>, StoreError> {
        let conn = self.store.conn()?;
        PatternRepository::trending(&conn, limit)
    }

    /// High-severity patterns above the analyzer's confidence gate.
    pub fn high_severity(&self, limit: i64) -> Result<Vec<LearnedPatternRow>, StoreError> {
        let conn = self.store.conn()?;
        PatternRepository::high_severity(&conn, self.min_confidence, limit)
    }
}

/// Confidence from frequency and mean severity:
/// `min(freq/10, 0.7) + (avg_rank/4)·0.3`, capped at 1.0.
fn failure_confidence(members: &[&FailureRow]) -> f64 {
    let frequency = members.len() as f64;
    let avg_rank = members
        .iter()
        .map(|f| f64::from(f.severity.rank()))
        .sum::<f64>()
        / members.len() as f64;
    ((frequency / 10.0).min(0.7) + avg_rank / 4.0 * 0.3).min(1.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use guardloop_store::rows::NewFailure;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn seed_failures(store: &Store, category: &str, pattern: &str, severity: Severity, n: usize) {
        let conn = store.conn().unwrap();
        for _ in 0..n {
            FailureRepository::insert(
                &conn,
                &NewFailure {
                    session_id: Some("s1".to_string()),
                    tool: "claude".to_string(),
                    category: category.to_string(),
                    pattern: pattern.to_string(),
                    context: Some("context".to_string()),
                    severity,
                    suggestion: None,
                },
            )
            .unwrap();
        }
    }

    #[test]
    fn hash_is_deterministic_and_hex() {
        let a = pattern_hash("Looping", "stack overflow");
        let b = pattern_hash("Looping", "stack overflow");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, pattern_hash("Looping", "other"));
    }

    #[test]
    fn empty_window_yields_nothing_and_writes_nothing() {
        let (_dir, store) = store();
        let analyzer = PatternAnalyzer::new(store.clone());
        let patterns = analyzer.analyze_failures(30, None).unwrap();
        assert!(patterns.is_empty());
        assert_eq!(store.stats().unwrap().total_patterns, 0);
    }

    #[test]
    fn below_frequency_gate_is_dropped() {
        let (_dir, store) = store();
        seed_failures(&store, "Looping", "stack overflow", Severity::Critical, 2);
        let analyzer = PatternAnalyzer::new(store.clone());
        assert!(analyzer.analyze_failures(30, None).unwrap().is_empty());
    }

    #[test]
    fn frequent_critical_failures_become_a_pattern() {
        let (_dir, store) = store();
        seed_failures(&store, "Looping", "stack overflow", Severity::Critical, 4);
        let analyzer = PatternAnalyzer::new(store.clone());
        let patterns = analyzer.analyze_failures(30, None).unwrap();

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.category, "Looping");
        assert_eq!(p.frequency, 4);
        assert_eq!(p.severity, Severity::Critical);
        // freq 4 → 0.4, severity rank 4 → +0.3
        assert!((p.confidence - 0.7).abs() < 1e-9);
        assert_eq!(p.pattern_hash, pattern_hash("Looping", "stack overflow"));
    }

    #[test]
    fn low_severity_needs_more_frequency() {
        let (_dir, store) = store();
        // 4 low-severity: 0.4 + (1/4)*0.3 = 0.475 < 0.6 → dropped.
        seed_failures(&store, "UI/UX", "button", Severity::Low, 4);
        let analyzer = PatternAnalyzer::new(store.clone());
        assert!(analyzer.analyze_failures(30, None).unwrap().is_empty());
    }

    #[test]
    fn reanalysis_updates_in_place() {
        let (_dir, store) = store();
        seed_failures(&store, "Looping", "stack overflow", Severity::Critical, 4);
        let analyzer = PatternAnalyzer::new(store.clone());
        let _ = analyzer.analyze_failures(30, None).unwrap();

        seed_failures(&store, "Looping", "stack overflow", Severity::Critical, 2);
        let patterns = analyzer.analyze_failures(30, None).unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 6);
        assert_eq!(store.stats().unwrap().total_patterns, 1);
    }

    #[test]
    fn category_filter_restricts_mining() {
        let (_dir, store) = store();
        seed_failures(&store, "Looping", "stack overflow", Severity::Critical, 4);
        seed_failures(&store, "Security", "sql injection", Severity::Critical, 4);
        let analyzer = PatternAnalyzer::new(store.clone());

        let only_looping = analyzer
            .analyze_failures(30, Some(&["Looping".to_string()]))
            .unwrap();
        assert_eq!(only_looping.len(), 1);
        assert_eq!(only_looping[0].category, "Looping");
    }
}
