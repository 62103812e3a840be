//! Dynamic guardrail lifecycle and retrieval.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use guardloop_core::errors::StoreError;
use guardloop_core::{EnforcementMode, RuleStatus, TaskType};
use guardloop_context::{DynamicRuleSource, SemanticMatcher};
use guardloop_store::repos::{EffectivenessRepository, RuleRepository};
use guardloop_store::rows::{DynamicGuardrailRow, LearnedPatternRow, NewDynamicGuardrail};
use guardloop_store::{today_date, Store};

/// Similarity floor for the semantic retrieval path.
const SEMANTIC_THRESHOLD: f32 = 0.3;

/// Category → prompt keywords used by the keyword relevance fallback.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("security", &["auth", "security", "token", "permission", "access"]),
    ("performance", &["slow", "optimize", "performance", "speed", "cache"]),
    ("quality", &["bug", "error", "fix", "quality", "test"]),
    ("architecture", &["design", "architecture", "pattern", "structure"]),
];

/// Mints, retrieves, promotes, and retires dynamic guardrails.
pub struct AdaptiveGuardrailManager {
    store: Store,
    matcher: Arc<SemanticMatcher>,
    confidence_threshold: f64,
}

impl std::fmt::Debug for AdaptiveGuardrailManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveGuardrailManager")
            .field("confidence_threshold", &self.confidence_threshold)
            .field("semantic_available", &self.matcher.available())
            .finish()
    }
}

impl AdaptiveGuardrailManager {
    /// Manager with the default 0.7 minting threshold and no embedder.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self::with_matcher(store, Arc::new(SemanticMatcher::disabled()))
    }

    /// Manager over a semantic matcher (which may itself be disabled).
    #[must_use]
    pub fn with_matcher(store: Store, matcher: Arc<SemanticMatcher>) -> Self {
        Self {
            store,
            matcher,
            confidence_threshold: 0.7,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Minting
    // ─────────────────────────────────────────────────────────────────────

    /// Mint a guardrail from a learned pattern.
    ///
    /// Low-confidence patterns yield `None`; a pattern with a live rule
    /// returns that rule instead of minting a duplicate.
    pub fn generate_from_pattern(
        &self,
        pattern: &LearnedPatternRow,
        task_types: Option<Vec<TaskType>>,
    ) -> Result<Option<DynamicGuardrailRow>, StoreError> {
        if pattern.confidence < self.confidence_threshold {
            debug!(
                pattern_id = pattern.id,
                confidence = pattern.confidence,
                "pattern confidence too low"
            );
            return Ok(None);
        }

        let conn = self.store.conn()?;
        if let Some(existing) = RuleRepository::find_live_for_pattern(&conn, pattern.id)? {
            debug!(pattern_id = pattern.id, rule_id = existing.id, "guardrail already exists");
            return Ok(Some(existing));
        }

        let rule_text = derive_rule_text(&pattern.description);
        let enforcement_mode = EnforcementMode::from_severity(pattern.severity);
        let task_types = task_types.unwrap_or_else(|| vec![TaskType::Code, TaskType::Mixed]);

        let id = RuleRepository::insert(
            &conn,
            &NewDynamicGuardrail {
                pattern_id: pattern.id,
                rule_text,
                category: pattern.category.clone(),
                confidence: pattern.confidence,
                enforcement_mode,
                task_types,
                created_by: "pattern_analyzer".to_string(),
                metadata: Some(serde_json::json!({
                    "pattern_hash": pattern.pattern_hash,
                    "frequency": pattern.frequency,
                    "severity": pattern.severity.as_str(),
                })),
            },
        )?;

        info!(
            rule_id = id,
            pattern_id = pattern.id,
            enforcement = %enforcement_mode,
            "dynamic guardrail created"
        );

        RuleRepository::get(&conn, id)
    }

    /// Mint guardrails for a batch of patterns.
    pub fn generate_from_patterns(
        &self,
        patterns: &[LearnedPatternRow],
        task_types: Option<Vec<TaskType>>,
    ) -> Result<Vec<DynamicGuardrailRow>, StoreError> {
        let mut rules = Vec::new();
        for pattern in patterns {
            if let Some(rule) = self.generate_from_pattern(pattern, task_types.clone())? {
                rules.push(rule);
            }
        }
        info!(
            total_patterns = patterns.len(),
            guardrails_created = rules.len(),
            "batch guardrail generation complete"
        );
        Ok(rules)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Retrieval
    // ─────────────────────────────────────────────────────────────────────

    /// Active rules for context injection, ranked by relevance.
    ///
    /// Filters to `validated`/`enforced`, live, above `min_confidence`, with
    /// task overlap. When semantic matching is requested and available the
    /// matcher acts as a *filter* (top-k above similarity 0.3); otherwise a
    /// keyword relevance score feeds the composite priority ordering.
    pub fn get_active(
        &self,
        task_type: Option<TaskType>,
        min_confidence: f64,
        prompt: Option<&str>,
        max_rules: usize,
        use_semantic: bool,
    ) -> Result<Vec<DynamicGuardrailRow>, StoreError> {
        let conn = self.store.conn()?;
        let mut rules = RuleRepository::active(&conn, min_confidence)?;

        if let Some(task) = task_type {
            rules.retain(|r| r.task_types.contains(&task));
        }

        if let Some(prompt) = prompt.filter(|p| !p.is_empty()) {
            if use_semantic && self.matcher.available() && !rules.is_empty() {
                let candidates: Vec<(i64, String)> =
                    rules.iter().map(|r| (r.id, r.rule_text.clone())).collect();
                let matched =
                    self.matcher
                        .find_relevant(prompt, &candidates, max_rules, SEMANTIC_THRESHOLD);
                let order: Vec<i64> = matched.iter().map(|(id, _)| *id).collect();
                rules.retain(|r| order.contains(&r.id));
                rules.sort_by_key(|r| order.iter().position(|id| *id == r.id));
                info!(matched = rules.len(), "semantic matching applied");
            } else {
                let task = task_type;
                rules.sort_by(|a, b| {
                    self.priority_score(b, prompt, task)
                        .partial_cmp(&self.priority_score(a, prompt, task))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.id.cmp(&b.id))
                });
                rules.truncate(max_rules);
            }
        } else {
            rules.truncate(max_rules);
        }

        debug!(
            count = rules.len(),
            min_confidence,
            max_rules,
            semantic = use_semantic,
            "retrieved active guardrails"
        );
        Ok(rules)
    }

    /// Composite retrieval priority:
    /// `relevance·2 + confidence·2 + recency + success_rate·2 + task_match
    /// + mode_weight`.
    fn priority_score(
        &self,
        rule: &DynamicGuardrailRow,
        prompt: &str,
        task_type: Option<TaskType>,
    ) -> f64 {
        let mut score = keyword_relevance(rule, prompt) * 2.0;
        score += rule.confidence * 2.0;

        if let Some(activated) = rule
            .activated_at
            .as_deref()
            .and_then(|t| t.parse::<DateTime<Utc>>().ok())
        {
            let days = (Utc::now() - activated).num_days() as f64;
            score += (1.0 - days / 30.0).max(0.0);
        }

        if let Ok(conn) = self.store.conn() {
            if let Ok(totals) = EffectivenessRepository::totals(&conn, rule.id) {
                if totals.times_triggered > 0 {
                    score += totals.success_rate().max(0.0) * 2.0;
                }
            }
        }

        if task_type.is_some_and(|t| rule.task_types.contains(&t)) {
            score += 1.0;
        }

        score += rule.enforcement_mode.priority_weight();
        score
    }

    /// Render rules for LLM context injection.
    #[must_use]
    pub fn format_for_context(&self, rules: &[DynamicGuardrailRow]) -> String {
        if rules.is_empty() {
            return String::new();
        }

        let mut by_category: BTreeMap<&str, Vec<&DynamicGuardrailRow>> = BTreeMap::new();
        for rule in rules {
            by_category.entry(&rule.category).or_default().push(rule);
        }

        let mut lines = vec!["# Learned Guardrails - DO NOT REPEAT THESE MISTAKES\n".to_string()];
        for (category, rules) in by_category {
            lines.push(format!("\n## {}\n", title_case(category)));
            for rule in rules {
                lines.push(format!("- **{}**", rule.rule_text));
                match rule.enforcement_mode {
                    EnforcementMode::Block => {
                        lines.push("  - BLOCKING: This will be rejected".to_string());
                    }
                    EnforcementMode::AutoFix => {
                        lines.push("  - AUTO-FIX: Will be automatically corrected".to_string());
                    }
                    EnforcementMode::Warn => {}
                }
                lines.push(format!("  - Confidence: {:.0}%", rule.confidence * 100.0));
                lines.push(String::new());
            }
        }
        lines.join("\n")
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// `trial → validated`. Returns false on any illegal transition.
    pub fn promote_to_validated(&self, rule_id: i64) -> bool {
        self.transition(rule_id, RuleStatus::Validated, None)
    }

    /// `validated → enforced`; upgrades enforcement to `block`.
    pub fn promote_to_enforced(&self, rule_id: i64) -> bool {
        self.transition(rule_id, RuleStatus::Enforced, None)
    }

    /// Terminal deprecation from any live state; stamps `deactivated_at`.
    pub fn deprecate(&self, rule_id: i64, reason: &str) -> bool {
        self.transition(rule_id, RuleStatus::Deprecated, Some(reason))
    }

    fn transition(&self, rule_id: i64, next: RuleStatus, reason: Option<&str>) -> bool {
        let Ok(conn) = self.store.conn() else {
            return false;
        };
        let current = match RuleRepository::get(&conn, rule_id) {
            Ok(Some(rule)) => rule.status,
            Ok(None) => return false,
            Err(e) => {
                warn!(rule_id, error = %e, "lifecycle read failed");
                return false;
            }
        };
        if !current.can_transition(next) {
            return false;
        }
        match RuleRepository::set_status(&conn, rule_id, next, reason) {
            Ok(()) => {
                info!(rule_id, from = %current, to = %next, "rule transitioned");
                true
            }
            Err(e) => {
                warn!(rule_id, error = %e, "lifecycle write failed");
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Effectiveness
    // ─────────────────────────────────────────────────────────────────────

    /// Record one trigger in today's effectiveness rollup.
    pub fn track_effectiveness(
        &self,
        rule_id: i64,
        prevented_failure: bool,
        false_positive: bool,
        true_positive: bool,
    ) -> Result<(), StoreError> {
        let conn = self.store.conn()?;
        let confidence = RuleRepository::get(&conn, rule_id)?
            .map_or(0.0, |r| r.confidence);
        EffectivenessRepository::record_trigger(
            &conn,
            rule_id,
            &today_date(),
            prevented_failure,
            false_positive,
            true_positive,
            confidence,
        )
    }
}

impl DynamicRuleSource for AdaptiveGuardrailManager {
    fn rules_for_context(
        &self,
        task_type: TaskType,
        prompt: &str,
        max_rules: usize,
    ) -> Option<String> {
        let rules = self
            .get_active(
                Some(task_type),
                0.7,
                Some(prompt),
                max_rules,
                self.matcher.available(),
            )
            .map_err(|e| warn!(error = %e, "failed to load dynamic guardrails"))
            .ok()?;
        if rules.is_empty() {
            return None;
        }
        Some(self.format_for_context(&rules))
    }
}

/// Rule-text template over the pattern description.
fn derive_rule_text(description: &str) -> String {
    let lower = description.to_lowercase();
    if lower.contains("missing") {
        format!("MUST include: {description}")
    } else if lower.contains("forgot") || lower.contains("omit") {
        format!("DO NOT forget: {description}")
    } else if lower.contains("incorrect") || lower.contains("wrong") {
        format!("AVOID: {description}")
    } else {
        format!("LEARNED: {description}")
    }
}

/// Keyword overlap relevance: rule-text word overlap plus category keyword
/// matches, each component capped at 1.0.
fn keyword_relevance(rule: &DynamicGuardrailRow, prompt: &str) -> f64 {
    let prompt_lower = prompt.to_lowercase();
    let prompt_words: std::collections::HashSet<&str> = prompt_lower.split_whitespace().collect();
    let rule_lower = rule.rule_text.to_lowercase();
    let rule_words: std::collections::HashSet<&str> = rule_lower.split_whitespace().collect();

    let overlap = rule_words.intersection(&prompt_words).count();
    let mut relevance = (overlap as f64 * 0.2).min(1.0);

    if let Some((_, keywords)) = CATEGORY_KEYWORDS
        .iter()
        .find(|(category, _)| rule.category.to_lowercase().contains(category))
    {
        let matches = keywords.iter().filter(|kw| prompt_lower.contains(*kw)).count();
        if matches > 0 {
            relevance += (matches as f64 * 0.3).min(1.0);
        }
    }

    relevance
}

fn title_case(text: &str) -> String {
    text.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use guardloop_core::Severity;
    use guardloop_store::repos::PatternRepository;
    use guardloop_store::rows::NewLearnedPattern;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn seed_pattern(store: &Store, confidence: f64, severity: Severity) -> LearnedPatternRow {
        let conn = store.conn().unwrap();
        let id = PatternRepository::insert(
            &conn,
            &NewLearnedPattern {
                pattern_hash: format!("hash-{confidence}-{severity}"),
                category: "Security".to_string(),
                signature: "Security::missing input sanitisation".to_string(),
                description: "Security: missing input sanitisation (seen 5 times)".to_string(),
                frequency: 5,
                severity,
                first_seen: "2026-07-01T00:00:00Z".to_string(),
                last_seen: "2026-07-20T00:00:00Z".to_string(),
                confidence,
                example_sessions: vec!["s1".to_string()],
                metadata: None,
            },
        )
        .unwrap();
        PatternRepository::get(&conn, id).unwrap().unwrap()
    }

    #[test]
    fn low_confidence_pattern_mints_nothing() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.5, Severity::High);
        assert!(manager.generate_from_pattern(&pattern, None).unwrap().is_none());
    }

    #[test]
    fn minting_follows_the_severity_table() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.75, Severity::High);

        let rule = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();
        assert_eq!(rule.status, RuleStatus::Trial);
        assert_eq!(rule.enforcement_mode, EnforcementMode::AutoFix);
        assert_eq!(rule.task_types, vec![TaskType::Code, TaskType::Mixed]);
        assert!(rule.rule_text.starts_with("MUST include:"));
    }

    #[test]
    fn duplicate_minting_returns_the_live_rule() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.75, Severity::High);

        let first = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();
        let second = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.stats().unwrap().total_dynamic_guardrails, 1);
    }

    #[test]
    fn lifecycle_promotion_happy_path() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.75, Severity::High);
        let rule = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();

        assert!(manager.promote_to_validated(rule.id));
        assert!(manager.promote_to_enforced(rule.id));

        let conn = store.conn().unwrap();
        let row = RuleRepository::get(&conn, rule.id).unwrap().unwrap();
        assert_eq!(row.status, RuleStatus::Enforced);
        assert_eq!(row.enforcement_mode, EnforcementMode::Block);

        // Repeated promotion is illegal.
        assert!(!manager.promote_to_enforced(rule.id));
    }

    #[test]
    fn skipping_validated_is_illegal() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.75, Severity::High);
        let rule = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();

        assert!(!manager.promote_to_enforced(rule.id));
        assert!(!manager.promote_to_validated(-1));
    }

    #[test]
    fn deprecated_rules_never_come_back() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.75, Severity::High);
        let rule = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();

        assert!(manager.promote_to_validated(rule.id));
        assert!(manager.deprecate(rule.id, "low_effectiveness"));
        assert!(!manager.promote_to_validated(rule.id));
        assert!(!manager.deprecate(rule.id, "again"));

        let active = manager.get_active(None, 0.0, None, 10, false).unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn get_active_filters_by_task_type() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.75, Severity::High);
        let rule = manager
            .generate_from_pattern(&pattern, Some(vec![TaskType::Code]))
            .unwrap()
            .unwrap();
        assert!(manager.promote_to_validated(rule.id));

        let for_code = manager
            .get_active(Some(TaskType::Code), 0.6, None, 10, false)
            .unwrap();
        assert_eq!(for_code.len(), 1);

        let for_mixed = manager
            .get_active(Some(TaskType::Mixed), 0.6, None, 10, false)
            .unwrap();
        assert!(for_mixed.is_empty());
    }

    #[test]
    fn keyword_ranking_prefers_relevant_rules() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());

        let security = seed_pattern(&store, 0.8, Severity::High);
        let rule_a = manager.generate_from_pattern(&security, None).unwrap().unwrap();
        assert!(manager.promote_to_validated(rule_a.id));

        let unrelated = {
            let conn = store.conn().unwrap();
            let id = PatternRepository::insert(
                &conn,
                &NewLearnedPattern {
                    pattern_hash: "other-hash".to_string(),
                    category: "Deployment".to_string(),
                    signature: "Deployment::rollback".to_string(),
                    description: "Deployment rollback drill".to_string(),
                    frequency: 5,
                    severity: Severity::High,
                    first_seen: "2026-07-01T00:00:00Z".to_string(),
                    last_seen: "2026-07-20T00:00:00Z".to_string(),
                    confidence: 0.8,
                    example_sessions: vec![],
                    metadata: None,
                },
            )
            .unwrap();
            PatternRepository::get(&conn, id).unwrap().unwrap()
        };
        let rule_b = manager.generate_from_pattern(&unrelated, None).unwrap().unwrap();
        assert!(manager.promote_to_validated(rule_b.id));

        let ranked = manager
            .get_active(None, 0.6, Some("sanitise auth token input"), 1, false)
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, rule_a.id);
    }

    #[test]
    fn formatting_groups_and_annotates() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.9, Severity::Critical);
        let rule = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();

        let text = manager.format_for_context(&[rule]);
        assert!(text.starts_with("# Learned Guardrails - DO NOT REPEAT THESE MISTAKES"));
        assert!(text.contains("## Security"));
        assert!(text.contains("BLOCKING"));
        assert!(text.contains("Confidence: 90%"));
        assert!(manager.format_for_context(&[]).is_empty());
    }

    #[test]
    fn effectiveness_tracking_accumulates() {
        let (_dir, store) = store();
        let manager = AdaptiveGuardrailManager::new(store.clone());
        let pattern = seed_pattern(&store, 0.75, Severity::High);
        let rule = manager.generate_from_pattern(&pattern, None).unwrap().unwrap();

        manager.track_effectiveness(rule.id, true, false, true).unwrap();
        manager.track_effectiveness(rule.id, false, true, false).unwrap();

        let conn = store.conn().unwrap();
        let totals = EffectivenessRepository::totals(&conn, rule.id).unwrap();
        assert_eq!(totals.times_triggered, 2);
        assert_eq!(totals.prevented_failures, 1);
        assert_eq!(totals.false_positives, 1);
    }

    #[test]
    fn rule_text_templates() {
        assert!(derive_rule_text("missing unit tests").starts_with("MUST include:"));
        assert!(derive_rule_text("forgot to close handles").starts_with("DO NOT forget:"));
        assert!(derive_rule_text("incorrect null handling").starts_with("AVOID:"));
        assert!(derive_rule_text("leans on eval").starts_with("LEARNED:"));
    }
}
