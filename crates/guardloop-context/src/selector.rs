//! Guardrail file selection under a token budget.
//!
//! Policy markdown is data, never a type: all selection decisions run over
//! an index of `{path, keywords, token_estimate, priority}` records.

use std::collections::BTreeSet;

use tracing::{debug, info};

use guardloop_core::{Complexity, Mode};

use crate::budget::BudgetManager;

/// The mandatory always-loaded file.
pub const ALWAYS_FILE: &str = "core/always.md";

/// Markers that collapse the selection to the mandatory file only.
const CREATIVE_MARKERS: &[&str] = &["creative", "brainstorm", "ideation", "idea"];

struct CatalogueEntry {
    path: &'static str,
    keywords: &'static [&'static str],
    token_estimate: usize,
    /// 1 = mandatory, 2 = other core, 3 = specialized.
    priority: u8,
}

const CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        path: ALWAYS_FILE,
        keywords: &[
            "architecture", "testing", "security", "quality", "documentation", "compliance",
            "workflow", "mandatory", "universal", "required",
        ],
        token_estimate: 354,
        priority: 1,
    },
    CatalogueEntry {
        path: "core/security_baseline.md",
        keywords: &[
            "mfa", "azure", "rbac", "authentication", "authorization", "audit", "security",
            "token", "session", "permission", "access",
        ],
        token_estimate: 168,
        priority: 2,
    },
    CatalogueEntry {
        path: "core/testing_baseline.md",
        keywords: &[
            "test", "coverage", "unit", "e2e", "mock", "assertion", "regression", "integration",
            "testing", "validation",
        ],
        token_estimate: 194,
        priority: 2,
    },
    CatalogueEntry {
        path: "specialized/auth_security.md",
        keywords: &[
            "mfa", "azure", "ad", "active directory", "rbac", "role", "permission", "jwt",
            "session", "oauth", "sso", "saml", "authentication", "login",
        ],
        token_estimate: 312,
        priority: 3,
    },
    CatalogueEntry {
        path: "specialized/database_design.md",
        keywords: &[
            "database", "schema", "table", "migration", "index", "constraint", "foreign key",
            "normalization", "sql", "query", "transaction",
        ],
        token_estimate: 292,
        priority: 3,
    },
    CatalogueEntry {
        path: "specialized/api_patterns.md",
        keywords: &[
            "api", "endpoint", "rest", "http", "request", "response", "json", "get", "post",
            "put", "patch", "delete", "versioning",
        ],
        token_estimate: 412,
        priority: 3,
    },
    CatalogueEntry {
        path: "specialized/ui_accessibility.md",
        keywords: &[
            "ui", "component", "accessibility", "wcag", "aria", "responsive", "mobile",
            "keyboard", "screen reader", "contrast", "semantic",
        ],
        token_estimate: 423,
        priority: 3,
    },
    CatalogueEntry {
        path: "specialized/compliance_gdpr.md",
        keywords: &[
            "gdpr", "privacy", "data protection", "consent", "retention", "erasure",
            "portability", "right to access", "dpo",
        ],
        token_estimate: 405,
        priority: 3,
    },
    CatalogueEntry {
        path: "specialized/deployment_ops.md",
        keywords: &[
            "deployment", "ci/cd", "pipeline", "docker", "kubernetes", "monitoring", "logging",
            "alerting", "health check", "scaling", "backup",
        ],
        token_estimate: 516,
        priority: 3,
    },
];

/// Task keyword → mapped policy files.
const TASK_GUARDRAIL_MAP: &[(&str, &[&str])] = &[
    ("authentication", &[ALWAYS_FILE, "core/security_baseline.md", "specialized/auth_security.md"]),
    ("security", &[ALWAYS_FILE, "core/security_baseline.md", "specialized/auth_security.md"]),
    ("vulnerability", &["core/security_baseline.md", "specialized/auth_security.md"]),
    ("database", &[ALWAYS_FILE, "specialized/database_design.md"]),
    ("schema", &["specialized/database_design.md"]),
    ("migration", &["specialized/database_design.md"]),
    ("api", &[ALWAYS_FILE, "specialized/api_patterns.md"]),
    ("endpoint", &["specialized/api_patterns.md"]),
    ("rest", &["specialized/api_patterns.md"]),
    ("ui", &[ALWAYS_FILE, "specialized/ui_accessibility.md"]),
    ("component", &["specialized/ui_accessibility.md"]),
    ("frontend", &["specialized/ui_accessibility.md"]),
    ("accessibility", &["specialized/ui_accessibility.md"]),
    ("testing", &[ALWAYS_FILE, "core/testing_baseline.md"]),
    ("test", &["core/testing_baseline.md"]),
    ("e2e", &["core/testing_baseline.md"]),
    ("gdpr", &["specialized/compliance_gdpr.md"]),
    ("compliance", &["specialized/compliance_gdpr.md"]),
    ("privacy", &["specialized/compliance_gdpr.md"]),
    ("deployment", &["specialized/deployment_ops.md"]),
    ("ci", &["specialized/deployment_ops.md"]),
    ("cd", &["specialized/deployment_ops.md"]),
    ("docker", &["specialized/deployment_ops.md"]),
    ("creative", &[ALWAYS_FILE]),
    ("brainstorm", &[ALWAYS_FILE]),
    ("ideation", &[ALWAYS_FILE]),
];

fn entry(path: &str) -> Option<&'static CatalogueEntry> {
    CATALOGUE.iter().find(|e| e.path == path)
}

fn token_estimate(path: &str) -> usize {
    entry(path).map_or(500, |e| e.token_estimate)
}

fn priority(path: &str) -> u8 {
    entry(path).map_or(3, |e| e.priority)
}

/// Selects policy files for a request under a token budget.
#[derive(Clone, Copy, Debug, Default)]
pub struct SmartSelector;

impl SmartSelector {
    /// Create a selector over the fixed catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Select policy files for `(task_type, prompt, mode)` under
    /// `token_budget`, ordered by priority.
    #[must_use]
    pub fn select(
        &self,
        task_type: Option<&str>,
        prompt: &str,
        mode: Mode,
        token_budget: usize,
    ) -> Vec<String> {
        let prompt_lower = prompt.to_lowercase();
        let mut selected: BTreeSet<&'static str> = BTreeSet::new();
        let mut total_tokens = 0usize;

        // Step 1: the mandatory file is always in, budget or not.
        let _ = selected.insert(ALWAYS_FILE);
        total_tokens += token_estimate(ALWAYS_FILE);

        debug!(task_type, mode = %mode, token_budget, "starting guardrail selection");

        // Step 2: task-mapped files, budget permitting.
        if let Some(task) = task_type {
            let task_lower = task.to_lowercase();
            if let Some((_, files)) = TASK_GUARDRAIL_MAP.iter().find(|(t, _)| *t == task_lower) {
                for path in *files {
                    if selected.contains(path) {
                        continue;
                    }
                    let tokens = token_estimate(path);
                    if total_tokens + tokens <= token_budget {
                        let _ = selected.insert(path);
                        total_tokens += tokens;
                    }
                }
            }
        }

        // Step 3: keyword matches, best match-count first, cheapest first on
        // ties, added greedily while the budget lasts.
        let mut keyword_matches: Vec<(&'static str, usize, usize)> = CATALOGUE
            .iter()
            .filter(|e| !selected.contains(e.path))
            .filter_map(|e| {
                let matches = e
                    .keywords
                    .iter()
                    .filter(|kw| prompt_lower.contains(*kw))
                    .count();
                (matches > 0).then_some((e.path, matches, e.token_estimate))
            })
            .collect();
        keyword_matches.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        for (path, _, tokens) in keyword_matches {
            if total_tokens + tokens <= token_budget {
                let _ = selected.insert(path);
                total_tokens += tokens;
            }
        }

        // Step 4: strict mode pulls in the remaining core files.
        if mode == Mode::Strict {
            for e in CATALOGUE.iter().filter(|e| e.priority <= 2) {
                if !selected.contains(e.path) && total_tokens + e.token_estimate <= token_budget {
                    let _ = selected.insert(e.path);
                    total_tokens += e.token_estimate;
                }
            }
        }

        // Step 5: creative override resets to the mandatory file only.
        if CREATIVE_MARKERS.iter().any(|m| prompt_lower.contains(m)) && selected.len() > 1 {
            selected = BTreeSet::from([ALWAYS_FILE]);
            total_tokens = token_estimate(ALWAYS_FILE);
            info!("creative task detected - using minimal guardrails");
        }

        let mut ordered: Vec<&'static str> = selected.into_iter().collect();
        ordered.sort_by_key(|path| priority(path));

        info!(
            selected_count = ordered.len(),
            total_tokens,
            budget_usage_percent = if token_budget > 0 {
                (total_tokens as f64 / token_budget as f64 * 100.0 * 10.0).round() / 10.0
            } else {
                0.0
            },
            "guardrail selection complete"
        );

        ordered.into_iter().map(ToString::to_string).collect()
    }

    /// Select with a budget derived from `(model, complexity)` and adjusted
    /// for the mode.
    #[must_use]
    pub fn select_with_model(
        &self,
        task_type: Option<&str>,
        prompt: &str,
        mode: Mode,
        model: &str,
        complexity: Complexity,
    ) -> Vec<String> {
        let budget_manager = BudgetManager::new();
        let budget = budget_manager.adjust_for_mode(budget_manager.get_budget(model, complexity), mode);
        info!(model, complexity = %complexity, mode = %mode, budget, "dynamic budget calculated");
        self.select(task_type, prompt, mode, budget)
    }

    /// Total token estimate for a list of policy files.
    #[must_use]
    pub fn token_estimate(&self, paths: &[String]) -> usize {
        paths.iter().map(|p| token_estimate(p)).sum()
    }

    /// Keyword-based task-type fallback used when no classifier label is
    /// available. Scores each mapped task by keyword overlap with the prompt.
    #[must_use]
    pub fn classify_task_type(&self, prompt: &str) -> Option<String> {
        let prompt_lower = prompt.to_lowercase();
        let mut best: Option<(&str, usize)> = None;

        for (task, files) in TASK_GUARDRAIL_MAP {
            let mut score = 0usize;
            if prompt_lower.contains(task) {
                score += 10;
            }
            for path in *files {
                if let Some(e) = entry(path) {
                    score += e
                        .keywords
                        .iter()
                        .filter(|kw| prompt_lower.contains(*kw))
                        .count();
                }
            }
            if score > 0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((task, score));
            }
        }

        best.map(|(task, _)| task.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> SmartSelector {
        SmartSelector::new()
    }

    #[test]
    fn zero_budget_returns_exactly_the_mandatory_file() {
        let selected = selector().select(None, "implement auth", Mode::Standard, 0);
        assert_eq!(selected, vec![ALWAYS_FILE.to_string()]);
    }

    #[test]
    fn auth_task_pulls_security_files() {
        let selected = selector().select(
            Some("authentication"),
            "add login with mfa",
            Mode::Standard,
            5000,
        );
        assert!(selected.contains(&"core/security_baseline.md".to_string()));
        assert!(selected.contains(&"specialized/auth_security.md".to_string()));
    }

    #[test]
    fn keyword_matches_fill_remaining_budget() {
        let selected = selector().select(None, "write sql schema migrations", Mode::Standard, 5000);
        assert!(selected.contains(&"specialized/database_design.md".to_string()));
    }

    #[test]
    fn strict_mode_adds_all_core_files() {
        let selected = selector().select(None, "hello", Mode::Strict, 5000);
        assert!(selected.contains(&"core/security_baseline.md".to_string()));
        assert!(selected.contains(&"core/testing_baseline.md".to_string()));
    }

    #[test]
    fn creative_marker_overrides_everything() {
        let selected = selector().select(
            Some("authentication"),
            "brainstorm creative auth api test ideas",
            Mode::Strict,
            50_000,
        );
        assert_eq!(selected, vec![ALWAYS_FILE.to_string()]);
    }

    #[test]
    fn result_is_priority_ordered() {
        let selected = selector().select(
            Some("authentication"),
            "auth with database and api",
            Mode::Strict,
            50_000,
        );
        assert_eq!(selected[0], ALWAYS_FILE);
        let priorities: Vec<u8> = selected.iter().map(|p| priority(p)).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn budget_is_respected() {
        // Enough for the always file plus roughly one more.
        let selected = selector().select(None, "auth test database api ui", Mode::Standard, 600);
        assert!(selector().token_estimate(&selected) <= 600);
        assert!(selected.contains(&ALWAYS_FILE.to_string()));
    }

    #[test]
    fn classify_task_type_fallback() {
        let task = selector().classify_task_type("set up the database schema and migration");
        assert_eq!(task.as_deref(), Some("database"));
        assert_eq!(selector().classify_task_type("zzz qqq"), None);
    }

    #[test]
    fn dynamic_budget_path_selects() {
        let selected = selector().select_with_model(
            Some("api"),
            "build the api endpoint",
            Mode::Standard,
            "claude-sonnet-4",
            Complexity::Medium,
        );
        assert!(selected.contains(&"specialized/api_patterns.md".to_string()));
    }
}
