//! Agent chain optimisation.
//!
//! A static task table maps task types onto minimal ordered reviewer
//! chains; strict mode injects the compliance reviewers; complexity falls
//! out of the chain length.

use tracing::{debug, info};

use guardloop_core::{Complexity, Mode};

/// Chain used for tasks with no table entry.
const DEFAULT_CHAIN: &[&str] = &["architect", "coder", "tester"];

/// Task type → ordered reviewer chain.
const TASK_AGENT_CHAINS: &[(&str, &[&str])] = &[
    // Simple tasks - single agent
    ("fix_typo", &["standards_oracle"]),
    ("update_docs", &["documentation"]),
    ("format_code", &["standards_oracle"]),
    // Medium tasks - focused chain
    ("implement_function", &["architect", "coder", "tester"]),
    ("add_tests", &["tester"]),
    ("fix_bug", &["debug_hunter", "tester"]),
    ("refactor", &["architect", "coder", "tester"]),
    // Complex tasks - extended chain
    (
        "implement_feature",
        &["business_analyst", "architect", "coder", "tester", "evaluator"],
    ),
    (
        "implement_auth",
        &["architect", "secops", "coder", "tester", "evaluator"],
    ),
    ("database_design", &["architect", "dba", "coder", "tester"]),
    // Critical tasks - full chain + compliance
    (
        "build_auth_system",
        &[
            "business_analyst",
            "architect",
            "secops",
            "dba",
            "coder",
            "tester",
            "sre",
            "standards_oracle",
            "evaluator",
        ],
    ),
    (
        "implement_payment",
        &[
            "business_analyst",
            "architect",
            "secops",
            "dba",
            "coder",
            "tester",
            "standards_oracle",
            "sre",
            "evaluator",
        ],
    ),
    (
        "compliance_feature",
        &[
            "business_analyst",
            "architect",
            "secops",
            "coder",
            "tester",
            "standards_oracle",
            "evaluator",
            "documentation",
        ],
    ),
    // UI/UX tasks
    ("implement_ui", &["ux_designer", "coder", "tester"]),
    ("improve_accessibility", &["ux_designer", "coder", "tester"]),
    // API tasks
    ("implement_api", &["architect", "coder", "tester"]),
    ("api_security", &["architect", "secops", "coder", "tester"]),
];

/// Selects the minimal ordered reviewer chain for a task.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainOptimizer;

impl ChainOptimizer {
    /// Create a chain optimizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Select the chain for `(task_type, mode)`.
    ///
    /// A user-specified agent bypasses the table entirely; strict mode
    /// injects `secops` before the first coder/tester, then appends
    /// `standards_oracle` and `evaluator`. Duplicates are removed keeping
    /// the first occurrence.
    #[must_use]
    pub fn select_chain(
        &self,
        task_type: &str,
        mode: Mode,
        user_specified: Option<&str>,
    ) -> Vec<String> {
        if let Some(agent) = user_specified {
            let normalised = normalise(agent);
            info!(agent = %normalised, "using user-specified agent");
            return vec![normalised];
        }

        let mut chain: Vec<String> = base_chain(task_type)
            .iter()
            .map(ToString::to_string)
            .collect();

        if mode == Mode::Strict {
            chain = add_strict_agents(chain);
        }

        // Deduplicate, preserving first occurrence.
        let mut unique = Vec::new();
        for agent in chain {
            if !unique.contains(&agent) {
                unique.push(agent);
            }
        }

        info!(
            task_type,
            mode = %mode,
            chain_length = unique.len(),
            complexity = %self.complexity(task_type),
            "agent chain selected"
        );

        unique
    }

    /// Complexity derived from the base chain length:
    /// `≤2 simple; 3–5 medium; 6–8 complex; ≥9 critical`.
    #[must_use]
    pub fn complexity(&self, task_type: &str) -> Complexity {
        let complexity = match base_chain(task_type).len() {
            0..=2 => Complexity::Simple,
            3..=5 => Complexity::Medium,
            6..=8 => Complexity::Complex,
            _ => Complexity::Critical,
        };
        debug!(task_type, complexity = %complexity, "task complexity determined");
        complexity
    }

    /// All task types the table knows.
    #[must_use]
    pub fn task_types(&self) -> Vec<&'static str> {
        TASK_AGENT_CHAINS.iter().map(|(task, _)| *task).collect()
    }

    /// Rough wall-clock estimate: 30 seconds per reviewer, 30% more in
    /// strict mode.
    #[must_use]
    pub fn estimate_execution_secs(&self, task_type: &str, mode: Mode) -> f64 {
        let base = self.select_chain(task_type, mode, None).len() as f64 * 30.0;
        match mode {
            Mode::Strict => base * 1.3,
            Mode::Standard => base,
        }
    }
}

fn base_chain(task_type: &str) -> &'static [&'static str] {
    TASK_AGENT_CHAINS
        .iter()
        .find(|(task, _)| *task == task_type)
        .map_or(DEFAULT_CHAIN, |(_, chain)| chain)
}

fn add_strict_agents(chain: Vec<String>) -> Vec<String> {
    let mut strict = chain;

    if !strict.iter().any(|a| a == "secops") {
        let insert_at = strict
            .iter()
            .position(|a| a == "coder" || a == "tester")
            .unwrap_or(strict.len());
        strict.insert(insert_at, "secops".to_string());
    }
    if !strict.iter().any(|a| a == "standards_oracle") {
        strict.push("standards_oracle".to_string());
    }
    if !strict.iter().any(|a| a == "evaluator") {
        strict.push("evaluator".to_string());
    }

    strict
}

fn normalise(agent: &str) -> String {
    agent.trim().to_lowercase().replace('-', "_")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer() -> ChainOptimizer {
        ChainOptimizer::new()
    }

    #[test]
    fn user_specified_agent_wins() {
        let chain = optimizer().select_chain("build_auth_system", Mode::Strict, Some("Debug-Hunter"));
        assert_eq!(chain, vec!["debug_hunter".to_string()]);
    }

    #[test]
    fn unknown_task_uses_default_chain() {
        let chain = optimizer().select_chain("mystery_task", Mode::Standard, None);
        assert_eq!(chain, vec!["architect", "coder", "tester"]);
    }

    #[test]
    fn strict_mode_always_has_compliance_agents() {
        for task in optimizer()
            .task_types()
            .into_iter()
            .chain(std::iter::once("unknown_task"))
        {
            let chain = optimizer().select_chain(task, Mode::Strict, None);
            for required in ["secops", "standards_oracle", "evaluator"] {
                assert!(
                    chain.iter().any(|a| a == required),
                    "{task}: missing {required} in {chain:?}"
                );
            }
        }
    }

    #[test]
    fn secops_is_inserted_before_coder() {
        let chain = optimizer().select_chain("implement_function", Mode::Strict, None);
        let secops = chain.iter().position(|a| a == "secops").unwrap();
        let coder = chain.iter().position(|a| a == "coder").unwrap();
        assert!(secops < coder);
    }

    #[test]
    fn chains_have_no_duplicates() {
        for task in optimizer().task_types() {
            let chain = optimizer().select_chain(task, Mode::Strict, None);
            let mut deduped = chain.clone();
            deduped.dedup();
            let unique: std::collections::HashSet<&String> = chain.iter().collect();
            assert_eq!(unique.len(), chain.len(), "{task}: {chain:?}");
        }
    }

    #[test]
    fn complexity_bands() {
        assert_eq!(optimizer().complexity("fix_typo"), Complexity::Simple);
        assert_eq!(optimizer().complexity("fix_bug"), Complexity::Simple);
        assert_eq!(optimizer().complexity("implement_function"), Complexity::Medium);
        assert_eq!(optimizer().complexity("implement_auth"), Complexity::Medium);
        assert_eq!(optimizer().complexity("compliance_feature"), Complexity::Complex);
        assert_eq!(optimizer().complexity("build_auth_system"), Complexity::Critical);
    }

    #[test]
    fn unknown_task_is_medium() {
        assert_eq!(optimizer().complexity("whatever"), Complexity::Medium);
    }

    #[test]
    fn strict_estimate_is_longer() {
        let standard = optimizer().estimate_execution_secs("implement_function", Mode::Standard);
        let strict = optimizer().estimate_execution_secs("implement_function", Mode::Strict);
        assert!(strict > standard);
    }
}
