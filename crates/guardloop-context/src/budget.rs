//! Dynamic context budgets by model, complexity, and mode.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use guardloop_core::{estimate_tokens, Complexity, Mode};

/// Model base budgets in tokens. Unrecognised models use `default`.
const MODEL_BUDGETS: &[(&str, usize)] = &[
    ("claude-opus-4", 10_000),
    ("claude-sonnet-4", 6_000),
    ("claude-haiku", 4_000),
    ("gpt-4", 4_000),
    ("gpt-4-turbo", 8_000),
    ("gpt-3.5-turbo", 2_000),
    ("gemini-pro", 5_000),
    ("gemini-ultra", 8_000),
    ("default", 5_000),
];

/// Allocation ratios; must sum to 1.0.
const CORE_RATIO: f64 = 0.3;
const AGENTS_RATIO: f64 = 0.4;
const SPECIALIZED_RATIO: f64 = 0.2;
const LEARNED_RATIO: f64 = 0.1;

/// A budget split across guardrail categories.
///
/// Integer allocation; the rounding remainder lands in `core` so the parts
/// always sum to the input exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Allocation {
    /// Core guardrails (always applicable).
    pub core: usize,
    /// Agent-specific rules.
    pub agents: usize,
    /// Task-specific guardrails.
    pub specialized: usize,
    /// Dynamic learned rules.
    pub learned: usize,
}

impl Allocation {
    /// Total tokens across all categories.
    #[must_use]
    pub fn total(&self) -> usize {
        self.core + self.agents + self.specialized + self.learned
    }
}

/// Per-model budget report.
#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    /// The name as supplied.
    pub model: String,
    /// The normalised catalogue key.
    pub normalized_name: String,
    /// The model's base budget.
    pub base_budget: usize,
    /// Budget at each complexity level.
    pub complexity_budgets: BTreeMap<String, usize>,
}

/// Computes token budgets for context assembly.
#[derive(Clone, Copy, Debug, Default)]
pub struct BudgetManager;

impl BudgetManager {
    /// Create a budget manager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Budget for a model at a task complexity: `⌊base · multiplier⌋`.
    #[must_use]
    pub fn get_budget(&self, model: &str, complexity: Complexity) -> usize {
        let key = normalize_model_name(model);
        let base = budget_for_key(key);
        let budget = (base as f64 * complexity.multiplier()) as usize;
        debug!(
            model,
            model_key = key,
            complexity = %complexity,
            base_budget = base,
            final_budget = budget,
            "budget calculated"
        );
        budget
    }

    /// Split a total budget across the four guardrail categories.
    #[must_use]
    pub fn allocate(&self, total_budget: usize) -> Allocation {
        let core = (total_budget as f64 * CORE_RATIO) as usize;
        let agents = (total_budget as f64 * AGENTS_RATIO) as usize;
        let specialized = (total_budget as f64 * SPECIALIZED_RATIO) as usize;
        let learned = (total_budget as f64 * LEARNED_RATIO) as usize;

        let mut allocation = Allocation {
            core,
            agents,
            specialized,
            learned,
        };
        // Rounding remainder goes to core, the most important slice.
        allocation.core += total_budget - allocation.total();
        allocation
    }

    /// Strict mode gets 30% more room for the extra validation content.
    #[must_use]
    pub fn adjust_for_mode(&self, budget: usize, mode: Mode) -> usize {
        match mode {
            Mode::Strict => (budget as f64 * 1.3) as usize,
            Mode::Standard => budget,
        }
    }

    /// Whether an allocation fits inside a total budget.
    #[must_use]
    pub fn validate_allocation(&self, allocation: &Allocation, total_budget: usize) -> bool {
        let allocated = allocation.total();
        if allocated > total_budget {
            warn!(
                allocated,
                budget = total_budget,
                excess = allocated - total_budget,
                "allocation exceeds budget"
            );
            return false;
        }
        true
    }

    /// Fallback token estimate (`chars / 4`).
    #[must_use]
    pub fn estimate_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    /// Budget report for a model across all complexities.
    #[must_use]
    pub fn model_info(&self, model: &str) -> ModelInfo {
        let normalized = normalize_model_name(model);
        let base = budget_for_key(normalized);
        let mut complexity_budgets = BTreeMap::new();
        for complexity in [
            Complexity::Simple,
            Complexity::Medium,
            Complexity::Complex,
            Complexity::Critical,
        ] {
            let _ = complexity_budgets.insert(
                complexity.as_str().to_string(),
                (base as f64 * complexity.multiplier()) as usize,
            );
        }
        ModelInfo {
            model: model.to_string(),
            normalized_name: normalized.to_string(),
            base_budget: base,
            complexity_budgets,
        }
    }
}

fn budget_for_key(key: &str) -> usize {
    MODEL_BUDGETS
        .iter()
        .find(|(name, _)| *name == key)
        .map_or(5_000, |(_, budget)| *budget)
}

/// Fuzzy mapping of raw model names (any casing, aliases) onto the closed
/// catalogue key set.
fn normalize_model_name(model: &str) -> &'static str {
    let lower = model.to_lowercase();
    if lower.contains("opus") {
        "claude-opus-4"
    } else if lower.contains("sonnet") {
        "claude-sonnet-4"
    } else if lower.contains("haiku") {
        "claude-haiku"
    } else if lower.contains("gpt-4-turbo") || lower.contains("gpt-4-1106") {
        "gpt-4-turbo"
    } else if lower.contains("gpt-4") {
        "gpt-4"
    } else if lower.contains("gpt-3.5") || lower.contains("gpt-35") {
        "gpt-3.5-turbo"
    } else if lower.contains("gemini-ultra") {
        "gemini-ultra"
    } else if lower.contains("gemini") {
        "gemini-pro"
    } else {
        warn!(model, "unknown model, using default budget");
        "default"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manager() -> BudgetManager {
        BudgetManager::new()
    }

    #[test]
    fn sonnet_medium_is_3600() {
        assert_eq!(
            manager().get_budget("claude-sonnet-4", Complexity::Medium),
            3600
        );
    }

    #[test]
    fn aliases_normalise_any_casing() {
        assert_eq!(manager().get_budget("Claude-OPUS-4.1", Complexity::Critical), 10_000);
        assert_eq!(manager().get_budget("gpt-4-1106-preview", Complexity::Critical), 8_000);
        assert_eq!(manager().get_budget("gemini-2.0-flash", Complexity::Critical), 5_000);
    }

    #[test]
    fn unknown_model_uses_default() {
        assert_eq!(manager().get_budget("mystery-llm", Complexity::Critical), 5_000);
    }

    #[test]
    fn allocation_round_trips_the_spec_example() {
        let budget = manager().get_budget("claude-sonnet-4", Complexity::Medium);
        let allocation = manager().allocate(budget);
        assert_eq!(
            allocation,
            Allocation {
                core: 1080,
                agents: 1440,
                specialized: 720,
                learned: 360,
            }
        );
        assert_eq!(allocation.total(), 3600);
    }

    #[test]
    fn strict_mode_adds_thirty_percent() {
        assert_eq!(manager().adjust_for_mode(1000, Mode::Strict), 1300);
        assert_eq!(manager().adjust_for_mode(1000, Mode::Standard), 1000);
    }

    #[test]
    fn validate_allocation_flags_excess() {
        let allocation = Allocation {
            core: 600,
            agents: 400,
            specialized: 100,
            learned: 0,
        };
        assert!(!manager().validate_allocation(&allocation, 1000));
        assert!(manager().validate_allocation(&allocation, 1100));
    }

    #[test]
    fn model_info_lists_all_complexities() {
        let info = manager().model_info("claude-haiku");
        assert_eq!(info.base_budget, 4000);
        assert_eq!(info.complexity_budgets["simple"], 1200);
        assert_eq!(info.complexity_budgets["critical"], 4000);
    }

    proptest! {
        // Allocation always sums exactly, with each slice at least its floor.
        #[test]
        fn allocation_sums_exactly(total in 0usize..100_000) {
            let allocation = manager().allocate(total);
            prop_assert_eq!(allocation.total(), total);
            prop_assert!(allocation.agents >= (total as f64 * AGENTS_RATIO) as usize);
            prop_assert!(allocation.specialized >= (total as f64 * SPECIALIZED_RATIO) as usize);
            prop_assert!(allocation.learned >= (total as f64 * LEARNED_RATIO) as usize);
            prop_assert!(allocation.core >= (total as f64 * CORE_RATIO) as usize);
        }
    }
}
