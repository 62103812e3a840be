//! Sequential chain execution and auto-routing.

use tracing::{info, warn};

use guardloop_core::Mode;

use crate::chain::ChainOptimizer;
use crate::roster::reviewer;
use crate::types::{AgentContext, AgentDecision};

/// Prompt keyword → starting reviewer, used when the request says `auto`.
const ROUTING_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "business_analyst",
        &["requirements", "feature", "story", "epic", "business", "user needs"],
    ),
    (
        "architect",
        &["design", "architecture", "system", "structure", "components", "layers"],
    ),
    (
        "ux_designer",
        &["ui", "ux", "interface", "user experience", "design system", "responsive"],
    ),
    (
        "dba",
        &["database", "schema", "migration", "sql", "table", "index", "query"],
    ),
    (
        "coder",
        &["implement", "code", "develop", "create", "function", "class", "method"],
    ),
    (
        "tester",
        &["test", "coverage", "verify", "e2e", "unit test", "integration"],
    ),
    (
        "debug_hunter",
        &["bug", "error", "fix", "debug", "issue", "crash", "exception"],
    ),
    (
        "secops",
        &["security", "vulnerability", "auth", "encryption", "xss", "injection"],
    ),
    (
        "sre",
        &["deploy", "monitor", "performance", "scale", "infrastructure", "kubernetes"],
    ),
    (
        "standards_oracle",
        &["standard", "convention", "style", "best practice", "guideline"],
    ),
    ("evaluator", &["review", "evaluate", "assess", "quality", "audit"]),
    (
        "documentation",
        &["document", "readme", "comment", "api doc", "guide", "tutorial"],
    ),
];

/// Runs optimiser-selected reviewer chains sequentially.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainRunner {
    optimizer: ChainOptimizer,
}

impl ChainRunner {
    /// Create a runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            optimizer: ChainOptimizer::new(),
        }
    }

    /// The optimizer behind this runner.
    #[must_use]
    pub fn optimizer(&self) -> &ChainOptimizer {
        &self.optimizer
    }

    /// Run the chain for `(task_type, mode, user_agent)` over the context.
    ///
    /// Reviewers execute in order; a rejection halts the chain. Unknown
    /// names in a chain are skipped with a warning.
    #[must_use]
    pub fn run(
        &self,
        ctx: &AgentContext,
        task_type: &str,
        mode: Mode,
        user_agent: Option<&str>,
    ) -> Vec<AgentDecision> {
        let chain = self.optimizer.select_chain(task_type, mode, user_agent);
        self.run_chain(ctx, &chain)
    }

    /// Run an explicit chain over the context.
    #[must_use]
    pub fn run_chain(&self, ctx: &AgentContext, chain: &[String]) -> Vec<AgentDecision> {
        let mut decisions = Vec::new();

        for agent_name in chain {
            let Some(spec) = reviewer(agent_name) else {
                warn!(agent = %agent_name, "agent not registered, skipping");
                continue;
            };

            let decision = spec.evaluate(ctx);
            let approved = decision.approved;
            decisions.push(decision);

            if !approved {
                warn!(agent = %agent_name, "chain stopped by reviewer");
                break;
            }
        }

        info!(
            executed = decisions.len(),
            approved = decisions.iter().all(|d| d.approved),
            "chain run complete"
        );

        decisions
    }

    /// Pick a starting reviewer for a free-form prompt.
    ///
    /// Scores each reviewer by keyword matches; architect is the default
    /// for design/planning work nothing else claims.
    #[must_use]
    pub fn route(&self, prompt: &str) -> &'static str {
        let prompt_lower = prompt.to_lowercase();
        let mut best: Option<(&'static str, usize)> = None;

        for (agent, keywords) in ROUTING_KEYWORDS {
            let score = keywords
                .iter()
                .filter(|kw| prompt_lower.contains(*kw))
                .count();
            if score > 0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((agent, score));
            }
        }

        best.map_or("architect", |(agent, _)| agent)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use guardloop_analysis::{FailureDetector, ResponseParser};

    fn ctx(prompt: &str, output: &str) -> AgentContext {
        AgentContext {
            prompt: prompt.to_string(),
            mode: Mode::Standard,
            parsed: ResponseParser::new().parse(output),
            violations: Vec::new(),
            failures: FailureDetector::new().scan(output, None),
            raw_output: output.to_string(),
            tool: "claude".to_string(),
        }
    }

    #[test]
    fn chain_halts_on_rejection() {
        // No code block: the coder rejects, so the tester never runs.
        let context = ctx(
            "the /src/auth.rs module should verify tokens",
            "I think you could try something",
        );
        let decisions = ChainRunner::new().run(&context, "implement_function", Mode::Standard, None);

        assert!(!decisions.is_empty());
        let last = decisions.last().unwrap();
        assert!(!last.approved);
        assert!(!decisions.iter().any(|d| d.agent_name == "tester"));
    }

    #[test]
    fn full_chain_runs_when_everything_passes() {
        let output = "Design: database backend frontend with auth caching and error fallback.\n\
                      ```rust\nfn verify() -> Result<(), Error> { Ok(()) }\n```\n\
                      We log errors and add unit test cases. Coverage: 100%";
        let context = ctx(
            "the /src/auth.rs module should verify tokens against the user table",
            output,
        );
        let decisions = ChainRunner::new().run(&context, "implement_function", Mode::Standard, None);

        let names: Vec<&str> = decisions.iter().map(|d| d.agent_name.as_str()).collect();
        assert_eq!(names, vec!["architect", "coder", "tester"]);
        assert!(decisions.iter().all(|d| d.approved));
    }

    #[test]
    fn unknown_agents_are_skipped() {
        let context = ctx("prompt", "output text that is long enough");
        let chain = vec!["ghost".to_string(), "evaluator".to_string()];
        let decisions = ChainRunner::new().run_chain(&context, &chain);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].agent_name, "evaluator");
    }

    #[test]
    fn user_agent_short_circuits_chain() {
        let context = ctx("p", "tested output with unit test");
        let decisions =
            ChainRunner::new().run(&context, "build_auth_system", Mode::Strict, Some("tester"));
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].agent_name, "tester");
    }

    #[test]
    fn routing_picks_keyword_winners() {
        let runner = ChainRunner::new();
        assert_eq!(runner.route("fix this bug and debug the crash"), "debug_hunter");
        assert_eq!(runner.route("migrate the database schema"), "dba");
        assert_eq!(runner.route("totally unrelated text"), "architect");
    }
}
