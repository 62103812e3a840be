//! Context assembly: cached policy loading and the prompt envelope.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use guardloop_core::{estimate_tokens, Mode, TaskType};

use crate::cache::TtlCache;
use crate::classifier::TaskClassifier;
use crate::selector::SmartSelector;

/// Warn once an assembled context passes this estimated size.
const MAX_CONTEXT_TOKENS: usize = 50_000;

/// Static-content budget handed to the selector.
const STATIC_TOKEN_BUDGET: usize = 5_000;

/// The reviewer roster; agent instructions exist for each of these.
pub const AGENTS: &[&str] = &[
    "architect",
    "business_analyst",
    "coder",
    "dba",
    "debug_hunter",
    "documentation",
    "evaluator",
    "orchestrator",
    "secops",
    "sre",
    "standards_oracle",
    "tester",
    "ux_designer",
];

/// Seam through which learned rules reach the context.
///
/// Implemented by the adaptive guardrail manager; the assembler only sees
/// formatted text, never rows.
pub trait DynamicRuleSource: Send + Sync {
    /// Formatted learned-rule block for the task, or `None` when there are
    /// no applicable rules.
    fn rules_for_context(&self, task_type: TaskType, prompt: &str, max_rules: usize)
        -> Option<String>;
}

/// Assembler statistics.
#[derive(Clone, Debug, Serialize)]
pub struct AssemblerStats {
    /// Cached policy bodies.
    pub cache_size: usize,
    /// Number of known reviewers.
    pub available_agents: usize,
    /// Guardrail tree root.
    pub guardrails_path: String,
    /// Agent instruction tree root.
    pub agents_path: String,
}

/// Builds the augmented prompt sent to the wrapped tool.
pub struct ContextAssembler {
    guardrails_path: PathBuf,
    agents_path: PathBuf,
    cache: TtlCache,
    selector: SmartSelector,
    classifier: TaskClassifier,
    dynamic_rules: Option<Arc<dyn DynamicRuleSource>>,
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("guardrails_path", &self.guardrails_path)
            .field("agents_path", &self.agents_path)
            .field("dynamic_rules", &self.dynamic_rules.is_some())
            .finish()
    }
}

impl ContextAssembler {
    /// Assembler over the policy and agent trees, with the default TTL.
    #[must_use]
    pub fn new(guardrails_path: impl Into<PathBuf>, agents_path: impl Into<PathBuf>) -> Self {
        Self {
            guardrails_path: guardrails_path.into(),
            agents_path: agents_path.into(),
            cache: TtlCache::with_default_ttl(),
            selector: SmartSelector::new(),
            classifier: TaskClassifier::new(),
            dynamic_rules: None,
        }
    }

    /// Install the learned-rule source.
    #[must_use]
    pub fn with_dynamic_rules(mut self, source: Arc<dyn DynamicRuleSource>) -> Self {
        self.dynamic_rules = Some(source);
        self
    }

    /// Build the complete augmented prompt.
    ///
    /// Creative and content tasks short-circuit: the prompt is returned
    /// verbatim without policy injection.
    #[must_use]
    pub fn build_context(
        &self,
        prompt: &str,
        agent: Option<&str>,
        mode: Mode,
        task_type: Option<TaskType>,
    ) -> String {
        let task_type =
            task_type.unwrap_or_else(|| self.classifier.classify(prompt).task_type);
        if matches!(task_type, TaskType::Creative | TaskType::Content) {
            debug!(task_type = %task_type, "bypassing policy injection");
            return prompt.to_string();
        }

        let guardrails = self.load_guardrails(agent, mode, prompt, Some(task_type));
        let mode_line = format!("\n<mode>{mode}</mode>");

        let context_parts: [&str; 17] = [
            "<guardrails>",
            guardrails.as_str(),
            mode_line.as_str(),
            mode_instructions(mode),
            "</guardrails>",
            "",
            "<system_instructions>",
            "You have FULL PERMISSION to create, modify, and delete files as requested by the user.",
            "When the user asks you to create a file, you should:",
            "1. Include the complete code in a ```language\\n...``` code block",
            "2. State that you created the file (e.g., 'Created `filename.ext`')",
            "3. Do NOT ask for permission - you already have it",
            "</system_instructions>",
            "",
            "<user_request>",
            prompt,
            "</user_request>",
        ];
        let full_context = context_parts.join("\n");

        let estimated = estimate_tokens(&full_context);
        if estimated > MAX_CONTEXT_TOKENS {
            warn!(
                estimated_tokens = estimated,
                max_tokens = MAX_CONTEXT_TOKENS,
                "final context exceeds recommended size"
            );
        }

        info!(
            total_length = full_context.len(),
            estimated_tokens = estimated,
            "context built"
        );

        full_context
    }

    /// Load the policy content for `(agent, mode, task_type)`.
    ///
    /// The static body (selected files concatenated) is cached under that
    /// key; learned rules and agent instructions are appended per call.
    #[must_use]
    pub fn load_guardrails(
        &self,
        agent: Option<&str>,
        mode: Mode,
        prompt: &str,
        task_type: Option<TaskType>,
    ) -> String {
        let task_label = task_type.map_or_else(|| "none".to_string(), |t| t.to_string());
        let cache_key = format!(
            "guardrails_{}_{}_{}",
            agent.unwrap_or("none"),
            mode,
            task_label
        );

        let static_body = if let Some(cached) = self.cache.get(&cache_key) {
            debug!(cache_key = %cache_key, "guardrails loaded from cache");
            cached
        } else {
            let body = self.load_static_body(mode, prompt, task_type);
            self.cache.set(&cache_key, &body);
            body
        };

        let mut sections: Vec<String> = Vec::new();
        if !static_body.is_empty() {
            sections.push(static_body);
        }

        // Learned rules, capped after relevance sorting by the source.
        if let (Some(source), Some(task)) = (self.dynamic_rules.as_ref(), task_type) {
            if let Some(block) = source.rules_for_context(task, prompt, 5) {
                sections.push(block);
            }
        }

        // Agent-specific instructions: summary normally, checklist in strict.
        if let Some(agent) = agent.filter(|a| AGENTS.contains(a)) {
            let version = if mode == Mode::Strict {
                "checklist"
            } else {
                "summary"
            };
            if let Some(content) = self.load_agent_instructions(agent, version) {
                sections.push(format!(
                    "# Agent-Specific Instructions: {} ({version})\n\n{content}",
                    agent.to_uppercase()
                ));
            }
        }

        sections.join("\n\n---\n\n")
    }

    fn load_static_body(&self, mode: Mode, prompt: &str, task_type: Option<TaskType>) -> String {
        // The selector speaks keyword task types; the classifier's label is
        // only a hint, so fall back to keyword detection over the prompt.
        let selector_task = self.selector.classify_task_type(prompt);
        let selector_task = selector_task.as_deref().or(match task_type {
            Some(TaskType::Creative) => Some("creative"),
            _ => None,
        });

        let selected =
            self.selector
                .select(selector_task, prompt, mode, STATIC_TOKEN_BUDGET);

        info!(
            selected_count = selected.len(),
            estimated_tokens = self.selector.token_estimate(&selected),
            "smart selection complete"
        );

        let mut sections = Vec::new();
        for relative in &selected {
            let full_path = self.guardrails_path.join(relative);
            if let Some(content) = load_file(&full_path) {
                sections.push(format!("# {relative}\n\n{content}"));
            }
        }
        sections.join("\n\n---\n\n")
    }

    fn load_agent_instructions(&self, agent: &str, version: &str) -> Option<String> {
        // Preferred layout: <agents>/<agent>/<version>.md
        let versioned = self.agents_path.join(agent).join(format!("{version}.md"));
        if versioned.exists() {
            return load_file(&versioned);
        }
        // Legacy layout: <agents>/<agent>.md
        load_file(&self.agents_path.join(format!("{agent}.md")))
    }

    /// Pre-load the high-frequency cache keys so the first request does not
    /// pay the cold-start cost.
    pub fn prewarm(&self) {
        let warm_keys: [(Option<TaskType>, &str); 4] = [
            (None, ""),
            (Some(TaskType::Code), "authentication login"),
            (Some(TaskType::Code), "api endpoint"),
            (Some(TaskType::Code), "database schema"),
        ];
        for (task, prompt) in warm_keys {
            let _ = self.load_guardrails(None, Mode::Standard, prompt, task);
        }
        info!(cache_size = self.cache.len(), "cache pre-warmed");
    }

    /// Drop every cached policy body.
    pub fn refresh_cache(&self) {
        self.cache.clear();
    }

    /// The known reviewer names.
    #[must_use]
    pub fn available_agents(&self) -> &'static [&'static str] {
        AGENTS
    }

    /// Whether `agent` is a known reviewer.
    #[must_use]
    pub fn validate_agent(&self, agent: &str) -> bool {
        AGENTS.contains(&agent)
    }

    /// Assembler statistics.
    #[must_use]
    pub fn stats(&self) -> AssemblerStats {
        AssemblerStats {
            cache_size: self.cache.len(),
            available_agents: AGENTS.len(),
            guardrails_path: self.guardrails_path.display().to_string(),
            agents_path: self.agents_path.display().to_string(),
        }
    }
}

fn load_file(path: &Path) -> Option<String> {
    if !path.exists() {
        warn!(path = %path.display(), "guardrail file not found");
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                warn!(path = %path.display(), "guardrail file is empty");
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "error loading guardrail file");
            None
        }
    }
}

fn mode_instructions(mode: Mode) -> &'static str {
    match mode {
        Mode::Strict => {
            "\n<strict_mode_instructions>\nSTRICT MODE ENABLED - Enhanced Validation:\n\
             - All security requirements are MANDATORY\n\
             - Test coverage must be >= 100%\n\
             - All guardrail violations must be addressed before approval\n\
             - No shortcuts or workarounds allowed\n\
             - Complete documentation required\n\
             - Full compliance with BPSBS, AI, and UX/UI guardrails\n\
             - Any violation results in REJECTION\n\
             </strict_mode_instructions>\n"
        }
        Mode::Standard => {
            "\n<standard_mode_instructions>\nSTANDARD MODE - Balanced Validation:\n\
             - Follow guardrails as guidance\n\
             - Address critical and high-severity violations\n\
             - Aim for comprehensive test coverage\n\
             - Document major decisions and changes\n\
             - Consider security and UX best practices\n\
             </standard_mode_instructions>\n"
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FixedRules(&'static str);

    impl DynamicRuleSource for FixedRules {
        fn rules_for_context(
            &self,
            _task_type: TaskType,
            _prompt: &str,
            _max_rules: usize,
        ) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn tree() -> (tempfile::TempDir, ContextAssembler) {
        let dir = tempfile::tempdir().unwrap();
        let guardrails = dir.path().join("guardrails");
        let agents = guardrails.join("agents");
        fs::create_dir_all(guardrails.join("core")).unwrap();
        fs::create_dir_all(guardrails.join("specialized")).unwrap();
        fs::create_dir_all(agents.join("coder")).unwrap();

        fs::write(
            guardrails.join("core/always.md"),
            "# Always\nBe deliberate.",
        )
        .unwrap();
        fs::write(
            guardrails.join("core/security_baseline.md"),
            "# Security\nMFA required.",
        )
        .unwrap();
        fs::write(agents.join("coder/summary.md"), "Write clean code.").unwrap();
        fs::write(agents.join("coder/checklist.md"), "- [ ] tests pass").unwrap();

        let assembler = ContextAssembler::new(&guardrails, &agents);
        (dir, assembler)
    }

    #[test]
    fn envelope_wraps_prompt() {
        let (_dir, assembler) = tree();
        let context =
            assembler.build_context("implement user authentication", None, Mode::Standard, None);
        assert!(context.starts_with("<guardrails>"));
        assert!(context.contains("<mode>standard</mode>"));
        assert!(context.contains("<system_instructions>"));
        assert!(context.contains("<user_request>\nimplement user authentication\n</user_request>"));
        assert!(context.contains("Be deliberate."));
    }

    #[test]
    fn creative_task_short_circuits() {
        let (_dir, assembler) = tree();
        let context = assembler.build_context(
            "write a poem about coding",
            None,
            Mode::Standard,
            Some(TaskType::Creative),
        );
        assert_eq!(context, "write a poem about coding");
    }

    #[test]
    fn content_task_short_circuits() {
        let (_dir, assembler) = tree();
        let context = assembler.build_context(
            "summarize this article",
            None,
            Mode::Standard,
            Some(TaskType::Content),
        );
        assert_eq!(context, "summarize this article");
    }

    #[test]
    fn assembly_is_idempotent_within_ttl() {
        let (_dir, assembler) = tree();
        let first =
            assembler.build_context("implement authentication", None, Mode::Standard, None);
        let second =
            assembler.build_context("implement authentication", None, Mode::Standard, None);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_files_warn_but_do_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ContextAssembler::new(dir.path().join("nope"), dir.path().join("nope2"));
        let context = assembler.build_context("implement the api", None, Mode::Standard, None);
        assert!(context.contains("<user_request>"));
    }

    #[test]
    fn agent_instructions_pick_version_by_mode() {
        let (_dir, assembler) = tree();
        let standard = assembler.load_guardrails(
            Some("coder"),
            Mode::Standard,
            "implement auth",
            Some(TaskType::Code),
        );
        assert!(standard.contains("CODER (summary)"));
        assert!(standard.contains("Write clean code."));

        let strict = assembler.load_guardrails(
            Some("coder"),
            Mode::Strict,
            "implement auth",
            Some(TaskType::Code),
        );
        assert!(strict.contains("CODER (checklist)"));
        assert!(strict.contains("tests pass"));
    }

    #[test]
    fn unknown_agent_is_ignored() {
        let (_dir, assembler) = tree();
        let body = assembler.load_guardrails(
            Some("ghostwriter"),
            Mode::Standard,
            "implement auth",
            Some(TaskType::Code),
        );
        assert!(!body.contains("Agent-Specific Instructions"));
    }

    #[test]
    fn dynamic_rules_are_appended() {
        let (dir, _) = tree();
        let guardrails = dir.path().join("guardrails");
        let assembler = ContextAssembler::new(&guardrails, guardrails.join("agents"))
            .with_dynamic_rules(Arc::new(FixedRules("# Learned Guardrails\n- MUST include: x")));
        let body = assembler.load_guardrails(None, Mode::Standard, "auth", Some(TaskType::Code));
        assert!(body.contains("# Learned Guardrails"));
    }

    #[test]
    fn prewarm_fills_the_cache() {
        let (_dir, assembler) = tree();
        assert_eq!(assembler.stats().cache_size, 0);
        assembler.prewarm();
        assert!(assembler.stats().cache_size >= 2);
    }

    #[test]
    fn strict_mode_instructions_appear() {
        let (_dir, assembler) = tree();
        let context = assembler.build_context("implement auth", None, Mode::Strict, None);
        assert!(context.contains("<mode>strict</mode>"));
        assert!(context.contains("STRICT MODE ENABLED"));
    }
}
