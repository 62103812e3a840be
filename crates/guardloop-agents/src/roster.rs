//! The reviewer roster, declared as data.
//!
//! Each reviewer is a list of probes over the [`AgentContext`]; a failed
//! blocking probe rejects the response, a failed advisory probe only adds
//! its suggestion. One engine interprets every spec — there are no
//! per-reviewer types.

use guardloop_core::Severity;

use crate::types::{decision_confidence, AgentContext, AgentDecision};

/// A pure heuristic probe over the context.
#[derive(Clone, Copy, Debug)]
pub enum Probe {
    /// Any of the keywords appears in the raw output (case-insensitive).
    OutputHasAny(&'static [&'static str]),
    /// Every keyword appears in the raw output.
    OutputHasAll(&'static [&'static str]),
    /// The parsed response contains at least one code block.
    HasCodeBlock,
    /// The raw output is non-empty.
    OutputNonEmpty,
    /// Extracted coverage is present and at least this value.
    CoverageAtLeast(f64),
    /// No failure at or above this severity was detected.
    NoFailuresAtOrAbove(Severity),
    /// No violation at or above this severity was recorded.
    NoViolationsAtOrAbove(Severity),
    /// The prompt is specific enough: at least two of {path characters,
    /// framework names, behaviour words, data-model words}.
    PromptIsSpecific,
}

impl Probe {
    fn passes(self, ctx: &AgentContext) -> bool {
        let output = ctx.raw_output.to_lowercase();
        match self {
            Self::OutputHasAny(keywords) => keywords.iter().any(|k| output.contains(k)),
            Self::OutputHasAll(keywords) => keywords.iter().all(|k| output.contains(k)),
            Self::HasCodeBlock => !ctx.parsed.code_blocks.is_empty(),
            Self::OutputNonEmpty => !ctx.raw_output.trim().is_empty(),
            Self::CoverageAtLeast(floor) => {
                ctx.parsed.test_coverage.is_some_and(|c| c >= floor)
            }
            Self::NoFailuresAtOrAbove(severity) => {
                !ctx.failures.iter().any(|f| f.severity >= severity)
            }
            Self::NoViolationsAtOrAbove(severity) => {
                !ctx.violations.iter().any(|v| v.severity >= severity)
            }
            Self::PromptIsSpecific => prompt_is_specific(&ctx.prompt),
        }
    }
}

/// One check inside a reviewer spec.
#[derive(Clone, Copy, Debug)]
pub struct Check {
    /// What passes the check.
    pub probe: Probe,
    /// Whether failing rejects the response outright.
    pub blocking: bool,
    /// Suggestion emitted when the check fails.
    pub suggestion: &'static str,
}

/// A reviewer, declared as data.
#[derive(Clone, Copy, Debug)]
pub struct ReviewerSpec {
    /// Reviewer name.
    pub name: &'static str,
    /// Ordered checks.
    pub checks: &'static [Check],
    /// Verdict line when approved.
    pub approve_reason: &'static str,
    /// Verdict line when rejected.
    pub reject_reason: &'static str,
    /// Reviewer to visit next when approved (the evaluator is terminal).
    pub next_agent: Option<&'static str>,
}

impl ReviewerSpec {
    /// Evaluate the context against this reviewer's checks.
    #[must_use]
    pub fn evaluate(&self, ctx: &AgentContext) -> AgentDecision {
        let mut approved = true;
        let mut issues = 0usize;
        let mut suggestions = Vec::new();

        for check in self.checks {
            if check.probe.passes(ctx) {
                continue;
            }
            issues += 1;
            suggestions.push(check.suggestion.to_string());
            if check.blocking {
                approved = false;
            }
        }

        AgentDecision {
            agent_name: self.name.to_string(),
            approved,
            reason: if approved {
                self.approve_reason.to_string()
            } else {
                self.reject_reason.to_string()
            },
            suggestions,
            next_agent: if approved {
                self.next_agent.map(ToString::to_string)
            } else {
                None
            },
            confidence: decision_confidence(approved, issues, self.checks.len()),
        }
    }
}

fn prompt_is_specific(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    let indicators = [
        prompt.contains('.') || prompt.contains('/'),
        ["react", "vue", "angular", "django", "flask", "fastapi", "express", "next.js"]
            .iter()
            .any(|k| lower.contains(k)),
        ["should", "must", "will", "when", "if", "then"]
            .iter()
            .any(|k| lower.contains(k)),
        ["model", "schema", "table", "entity", "data"]
            .iter()
            .any(|k| lower.contains(k)),
    ];
    indicators.iter().filter(|&&present| present).count() >= 2
}

// ─────────────────────────────────────────────────────────────────────────────
// The roster
// ─────────────────────────────────────────────────────────────────────────────

const ARCHITECT: ReviewerSpec = ReviewerSpec {
    name: "architect",
    checks: &[
        Check {
            probe: Probe::PromptIsSpecific,
            blocking: true,
            suggestion:
                "Requirements are vague. Please specify: file path, framework, expected behavior",
        },
        Check {
            probe: Probe::OutputHasAll(&["database", "backend", "frontend"]),
            blocking: false,
            suggestion: "Must include 3-layer design: Database + Backend + Frontend",
        },
        Check {
            probe: Probe::OutputHasAny(&["security", "auth", "mfa", "rbac"]),
            blocking: false,
            suggestion: "Include security measures: MFA + Azure AD + RBAC in design",
        },
        Check {
            probe: Probe::OutputHasAny(&["cache", "caching", "load balanc", "scal"]),
            blocking: false,
            suggestion: "Consider scalability: caching, load balancing, horizontal scaling",
        },
        Check {
            probe: Probe::OutputHasAny(&["error", "fallback", "retry", "exception"]),
            blocking: false,
            suggestion: "Define error handling strategy and fallback mechanisms",
        },
    ],
    approve_reason: "Architecture validation complete",
    reject_reason: "Architecture incomplete or missing critical elements",
    next_agent: Some("dba"),
};

const BUSINESS_ANALYST: ReviewerSpec = ReviewerSpec {
    name: "business_analyst",
    checks: &[
        Check {
            probe: Probe::PromptIsSpecific,
            blocking: false,
            suggestion: "Clarify requirements: user story, acceptance criteria, scope",
        },
        Check {
            probe: Probe::OutputHasAny(&["requirement", "user", "feature", "scope"]),
            blocking: false,
            suggestion: "Map the output back to explicit user requirements",
        },
        Check {
            probe: Probe::OutputNonEmpty,
            blocking: true,
            suggestion: "No analysable output produced",
        },
    ],
    approve_reason: "Requirements coverage acceptable",
    reject_reason: "Requirements not addressed",
    next_agent: Some("architect"),
};

const CODER: ReviewerSpec = ReviewerSpec {
    name: "coder",
    checks: &[
        Check {
            probe: Probe::HasCodeBlock,
            blocking: true,
            suggestion: "Provide the implementation in a fenced code block",
        },
        Check {
            probe: Probe::OutputHasAny(&["error", "try", "catch", "except", "result"]),
            blocking: false,
            suggestion: "Add error handling around fallible operations",
        },
        Check {
            probe: Probe::OutputHasAny(&["log", "logger", "debug", "trace"]),
            blocking: false,
            suggestion: "Add logging for troubleshooting",
        },
        Check {
            probe: Probe::NoFailuresAtOrAbove(Severity::Critical),
            blocking: true,
            suggestion: "Resolve critical failure signatures before shipping",
        },
    ],
    approve_reason: "Implementation present and structurally sound",
    reject_reason: "Implementation missing or critically flawed",
    next_agent: Some("tester"),
};

const DBA: ReviewerSpec = ReviewerSpec {
    name: "dba",
    checks: &[
        Check {
            probe: Probe::OutputHasAny(&["schema", "table", "migration", "index", "sql"]),
            blocking: false,
            suggestion: "Document the schema: tables, indexes, and migrations",
        },
        Check {
            probe: Probe::OutputHasAny(&["constraint", "foreign key", "primary key", "unique"]),
            blocking: false,
            suggestion: "Declare integrity constraints explicitly",
        },
        Check {
            probe: Probe::OutputHasAny(&["transaction", "rollback", "atomic"]),
            blocking: false,
            suggestion: "State the transaction boundaries for multi-step writes",
        },
    ],
    approve_reason: "Database design reviewed",
    reject_reason: "Database design incomplete",
    next_agent: Some("coder"),
};

const DEBUG_HUNTER: ReviewerSpec = ReviewerSpec {
    name: "debug_hunter",
    checks: &[
        Check {
            probe: Probe::NoFailuresAtOrAbove(Severity::High),
            blocking: true,
            suggestion: "Investigate the detected failure signatures before proceeding",
        },
        Check {
            probe: Probe::OutputHasAny(&["root cause", "fix", "resolved", "reproduce"]),
            blocking: false,
            suggestion: "State the root cause and how the fix addresses it",
        },
        Check {
            probe: Probe::OutputHasAny(&["test", "regression"]),
            blocking: false,
            suggestion: "Add a regression test for the fixed bug",
        },
    ],
    approve_reason: "No unresolved failure signatures",
    reject_reason: "High-severity failure signatures present",
    next_agent: Some("tester"),
};

const DOCUMENTATION: ReviewerSpec = ReviewerSpec {
    name: "documentation",
    checks: &[
        Check {
            probe: Probe::OutputHasAny(&["#", "##", "readme", "doc"]),
            blocking: false,
            suggestion: "Structure the documentation with headings",
        },
        Check {
            probe: Probe::OutputHasAny(&["example", "usage", "```"]),
            blocking: false,
            suggestion: "Include usage examples",
        },
        Check {
            probe: Probe::OutputNonEmpty,
            blocking: true,
            suggestion: "No documentation produced",
        },
    ],
    approve_reason: "Documentation adequate",
    reject_reason: "Documentation missing",
    next_agent: Some("evaluator"),
};

const EVALUATOR: ReviewerSpec = ReviewerSpec {
    name: "evaluator",
    checks: &[
        Check {
            probe: Probe::NoViolationsAtOrAbove(Severity::Critical),
            blocking: true,
            suggestion: "Resolve critical policy violations",
        },
        Check {
            probe: Probe::NoFailuresAtOrAbove(Severity::Critical),
            blocking: true,
            suggestion: "Resolve critical failure signatures",
        },
        Check {
            probe: Probe::OutputNonEmpty,
            blocking: true,
            suggestion: "Nothing to evaluate",
        },
    ],
    approve_reason: "Final evaluation passed",
    reject_reason: "Final evaluation failed on critical findings",
    // The evaluator is terminal.
    next_agent: None,
};

const SECOPS: ReviewerSpec = ReviewerSpec {
    name: "secops",
    checks: &[
        Check {
            probe: Probe::OutputHasAny(&["auth", "mfa", "rbac", "permission", "access control"]),
            blocking: false,
            suggestion: "Address authentication and authorization explicitly",
        },
        Check {
            probe: Probe::NoFailuresAtOrAbove(Severity::Critical),
            blocking: true,
            suggestion: "Critical security signatures detected - do not ship",
        },
        Check {
            probe: Probe::OutputHasAny(&["sanitiz", "validate", "escape", "parameteriz"]),
            blocking: false,
            suggestion: "Validate and sanitise every external input",
        },
        Check {
            probe: Probe::OutputHasAny(&["secret", "env", "vault", "key management"]),
            blocking: false,
            suggestion: "Keep secrets out of code: environment or vault",
        },
    ],
    approve_reason: "Security review passed",
    reject_reason: "Security review failed",
    next_agent: Some("sre"),
};

const SRE: ReviewerSpec = ReviewerSpec {
    name: "sre",
    checks: &[
        Check {
            probe: Probe::OutputHasAny(&["monitor", "metric", "alert", "health"]),
            blocking: false,
            suggestion: "Add monitoring and alerting for the new surface",
        },
        Check {
            probe: Probe::OutputHasAny(&["rollback", "deploy", "canary", "rollout"]),
            blocking: false,
            suggestion: "Describe the deployment and rollback path",
        },
        Check {
            probe: Probe::OutputHasAny(&["timeout", "retry", "circuit"]),
            blocking: false,
            suggestion: "Guard external calls with timeouts and retries",
        },
    ],
    approve_reason: "Operational readiness reviewed",
    reject_reason: "Operational readiness not demonstrated",
    next_agent: Some("evaluator"),
};

const STANDARDS_ORACLE: ReviewerSpec = ReviewerSpec {
    name: "standards_oracle",
    checks: &[
        Check {
            probe: Probe::NoViolationsAtOrAbove(Severity::High),
            blocking: true,
            suggestion: "Resolve high-severity standards violations",
        },
        Check {
            probe: Probe::OutputHasAny(&["convention", "standard", "style", "lint", "format"]),
            blocking: false,
            suggestion: "State which conventions the code follows",
        },
    ],
    approve_reason: "Standards check passed",
    reject_reason: "Standards violations outstanding",
    next_agent: Some("evaluator"),
};

const TESTER: ReviewerSpec = ReviewerSpec {
    name: "tester",
    checks: &[
        Check {
            probe: Probe::OutputHasAny(&["test", "assert", "expect", "mock"]),
            blocking: true,
            suggestion: "Add tests: none were mentioned or produced",
        },
        Check {
            probe: Probe::CoverageAtLeast(100.0),
            blocking: false,
            suggestion: "Raise test coverage to 100%",
        },
        Check {
            probe: Probe::OutputHasAny(&["e2e", "end-to-end", "integration"]),
            blocking: false,
            suggestion: "Add end-to-end or integration coverage",
        },
        Check {
            probe: Probe::OutputHasAny(&["edge case", "boundary", "negative"]),
            blocking: false,
            suggestion: "Cover edge cases and negative paths",
        },
    ],
    approve_reason: "Test coverage reviewed",
    reject_reason: "No testing evidence in the response",
    next_agent: Some("evaluator"),
};

const UX_DESIGNER: ReviewerSpec = ReviewerSpec {
    name: "ux_designer",
    checks: &[
        Check {
            probe: Probe::OutputHasAny(&["aria", "accessibility", "a11y", "screen reader"]),
            blocking: false,
            suggestion: "Add ARIA labels and accessibility features",
        },
        Check {
            probe: Probe::OutputHasAny(&["responsive", "mobile", "breakpoint"]),
            blocking: false,
            suggestion: "Handle responsive layouts and mobile breakpoints",
        },
        Check {
            probe: Probe::OutputHasAny(&["tooltip", "label", "hint"]),
            blocking: false,
            suggestion: "Use descriptive labels and tooltips",
        },
        Check {
            probe: Probe::OutputHasAny(&["dark mode", "theme"]),
            blocking: false,
            suggestion: "Support dark mode theming",
        },
    ],
    approve_reason: "UX review complete",
    reject_reason: "UX review failed",
    next_agent: Some("coder"),
};

const ORCHESTRATOR: ReviewerSpec = ReviewerSpec {
    name: "orchestrator",
    checks: &[Check {
        probe: Probe::OutputNonEmpty,
        blocking: true,
        suggestion: "Nothing to orchestrate",
    }],
    approve_reason: "Orchestration complete",
    reject_reason: "Nothing to orchestrate",
    next_agent: None,
};

const ROSTER: &[ReviewerSpec] = &[
    ARCHITECT,
    BUSINESS_ANALYST,
    CODER,
    DBA,
    DEBUG_HUNTER,
    DOCUMENTATION,
    EVALUATOR,
    ORCHESTRATOR,
    SECOPS,
    SRE,
    STANDARDS_ORACLE,
    TESTER,
    UX_DESIGNER,
];

/// Look up a reviewer spec by (normalised) name.
#[must_use]
pub fn reviewer(name: &str) -> Option<&'static ReviewerSpec> {
    let normalised = name.trim().to_lowercase().replace('-', "_");
    ROSTER.iter().find(|spec| spec.name == normalised)
}

/// All reviewer names in roster order.
#[must_use]
pub fn reviewer_names() -> Vec<&'static str> {
    ROSTER.iter().map(|spec| spec.name).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use guardloop_analysis::{FailureDetector, ResponseParser};
    use guardloop_core::Mode;

    fn ctx(prompt: &str, output: &str) -> AgentContext {
        let parsed = ResponseParser::new().parse(output);
        let failures = FailureDetector::new().scan(output, None);
        AgentContext {
            prompt: prompt.to_string(),
            mode: Mode::Standard,
            parsed,
            violations: Vec::new(),
            failures,
            raw_output: output.to_string(),
            tool: "claude".to_string(),
        }
    }

    #[test]
    fn roster_has_thirteen_reviewers() {
        assert_eq!(reviewer_names().len(), 13);
    }

    #[test]
    fn reviewer_lookup_normalises_names() {
        assert!(reviewer("Debug-Hunter").is_some());
        assert!(reviewer("  SECOPS ").is_some());
        assert!(reviewer("nonexistent").is_none());
    }

    #[test]
    fn coder_rejects_output_without_code() {
        let decision = reviewer("coder")
            .unwrap()
            .evaluate(&ctx("implement auth", "I would suggest thinking about it"));
        assert!(!decision.approved);
        assert!(decision.confidence >= 0.5);
        assert!(decision.next_agent.is_none());
    }

    #[test]
    fn coder_approves_code_with_handling() {
        let output = "```rust\nfn auth() -> Result<(), Error> { Ok(()) }\n```\nWe log each try with error context.";
        let decision = reviewer("coder").unwrap().evaluate(&ctx("implement auth", output));
        assert!(decision.approved);
        assert_eq!(decision.next_agent.as_deref(), Some("tester"));
    }

    #[test]
    fn architect_blocks_vague_prompts() {
        let decision = reviewer("architect").unwrap().evaluate(&ctx("do stuff", "design"));
        assert!(!decision.approved);
        assert!(decision
            .suggestions
            .iter()
            .any(|s| s.contains("Requirements are vague")));
    }

    #[test]
    fn architect_accepts_specific_prompts() {
        let decision = reviewer("architect").unwrap().evaluate(&ctx(
            "the /api/login endpoint should update the user table schema",
            "database backend frontend design with auth, caching, and error fallback",
        ));
        assert!(decision.approved);
        assert_eq!(decision.next_agent.as_deref(), Some("dba"));
    }

    #[test]
    fn evaluator_is_terminal_and_blocks_critical() {
        let mut context = ctx("implement", "stack overflow infinite recursion");
        assert!(!context.failures.is_empty());
        let decision = reviewer("evaluator").unwrap().evaluate(&context);
        assert!(!decision.approved);
        assert!(decision.next_agent.is_none());

        context.failures.clear();
        let decision = reviewer("evaluator").unwrap().evaluate(&context);
        assert!(decision.approved);
        assert!(decision.next_agent.is_none());
    }

    #[test]
    fn tester_blocks_untested_output() {
        let decision = reviewer("tester").unwrap().evaluate(&ctx("implement", "done."));
        assert!(!decision.approved);
    }

    #[test]
    fn tester_notes_coverage_gap() {
        let decision = reviewer("tester")
            .unwrap()
            .evaluate(&ctx("implement", "unit test added, coverage: 80%"));
        assert!(decision.approved);
        assert!(decision.suggestions.iter().any(|s| s.contains("100%")));
    }

    #[test]
    fn advisory_failures_lower_confidence_only() {
        let decision = reviewer("sre").unwrap().evaluate(&ctx("deploy", "we deploy via canary"));
        assert!(decision.approved);
        assert!(decision.confidence < 1.0);
        assert!(!decision.suggestions.is_empty());
    }
}
