//! Data-driven policy validation.
//!
//! Rule definitions are data: each rule carries its regex set, severity,
//! description, and suggestion. Three groups exist (standards, AI-specific,
//! UX/UI); the check kind decides how the regex set is interpreted.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use guardloop_core::{GuardrailType, Severity};

use crate::parser::ParsedResponse;

/// A detected policy violation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule group.
    pub guardrail_type: GuardrailType,
    /// Rule identifier.
    pub rule: String,
    /// Severity.
    pub severity: Severity,
    /// What went wrong.
    pub description: String,
    /// How to fix it.
    pub suggestion: String,
    /// Offending file, when known.
    pub file_path: Option<String>,
    /// Offending line, when known.
    pub line_number: Option<i64>,
}

/// How a rule's pattern set is interpreted.
enum Check {
    /// Violation when any pattern is absent from the text.
    RequireAll,
    /// Violation when no pattern is present in the text.
    RequireAny,
    /// Violation when any pattern is present (vague labels).
    ForbidPresence,
    /// Violation when total pattern matches exceed the limit.
    CountLimit(usize),
    /// Violation when stated coverage is below the floor (or absent).
    CoverageMin(f64),
}

struct Rule {
    guardrail_type: GuardrailType,
    name: &'static str,
    patterns: &'static [&'static str],
    severity: Severity,
    description: &'static str,
    suggestion: &'static str,
    check: Check,
}

fn rules() -> &'static [Rule] {
    use Check::{CountLimit, CoverageMin, ForbidPresence, RequireAll, RequireAny};
    use GuardrailType::{Ai, Bpsbs, UxUi};

    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            // ── Standards (bpsbs) ──────────────────────────────────────
            Rule {
                guardrail_type: Bpsbs,
                name: "three_layer",
                patterns: &[
                    r"\b(database|db)\b",
                    r"\b(backend|api|server)\b",
                    r"\b(frontend|ui|client)\b",
                ],
                severity: Severity::High,
                description: "Missing 3-layer architecture (DB + Backend + Frontend)",
                suggestion: "Implement all three layers: Database, Backend API, and Frontend",
                check: RequireAll,
            },
            Rule {
                guardrail_type: Bpsbs,
                name: "mfa_azure_ad",
                patterns: &[r"\b(mfa|multi.?factor)\b", r"\b(azure\s+ad|entra)\b"],
                severity: Severity::Critical,
                description: "Missing MFA + Azure AD authentication",
                suggestion: "Add MFA and Azure AD/Entra ID authentication",
                check: RequireAll,
            },
            Rule {
                guardrail_type: Bpsbs,
                name: "rbac",
                patterns: &[r"\b(rbac|role.?based|permission|authorization)\b"],
                severity: Severity::High,
                description: "Missing RBAC (Role-Based Access Control)",
                suggestion: "Implement role-based access control system",
                check: RequireAll,
            },
            Rule {
                guardrail_type: Bpsbs,
                name: "audit_logging",
                patterns: &[r"\b(audit|log|logging|tracking)\b"],
                severity: Severity::High,
                description: "Missing audit logging",
                suggestion: "Add comprehensive audit logging for all actions",
                check: RequireAll,
            },
            Rule {
                guardrail_type: Bpsbs,
                name: "test_coverage",
                patterns: &[r"(?:coverage[:\s]+)?(\d+(?:\.\d+)?)\s*%"],
                severity: Severity::High,
                description: "Test coverage below 100%",
                suggestion: "Achieve 100% test coverage",
                check: CoverageMin(100.0),
            },
            Rule {
                guardrail_type: Bpsbs,
                name: "export_features",
                patterns: &[r"\b(export|csv|pdf|xlsx|excel)\b"],
                severity: Severity::Medium,
                description: "Missing export features (CSV, PDF, XLSX)",
                suggestion: "Add export functionality for CSV, PDF, and XLSX formats",
                check: RequireAll,
            },
            // ── AI-specific ────────────────────────────────────────────
            Rule {
                guardrail_type: Ai,
                name: "unit_tests",
                patterns: &[r"\b(unit\s+test|test\s+case)\b"],
                severity: Severity::High,
                description: "Missing unit tests",
                suggestion: "Add comprehensive unit tests",
                check: RequireAny,
            },
            Rule {
                guardrail_type: Ai,
                name: "e2e_tests",
                patterns: &[r"\b(e2e|end.?to.?end|integration\s+test)\b"],
                severity: Severity::High,
                description: "Missing E2E/integration tests",
                suggestion: "Add end-to-end and integration tests",
                check: RequireAny,
            },
            Rule {
                guardrail_type: Ai,
                name: "error_handling",
                patterns: &[r"\b(try|catch|error|exception|handle)\b"],
                severity: Severity::High,
                description: "Missing proper error handling",
                suggestion: "Add comprehensive error handling with try/catch blocks",
                check: RequireAny,
            },
            Rule {
                guardrail_type: Ai,
                name: "debug_logging",
                patterns: &[r"\b(debug|log|logger|console\.\w+)\b"],
                severity: Severity::Medium,
                description: "Missing debug/logging statements",
                suggestion: "Add debugging and logging for troubleshooting",
                check: RequireAny,
            },
            // ── UX/UI ──────────────────────────────────────────────────
            Rule {
                guardrail_type: UxUi,
                name: "vague_labels",
                patterns: &[r"\b(ok|more|click\s+here|submit)\b"],
                severity: Severity::Medium,
                description: "Vague button labels detected (OK, More, etc.)",
                suggestion: "Use descriptive labels like 'Save Changes', 'View Details'",
                check: ForbidPresence,
            },
            Rule {
                guardrail_type: UxUi,
                name: "dark_mode",
                patterns: &[r"\b(dark\s+mode|theme|color\s+scheme)\b"],
                severity: Severity::Low,
                description: "Missing dark mode support",
                suggestion: "Add dark mode/theme switching capability",
                check: RequireAny,
            },
            Rule {
                guardrail_type: UxUi,
                name: "tooltips",
                patterns: &[r"\b(tooltip|hint|help\s+text)\b"],
                severity: Severity::Low,
                description: "Missing tooltips for user guidance",
                suggestion: "Add tooltips to explain features and inputs",
                check: RequireAny,
            },
            Rule {
                guardrail_type: UxUi,
                name: "accessibility",
                patterns: &[r"\b(aria|accessibility|a11y|screen\s+reader)\b"],
                severity: Severity::Medium,
                description: "Missing accessibility considerations",
                suggestion: "Add ARIA labels and accessibility features",
                check: RequireAny,
            },
            Rule {
                guardrail_type: UxUi,
                name: "export_buttons",
                patterns: &[r"\b(export|download|save\s+as)\b"],
                severity: Severity::Medium,
                description: "Missing export buttons",
                suggestion: "Add export/download buttons for data",
                check: RequireAny,
            },
            Rule {
                guardrail_type: UxUi,
                name: "max_elements",
                patterns: &[r"\b(button|input|select|checkbox|radio)\b"],
                severity: Severity::Low,
                description: "Too many interactive elements per screen",
                suggestion: "Limit to 7 interactive elements per screen",
                check: CountLimit(7),
            },
        ]
    })
}

fn compiled(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("static rule regex")
}

fn compiled_rules() -> &'static Vec<Vec<Regex>> {
    static COMPILED: OnceLock<Vec<Vec<Regex>>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        rules()
            .iter()
            .map(|rule| rule.patterns.iter().map(|p| compiled(p)).collect())
            .collect()
    })
}

/// Applies the static policy rules to parsed output. Pure.
#[derive(Clone, Copy, Debug, Default)]
pub struct Validator;

impl Validator {
    /// Create a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule group against the parsed structure and raw text.
    #[must_use]
    pub fn validate(&self, parsed: &ParsedResponse, raw_text: &str) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (rule, regexes) in rules().iter().zip(compiled_rules()) {
            match &rule.check {
                Check::RequireAll => {
                    if regexes.iter().any(|re| !re.is_match(raw_text)) {
                        violations.push(violation(rule, rule.description.to_string()));
                    }
                }
                Check::RequireAny => {
                    if !regexes.iter().any(|re| re.is_match(raw_text)) {
                        violations.push(violation(rule, rule.description.to_string()));
                    }
                }
                Check::ForbidPresence => {
                    let found: Vec<&str> = regexes
                        .iter()
                        .flat_map(|re| re.find_iter(raw_text).map(|m| m.as_str()))
                        .take(3)
                        .collect();
                    if !found.is_empty() {
                        violations.push(violation(
                            rule,
                            format!("{}: {}", rule.description, found.join(", ")),
                        ));
                    }
                }
                Check::CountLimit(limit) => {
                    let count: usize = regexes.iter().map(|re| re.find_iter(raw_text).count()).sum();
                    if count > *limit {
                        violations.push(violation(
                            rule,
                            format!("{}: {count} found, max {limit}", rule.description),
                        ));
                    }
                }
                Check::CoverageMin(floor) => {
                    // Prefer the parser's extraction, falling back to the
                    // rule's own regex over the raw text.
                    let coverage = parsed.test_coverage.or_else(|| {
                        regexes[0]
                            .captures(raw_text)
                            .and_then(|c| c.get(1))
                            .and_then(|m| m.as_str().parse::<f64>().ok())
                    });
                    match coverage {
                        Some(value) if value >= *floor => {}
                        Some(value) => violations.push(violation(
                            rule,
                            format!("{}: {value}%", rule.description),
                        )),
                        None => violations.push(violation(rule, rule.description.to_string())),
                    }
                }
            }
        }

        debug!(total = violations.len(), "validation complete");
        violations
    }

    /// Only the critical violations.
    #[must_use]
    pub fn critical<'a>(&self, violations: &'a [Violation]) -> Vec<&'a Violation> {
        violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .collect()
    }

    /// Human-readable report grouped by severity, critical first.
    #[must_use]
    pub fn format_report(&self, violations: &[Violation]) -> String {
        if violations.is_empty() {
            return "No violations found - all guardrails passed".to_string();
        }

        let mut lines = vec![format!("Found {} guardrail violation(s):", violations.len())];
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ] {
            let group: Vec<&Violation> =
                violations.iter().filter(|v| v.severity == severity).collect();
            if group.is_empty() {
                continue;
            }
            lines.push(format!(
                "{} ({} issues):",
                severity.as_str().to_uppercase(),
                group.len()
            ));
            for v in group {
                lines.push(format!("  [{}] {}", v.guardrail_type, v.description));
                lines.push(format!("    -> {}", v.suggestion));
            }
        }
        lines.join("\n")
    }
}

fn violation(rule: &Rule, description: String) -> Violation {
    Violation {
        guardrail_type: rule.guardrail_type,
        rule: rule.name.to_string(),
        severity: rule.severity,
        description,
        suggestion: rule.suggestion.to_string(),
        file_path: None,
        line_number: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ResponseParser;

    fn run(text: &str) -> Vec<Violation> {
        let parsed = ResponseParser::new().parse(text);
        Validator::new().validate(&parsed, text)
    }

    fn has_rule(violations: &[Violation], rule: &str) -> bool {
        violations.iter().any(|v| v.rule == rule)
    }

    #[test]
    fn bare_text_triggers_missing_rules() {
        let violations = run("hello");
        assert!(has_rule(&violations, "three_layer"));
        assert!(has_rule(&violations, "unit_tests"));
        assert!(has_rule(&violations, "test_coverage"));
    }

    #[test]
    fn three_layer_satisfied_by_all_tokens() {
        let violations = run("We use a database, a backend API, and a frontend client.");
        assert!(!has_rule(&violations, "three_layer"));
    }

    #[test]
    fn three_layer_partial_still_violates() {
        let violations = run("We use a database and a backend.");
        assert!(has_rule(&violations, "three_layer"));
    }

    #[test]
    fn full_coverage_passes_below_fails() {
        let ok = run("Test coverage: 100% with unit tests");
        assert!(!has_rule(&ok, "test_coverage"));

        let low = run("Test coverage: 80%");
        assert!(has_rule(&low, "test_coverage"));
        let v = low.iter().find(|v| v.rule == "test_coverage").unwrap();
        assert!(v.description.contains("80"));
    }

    #[test]
    fn vague_labels_flag_on_presence() {
        let violations = run("Add a Submit button and an OK dialog");
        let v = violations.iter().find(|v| v.rule == "vague_labels").unwrap();
        assert_eq!(v.severity, Severity::Medium);
        assert_eq!(v.guardrail_type, GuardrailType::UxUi);
    }

    #[test]
    fn element_count_limit() {
        let many = "button input select checkbox radio button input select";
        let violations = run(many);
        assert!(has_rule(&violations, "max_elements"));

        let few = "one button and one input";
        assert!(!has_rule(&run(few), "max_elements"));
    }

    #[test]
    fn mfa_rule_is_critical() {
        let violations = run("plain response");
        let v = violations.iter().find(|v| v.rule == "mfa_azure_ad").unwrap();
        assert_eq!(v.severity, Severity::Critical);
    }

    #[test]
    fn critical_filter() {
        let violations = run("plain response");
        let validator = Validator::new();
        assert!(validator
            .critical(&violations)
            .iter()
            .all(|v| v.severity == Severity::Critical));
    }

    #[test]
    fn report_groups_by_severity() {
        let violations = run("plain response");
        let report = Validator::new().format_report(&violations);
        assert!(report.starts_with("Found"));
        let critical_pos = report.find("CRITICAL").unwrap();
        let low_pos = report.find("LOW").unwrap_or(usize::MAX);
        assert!(critical_pos < low_pos);
    }

    #[test]
    fn empty_report_is_positive() {
        assert!(Validator::new()
            .format_report(&[])
            .contains("No violations"));
    }
}
