//! Detection of known LLM failure signatures.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use guardloop_core::Severity;

/// A matched failure signature with its surrounding context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectedFailure {
    /// Signature category.
    pub category: String,
    /// The exact matched snippet.
    pub pattern: String,
    /// Detection time.
    pub timestamp: DateTime<Utc>,
    /// Severity of this category.
    pub severity: Severity,
    /// Window of surrounding words.
    pub context: String,
    /// Remediation suggestion.
    pub suggestion: Option<String>,
    /// Tool that produced the output, when known.
    pub tool: Option<String>,
}

/// Aggregate counts over the signature catalogue.
#[derive(Clone, Debug, Serialize)]
pub struct DetectorStats {
    /// Number of signature categories.
    pub total_patterns: usize,
    /// Category names.
    pub categories: Vec<String>,
    /// Signatures per severity.
    pub severity_distribution: BTreeMap<String, usize>,
}

struct Signature {
    category: &'static str,
    regex: &'static str,
    severity: Severity,
    suggestion: &'static str,
    context_words: usize,
}

const SIGNATURES: &[Signature] = &[
    Signature {
        category: "JWT/Auth",
        regex: r"\b(jwt|token|unauthorized|expired|authentication\s+failed|invalid\s+token|bearer)\b",
        severity: Severity::High,
        suggestion: "Ensure MFA + Azure AD is configured. Check token validation logic.",
        context_words: 50,
    },
    Signature {
        category: ".NET Code",
        regex: r"\b(csproj|dependency\s+injection|di\s+error|async\s+issue|broken\s+reference|nuget)\b",
        severity: Severity::Medium,
        suggestion: "Review .NET dependency injection configuration and project references.",
        context_words: 50,
    },
    Signature {
        category: "Angular DI",
        regex: r"\b(translateservice|apiservice|provider\s+not\s+found|no\s+provider\s+for|nullinjectorerror)\b",
        severity: Severity::Medium,
        suggestion: "Check Angular TestBed providers and module imports.",
        context_words: 50,
    },
    Signature {
        category: "File Overwrite",
        regex: r"(\)\)\)\)\)+|0{10,}|#{10,}|={10,}|\*{10,})",
        severity: Severity::Critical,
        suggestion: "AI corrupted file with repetitive characters - restore from backup immediately!",
        context_words: 20,
    },
    Signature {
        category: "Environment",
        regex: r"\b(node|npm|version|dependency\s+conflict|python\s+version|incompatible|missing\s+package)\b",
        severity: Severity::Medium,
        suggestion: "Check environment compatibility and dependency versions.",
        context_words: 50,
    },
    Signature {
        category: "Pipeline",
        regex: r"\b(coverage|sonarqube|lint|pipeline\s+failed|build\s+error|ci\s+failed|test\s+failed)\b",
        severity: Severity::High,
        suggestion: "Review CI/CD configuration and fix failing pipeline steps.",
        context_words: 50,
    },
    Signature {
        category: "Security",
        regex: r"\b(mfa|azure\s+ad|rbac|audit\s+log|panic\s+button|security\s+vulnerability|sql\s+injection|xss|csrf)\b",
        severity: Severity::Critical,
        suggestion: "Address security requirements immediately. Follow OWASP guidelines.",
        context_words: 50,
    },
    Signature {
        category: "UI/UX",
        regex: r"\b(button|tooltip|dark\s+mode|export\s+missing|vague\s+label|accessibility\s+issue)\b",
        severity: Severity::Low,
        suggestion: "Apply UX/UI guardrails for better user experience.",
        context_words: 40,
    },
    Signature {
        category: "Compliance",
        regex: r"\b(gdpr|iso|27001|27002|retention|compliance\s+gap|data\s+privacy|regulation)\b",
        severity: Severity::High,
        suggestion: "Review compliance requirements (GDPR, ISO 27001/27002).",
        context_words: 50,
    },
    Signature {
        category: "Looping",
        regex: r"\b(retrying|loop\s+detected|infinite|recursion|stack\s+overflow|maximum\s+recursion)\b",
        severity: Severity::Critical,
        suggestion: "AI entered infinite loop - abort and retry with different prompt.",
        context_words: 30,
    },
    Signature {
        category: "Database",
        regex: r"\b(connection\s+failed|timeout|deadlock|migration\s+failed|constraint\s+violation|duplicate\s+key)\b",
        severity: Severity::High,
        suggestion: "Check database connection, schema, and query optimization.",
        context_words: 50,
    },
    Signature {
        category: "Type Errors",
        regex: r"\b(type\s+error|undefined|null\s+reference|cannot\s+read\s+property|typeerror)\b",
        severity: Severity::Medium,
        suggestion: "Add type checking and null safety guards.",
        context_words: 40,
    },
    Signature {
        category: "Memory Issues",
        regex: r"\b(out\s+of\s+memory|memory\s+leak|heap\s+overflow|allocation\s+failed)\b",
        severity: Severity::Critical,
        suggestion: "Investigate memory usage and potential leaks.",
        context_words: 40,
    },
    Signature {
        category: "API Errors",
        regex: r"\b(400|401|403|404|500|502|503|504|bad\s+request|not\s+found|server\s+error)\b",
        severity: Severity::High,
        suggestion: "Check API endpoint configuration and error handling.",
        context_words: 50,
    },
    Signature {
        category: "Configuration",
        regex: r"\b(missing\s+config|invalid\s+configuration|env\s+variable|config\s+error|settings\s+not\s+found)\b",
        severity: Severity::Medium,
        suggestion: "Verify configuration files and environment variables.",
        context_words: 50,
    },
    Signature {
        category: "Import Errors",
        regex: r"\b(cannot\s+find\s+module|import\s+error|module\s+not\s+found|no\s+module\s+named)\b",
        severity: Severity::Medium,
        suggestion: "Check import paths and installed packages.",
        context_words: 40,
    },
    Signature {
        category: "Test Failures",
        regex: r"\b(test\s+failed|assertion\s+failed|expected.*but\s+got|test\s+suite\s+failed)\b",
        severity: Severity::Medium,
        suggestion: "Review test assertions and implementation.",
        context_words: 50,
    },
    Signature {
        category: "Performance",
        regex: r"\b(slow|performance\s+issue|bottleneck|n\+1\s+query|inefficient|optimization)\b",
        severity: Severity::Medium,
        suggestion: "Profile and optimize performance bottlenecks.",
        context_words: 50,
    },
    Signature {
        category: "Race Condition",
        regex: r"\b(race\s+condition|concurrent|synchronization|mutex|deadlock|thread\s+safety)\b",
        severity: Severity::High,
        suggestion: "Add proper synchronization and thread safety mechanisms.",
        context_words: 50,
    },
    Signature {
        category: "Deployment",
        regex: r"\b(deployment\s+failed|rollback|downtime|service\s+unavailable|container\s+error)\b",
        severity: Severity::High,
        suggestion: "Check deployment configuration and service health.",
        context_words: 50,
    },
];

fn compiled_signatures() -> &'static Vec<Regex> {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SIGNATURES
            .iter()
            .map(|s| Regex::new(&format!("(?im){}", s.regex)).expect("static signature regex"))
            .collect()
    })
}

/// Scans raw output for the failure signature catalogue.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailureDetector;

impl FailureDetector {
    /// Create a detector. Signatures compile once per process.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scan text for failure patterns, ordered by severity descending.
    ///
    /// Matches are deduplicated per `(category, leading context)` so a
    /// repeated token does not flood the result.
    #[must_use]
    pub fn scan(&self, text: &str, tool: Option<&str>) -> Vec<DetectedFailure> {
        let mut failures = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (signature, regex) in SIGNATURES.iter().zip(compiled_signatures()) {
            for m in regex.find_iter(text) {
                let context = extract_context(text, m.start(), signature.context_words);
                let dedupe_key = format!(
                    "{}:{}",
                    signature.category,
                    context.chars().take(100).collect::<String>()
                );
                if !seen.insert(dedupe_key) {
                    continue;
                }

                failures.push(DetectedFailure {
                    category: signature.category.to_string(),
                    pattern: m.as_str().to_string(),
                    timestamp: Utc::now(),
                    severity: signature.severity,
                    context,
                    suggestion: Some(signature.suggestion.to_string()),
                    tool: tool.map(ToString::to_string),
                });
            }
        }

        failures.sort_by(|a, b| {
            b.severity
                .rank()
                .cmp(&a.severity.rank())
                .then_with(|| a.category.cmp(&b.category))
        });

        debug!(
            total = failures.len(),
            critical = failures
                .iter()
                .filter(|f| f.severity == Severity::Critical)
                .count(),
            "failure scan complete"
        );

        failures
    }

    /// Whether any critical failure is present.
    #[must_use]
    pub fn has_critical(&self, failures: &[DetectedFailure]) -> bool {
        failures.iter().any(|f| f.severity == Severity::Critical)
    }

    /// Failures of one severity.
    #[must_use]
    pub fn by_severity<'a>(
        &self,
        failures: &'a [DetectedFailure],
        severity: Severity,
    ) -> Vec<&'a DetectedFailure> {
        failures.iter().filter(|f| f.severity == severity).collect()
    }

    /// Failures of one category.
    #[must_use]
    pub fn by_category<'a>(
        &self,
        failures: &'a [DetectedFailure],
        category: &str,
    ) -> Vec<&'a DetectedFailure> {
        failures.iter().filter(|f| f.category == category).collect()
    }

    /// Human-readable report grouped by severity.
    #[must_use]
    pub fn format_report(&self, failures: &[DetectedFailure]) -> String {
        if failures.is_empty() {
            return "No failures detected".to_string();
        }

        let mut lines = vec![format!("Detected {} potential failure(s):", failures.len())];
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ] {
            let group = self.by_severity(failures, severity);
            if group.is_empty() {
                continue;
            }
            lines.push(format!(
                "{} ({} issues):",
                severity.as_str().to_uppercase(),
                group.len()
            ));
            for f in group {
                lines.push(format!("  [{}] pattern: '{}'", f.category, f.pattern));
                if let Some(suggestion) = &f.suggestion {
                    lines.push(format!("    -> {suggestion}"));
                }
            }
        }
        lines.join("\n")
    }

    /// Catalogue statistics.
    #[must_use]
    pub fn stats(&self) -> DetectorStats {
        let mut severity_distribution = BTreeMap::new();
        for signature in SIGNATURES {
            *severity_distribution
                .entry(signature.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        DetectorStats {
            total_patterns: SIGNATURES.len(),
            categories: SIGNATURES.iter().map(|s| s.category.to_string()).collect(),
            severity_distribution,
        }
    }
}

/// Window of `context_words` words centred on the match position, capped at
/// 200 characters. Falls back to a raw byte window when word mapping fails.
fn extract_context(text: &str, position: usize, context_words: usize) -> String {
    let mut words: Vec<(usize, usize, &str)> = Vec::new();
    let mut offset = 0;
    for word in text.split_whitespace() {
        if let Some(found) = text[offset..].find(word) {
            let start = offset + found;
            words.push((start, start + word.len(), word));
            offset = start + word.len();
        }
    }

    for (i, &(start, end, _)) in words.iter().enumerate() {
        if start <= position && position <= end {
            let lo = i.saturating_sub(context_words / 2);
            let hi = (i + context_words / 2).min(words.len());
            let joined = words[lo..hi]
                .iter()
                .map(|w| w.2)
                .collect::<Vec<_>>()
                .join(" ");
            return joined.chars().take(200).collect();
        }
    }

    // Byte-window fallback, clamped to char boundaries.
    let mut lo = position.saturating_sub(100);
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (position + 100).min(text.len());
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    text[lo..hi].to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
