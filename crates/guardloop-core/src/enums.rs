//! Closed domain enums shared across the pipeline.
//!
//! Every enum here maps to a CHECK-constrained column in the store; unknown
//! values are rejected at parse via `TryFrom<&str>` rather than defaulted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a violation, failure, or learned pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Should be addressed.
    Medium,
    /// Must be addressed.
    High,
    /// Blocks approval under strict mode.
    Critical,
}

impl Severity {
    /// Numeric rank (1-4), used for confidence weighting and ordering.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Severity {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Enforcement posture for a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Advisory: always approve, record findings.
    #[default]
    Standard,
    /// Block on any critical violation or failure.
    Strict,
}

impl Mode {
    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Mode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "standard" => Ok(Self::Standard),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Classifier label for a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Programming work; guardrails required.
    Code,
    /// Prose/documentation; guardrails skipped.
    Content,
    /// Visual/artistic work; guardrails skipped.
    Creative,
    /// Ambiguous blend; guardrails required.
    Mixed,
    /// Unclassifiable; guardrails required (safe default).
    Unknown,
}

impl TaskType {
    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Content => "content",
            Self::Creative => "creative",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "code" => Ok(Self::Code),
            "content" => Ok(Self::Content),
            "creative" => Ok(Self::Creative),
            "mixed" => Ok(Self::Mixed),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Which rule group a violation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailType {
    /// Business/platform standards rules.
    Bpsbs,
    /// AI-output-specific rules.
    Ai,
    /// UX/UI rules.
    UxUi,
    /// Raised by an agent reviewer.
    Agent,
}

impl GuardrailType {
    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bpsbs => "bpsbs",
            Self::Ai => "ai",
            Self::UxUi => "ux_ui",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for GuardrailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for GuardrailType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "bpsbs" => Ok(Self::Bpsbs),
            "ai" => Ok(Self::Ai),
            "ux_ui" => Ok(Self::UxUi),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown guardrail type: {other}")),
        }
    }
}

/// Discrete task complexity used for budgeting and chain selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Typo fixes, docs.
    Simple,
    /// Functions, refactors.
    #[default]
    Medium,
    /// Features, auth flows.
    Complex,
    /// Security, payments.
    Critical,
}

impl Complexity {
    /// Budget multiplier applied to the model's base budget.
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Simple => 0.3,
            Self::Medium => 0.6,
            Self::Complex => 0.9,
            Self::Critical => 1.0,
        }
    }

    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a dynamic guardrail.
///
/// Transitions are monotonic (`trial → validated → enforced`) with
/// `deprecated` terminal from any non-deprecated state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// Newly minted, observed only.
    Trial,
    /// Survived the trial window.
    Validated,
    /// Actively blocking.
    Enforced,
    /// Retired; never reactivated.
    Deprecated,
}

impl RuleStatus {
    /// Whether a transition to `next` is legal.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Trial, Self::Validated)
                | (Self::Validated, Self::Enforced)
                | (Self::Trial | Self::Validated | Self::Enforced, Self::Deprecated)
        )
    }

    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Validated => "validated",
            Self::Enforced => "enforced",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RuleStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "trial" => Ok(Self::Trial),
            "validated" => Ok(Self::Validated),
            "enforced" => Ok(Self::Enforced),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(format!("unknown rule status: {other}")),
        }
    }
}

/// How a dynamic guardrail is enforced when triggered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Surface a warning only.
    Warn,
    /// Attempt automatic correction.
    AutoFix,
    /// Reject the output.
    Block,
}

impl EnforcementMode {
    /// Enforcement derived from pattern severity: low/medium warn,
    /// high auto-fixes, critical blocks.
    #[must_use]
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Low | Severity::Medium => Self::Warn,
            Severity::High => Self::AutoFix,
            Severity::Critical => Self::Block,
        }
    }

    /// Weight used in the composite retrieval priority score.
    #[must_use]
    pub fn priority_weight(self) -> f64 {
        match self {
            Self::Block => 0.5,
            Self::AutoFix => 0.3,
            Self::Warn => 0.1,
        }
    }

    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::AutoFix => "auto_fix",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EnforcementMode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "warn" => Ok(Self::Warn),
            "auto_fix" => Ok(Self::AutoFix),
            "block" => Ok(Self::Block),
            other => Err(format!("unknown enforcement mode: {other}")),
        }
    }
}

/// Role of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human.
    User,
    /// The wrapped tool.
    Assistant,
    /// Injected policy/system content.
    System,
}

impl Role {
    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Kind of context injection recorded against a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// A single file's content.
    File,
    /// A directory listing.
    Directory,
    /// Whole-project metadata.
    Project,
    /// Caller-supplied payload.
    Custom,
}

impl ContextType {
    /// Stable SQL/display token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Project => "project",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ContextType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "file" => Ok(Self::File),
            "directory" => Ok(Self::Directory),
            "project" => Ok(Self::Project),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown context type: {other}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_follows_rank() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Critical.rank(), 4);
    }

    #[test]
    fn severity_rejects_unknown() {
        assert!(Severity::try_from("fatal").is_err());
    }

    #[test]
    fn severity_roundtrip() {
        for s in [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            assert_eq!(Severity::try_from(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn mode_default_is_standard() {
        assert_eq!(Mode::default(), Mode::Standard);
    }

    #[test]
    fn mode_rejects_unknown() {
        assert!(Mode::try_from("paranoid").is_err());
    }

    #[test]
    fn complexity_multipliers() {
        assert!((Complexity::Simple.multiplier() - 0.3).abs() < f64::EPSILON);
        assert!((Complexity::Medium.multiplier() - 0.6).abs() < f64::EPSILON);
        assert!((Complexity::Complex.multiplier() - 0.9).abs() < f64::EPSILON);
        assert!((Complexity::Critical.multiplier() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rule_status_legal_transitions() {
        assert!(RuleStatus::Trial.can_transition(RuleStatus::Validated));
        assert!(RuleStatus::Validated.can_transition(RuleStatus::Enforced));
        assert!(RuleStatus::Trial.can_transition(RuleStatus::Deprecated));
        assert!(RuleStatus::Enforced.can_transition(RuleStatus::Deprecated));
    }

    #[test]
    fn rule_status_illegal_transitions() {
        assert!(!RuleStatus::Trial.can_transition(RuleStatus::Enforced));
        assert!(!RuleStatus::Validated.can_transition(RuleStatus::Trial));
        assert!(!RuleStatus::Enforced.can_transition(RuleStatus::Validated));
        assert!(!RuleStatus::Deprecated.can_transition(RuleStatus::Trial));
        assert!(!RuleStatus::Deprecated.can_transition(RuleStatus::Deprecated));
    }

    #[test]
    fn enforcement_from_severity() {
        assert_eq!(
            EnforcementMode::from_severity(Severity::Low),
            EnforcementMode::Warn
        );
        assert_eq!(
            EnforcementMode::from_severity(Severity::Medium),
            EnforcementMode::Warn
        );
        assert_eq!(
            EnforcementMode::from_severity(Severity::High),
            EnforcementMode::AutoFix
        );
        assert_eq!(
            EnforcementMode::from_severity(Severity::Critical),
            EnforcementMode::Block
        );
    }

    #[test]
    fn serde_tokens_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&GuardrailType::UxUi).unwrap(),
            "\"ux_ui\""
        );
        assert_eq!(
            serde_json::to_string(&EnforcementMode::AutoFix).unwrap(),
            "\"auto_fix\""
        );
    }
}
