//! Row types and insert parameter structs.
//!
//! Enum columns round-trip through their stable SQL tokens; JSON columns are
//! stored as TEXT and parsed leniently on read (a corrupt metadata blob
//! degrades to `None`, it does not poison the row).

use rusqlite::Row;
use serde::{Deserialize, Serialize};

use guardloop_core::{
    ContextType, EnforcementMode, GuardrailType, Role, RuleStatus, Severity, TaskType,
};

/// Convert a TEXT enum column, surfacing unknown tokens as a conversion error.
pub(crate) fn enum_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: for<'a> TryFrom<&'a str, Error = String>,
{
    T::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(e),
        )
    })
}

/// Parse an optional JSON TEXT column leniently.
pub(crate) fn json_column(value: Option<String>) -> Option<serde_json::Value> {
    value.and_then(|s| serde_json::from_str(&s).ok())
}

/// Serialize a JSON value for storage.
pub(crate) fn json_to_sql(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted request session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    /// Session identifier (UUID v7).
    pub id: String,
    /// Request entry time.
    pub timestamp: String,
    /// Wrapped tool name.
    pub tool: String,
    /// Chosen agent or `auto`.
    pub agent: String,
    /// Enforcement mode at request time.
    pub mode: String,
    /// Original prompt (bounded).
    pub prompt: String,
    /// Augmented prompt (bounded).
    pub augmented_prompt: Option<String>,
    /// Raw tool output (bounded).
    pub raw_output: Option<String>,
    /// Structured parsed output.
    pub parsed_output: Option<serde_json::Value>,
    /// Violations recorded against this session.
    pub violations_count: i64,
    /// Failures recorded against this session.
    pub failures_count: i64,
    /// Enforcement decision.
    pub approved: bool,
    /// Wall-clock execution time.
    pub execution_time_ms: Option<i64>,
}

impl SessionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            timestamp: row.get("timestamp")?,
            tool: row.get("tool")?,
            agent: row.get("agent")?,
            mode: row.get("mode")?,
            prompt: row.get("prompt")?,
            augmented_prompt: row.get("augmented_prompt")?,
            raw_output: row.get("raw_output")?,
            parsed_output: json_column(row.get("parsed_output")?),
            violations_count: row.get("violations_count")?,
            failures_count: row.get("failures_count")?,
            approved: row.get("approved")?,
            execution_time_ms: row.get("execution_time_ms")?,
        })
    }
}

/// Parameters for inserting a session.
#[derive(Clone, Debug)]
pub struct NewSession {
    /// Session identifier.
    pub id: String,
    /// Request entry time.
    pub timestamp: String,
    /// Wrapped tool name.
    pub tool: String,
    /// Chosen agent or `auto`.
    pub agent: String,
    /// Enforcement mode.
    pub mode: guardloop_core::Mode,
    /// Original prompt, already bounded by the caller.
    pub prompt: String,
    /// Augmented prompt, already bounded by the caller.
    pub augmented_prompt: Option<String>,
    /// Raw tool output, already bounded by the caller.
    pub raw_output: Option<String>,
    /// Structured parsed output.
    pub parsed_output: Option<serde_json::Value>,
    /// Violation count.
    pub violations_count: i64,
    /// Failure count.
    pub failures_count: i64,
    /// Enforcement decision.
    pub approved: bool,
    /// Wall-clock execution time.
    pub execution_time_ms: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted detected failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureRow {
    /// Surrogate id.
    pub id: i64,
    /// Owning session, if recorded in-pipeline.
    pub session_id: Option<String>,
    /// Detection time.
    pub timestamp: String,
    /// Tool that produced the output.
    pub tool: String,
    /// Failure category.
    pub category: String,
    /// Matched pattern snippet.
    pub pattern: String,
    /// Surrounding context window.
    pub context: Option<String>,
    /// Severity.
    pub severity: Severity,
    /// Remediation suggestion.
    pub suggestion: Option<String>,
    /// Whether a human marked this resolved.
    pub resolved: bool,
    /// Free-form resolution notes.
    pub resolution_notes: Option<String>,
}

impl FailureRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let severity: String = row.get("severity")?;
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            timestamp: row.get("timestamp")?,
            tool: row.get("tool")?,
            category: row.get("category")?,
            pattern: row.get("pattern")?,
            context: row.get("context")?,
            severity: enum_column(7, &severity)?,
            suggestion: row.get("suggestion")?,
            resolved: row.get("resolved")?,
            resolution_notes: row.get("resolution_notes")?,
        })
    }
}

/// Parameters for inserting a failure.
#[derive(Clone, Debug)]
pub struct NewFailure {
    /// Owning session.
    pub session_id: Option<String>,
    /// Tool that produced the output.
    pub tool: String,
    /// Failure category.
    pub category: String,
    /// Matched pattern snippet.
    pub pattern: String,
    /// Surrounding context window.
    pub context: Option<String>,
    /// Severity.
    pub severity: Severity,
    /// Remediation suggestion.
    pub suggestion: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Violations
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted policy violation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViolationRow {
    /// Surrogate id.
    pub id: i64,
    /// Owning session.
    pub session_id: String,
    /// Detection time.
    pub timestamp: String,
    /// Rule group.
    pub guardrail_type: GuardrailType,
    /// Rule identifier.
    pub rule: String,
    /// Severity.
    pub severity: Severity,
    /// What went wrong.
    pub description: String,
    /// How to fix it.
    pub suggestion: Option<String>,
    /// Offending file, when known.
    pub file_path: Option<String>,
    /// Offending line, when known.
    pub line_number: Option<i64>,
}

impl ViolationRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let guardrail_type: String = row.get("guardrail_type")?;
        let severity: String = row.get("severity")?;
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            timestamp: row.get("timestamp")?,
            guardrail_type: enum_column(3, &guardrail_type)?,
            rule: row.get("rule")?,
            severity: enum_column(5, &severity)?,
            description: row.get("description")?,
            suggestion: row.get("suggestion")?,
            file_path: row.get("file_path")?,
            line_number: row.get("line_number")?,
        })
    }
}

/// Parameters for inserting a violation.
#[derive(Clone, Debug)]
pub struct NewViolation {
    /// Owning session.
    pub session_id: String,
    /// Rule group.
    pub guardrail_type: GuardrailType,
    /// Rule identifier.
    pub rule: String,
    /// Severity.
    pub severity: Severity,
    /// What went wrong.
    pub description: String,
    /// How to fix it.
    pub suggestion: Option<String>,
    /// Offending file, when known.
    pub file_path: Option<String>,
    /// Offending line, when known.
    pub line_number: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent activity & context tracking
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for recording one reviewer invocation.
#[derive(Clone, Debug)]
pub struct NewAgentActivity {
    /// Owning session.
    pub session_id: Option<String>,
    /// Reviewer name.
    pub agent: String,
    /// What the reviewer did.
    pub action: String,
    /// Whether it approved.
    pub success: bool,
    /// Reviewer wall-clock time.
    pub execution_time_ms: Option<i64>,
    /// Error, if the reviewer itself failed.
    pub error_message: Option<String>,
    /// Structured extras.
    pub metadata: Option<serde_json::Value>,
}

/// Parameters for recording a context injection.
#[derive(Clone, Debug)]
pub struct NewContextTracking {
    /// Owning session.
    pub session_id: String,
    /// Kind of payload injected.
    pub context_type: ContextType,
    /// The payload.
    pub context_data: serde_json::Value,
    /// Tokens the injection consumed.
    pub tokens_used: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Learned patterns
// ─────────────────────────────────────────────────────────────────────────────

/// A mined failure/violation signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnedPatternRow {
    /// Surrogate id.
    pub id: i64,
    /// Deterministic SHA-256 of the signature.
    pub pattern_hash: String,
    /// Source category.
    pub category: String,
    /// `category::pattern` signature.
    pub signature: String,
    /// Human-readable description.
    pub description: String,
    /// Occurrences inside the analysis window.
    pub frequency: i64,
    /// Max severity across members.
    pub severity: Severity,
    /// Earliest member timestamp.
    pub first_seen: String,
    /// Latest member timestamp.
    pub last_seen: String,
    /// Mining confidence in `[0, 1]`.
    pub confidence: f64,
    /// Up to five exemplar session ids.
    pub example_sessions: Vec<String>,
    /// Structured extras.
    pub metadata: Option<serde_json::Value>,
}

impl LearnedPatternRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let severity: String = row.get("severity")?;
        let examples: Option<String> = row.get("example_sessions")?;
        Ok(Self {
            id: row.get("id")?,
            pattern_hash: row.get("pattern_hash")?,
            category: row.get("category")?,
            signature: row.get("signature")?,
            description: row.get("description")?,
            frequency: row.get("frequency")?,
            severity: enum_column(6, &severity)?,
            first_seen: row.get("first_seen")?,
            last_seen: row.get("last_seen")?,
            confidence: row.get("confidence")?,
            example_sessions: examples
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            metadata: json_column(row.get("metadata")?),
        })
    }
}

/// Parameters for inserting a learned pattern.
#[derive(Clone, Debug)]
pub struct NewLearnedPattern {
    /// Deterministic SHA-256 of the signature.
    pub pattern_hash: String,
    /// Source category.
    pub category: String,
    /// `category::pattern` signature.
    pub signature: String,
    /// Human-readable description.
    pub description: String,
    /// Occurrences inside the analysis window.
    pub frequency: i64,
    /// Max severity across members.
    pub severity: Severity,
    /// Earliest member timestamp.
    pub first_seen: String,
    /// Latest member timestamp.
    pub last_seen: String,
    /// Mining confidence.
    pub confidence: f64,
    /// Up to five exemplar session ids.
    pub example_sessions: Vec<String>,
    /// Structured extras.
    pub metadata: Option<serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dynamic guardrails & effectiveness
// ─────────────────────────────────────────────────────────────────────────────

/// A rule synthesised from a learned pattern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DynamicGuardrailRow {
    /// Surrogate id.
    pub id: i64,
    /// Source pattern.
    pub pattern_id: i64,
    /// Natural-language rule text.
    pub rule_text: String,
    /// Rule category (inherited from the pattern).
    pub category: String,
    /// Confidence inherited at mint time.
    pub confidence: f64,
    /// Lifecycle status.
    pub status: RuleStatus,
    /// Enforcement when triggered.
    pub enforcement_mode: EnforcementMode,
    /// Task types the rule applies to.
    pub task_types: Vec<TaskType>,
    /// Creator label.
    pub created_by: String,
    /// Mint time.
    pub created_at: String,
    /// Activation time.
    pub activated_at: Option<String>,
    /// Deactivation time (set exactly once, at deprecation).
    pub deactivated_at: Option<String>,
    /// Structured extras.
    pub metadata: Option<serde_json::Value>,
}

impl DynamicGuardrailRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get("status")?;
        let enforcement: String = row.get("enforcement_mode")?;
        let task_types: Option<String> = row.get("task_types")?;
        let task_types: Vec<String> = task_types
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Ok(Self {
            id: row.get("id")?,
            pattern_id: row.get("pattern_id")?,
            rule_text: row.get("rule_text")?,
            category: row.get("category")?,
            confidence: row.get("confidence")?,
            status: enum_column(5, &status)?,
            enforcement_mode: enum_column(6, &enforcement)?,
            task_types: task_types
                .iter()
                .filter_map(|t| TaskType::try_from(t.as_str()).ok())
                .collect(),
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            activated_at: row.get("activated_at")?,
            deactivated_at: row.get("deactivated_at")?,
            metadata: json_column(row.get("metadata")?),
        })
    }
}

/// Parameters for minting a dynamic guardrail.
#[derive(Clone, Debug)]
pub struct NewDynamicGuardrail {
    /// Source pattern.
    pub pattern_id: i64,
    /// Natural-language rule text.
    pub rule_text: String,
    /// Rule category.
    pub category: String,
    /// Confidence inherited from the pattern.
    pub confidence: f64,
    /// Enforcement when triggered.
    pub enforcement_mode: EnforcementMode,
    /// Task types the rule applies to.
    pub task_types: Vec<TaskType>,
    /// Creator label.
    pub created_by: String,
    /// Structured extras.
    pub metadata: Option<serde_json::Value>,
}

/// Lifetime effectiveness totals for one rule.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct EffectivenessTotals {
    /// Total times the rule triggered.
    pub times_triggered: i64,
    /// Failures the rule prevented.
    pub prevented_failures: i64,
    /// Correct triggers.
    pub true_positives: i64,
    /// Incorrect triggers.
    pub false_positives: i64,
}

impl EffectivenessTotals {
    /// `(prevented - false_positives) / triggered`, or 0 when untriggered.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.times_triggered == 0 {
            return 0.0;
        }
        (self.prevented_failures - self.false_positives) as f64 / self.times_triggered as f64
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation turns & classifications
// ─────────────────────────────────────────────────────────────────────────────

/// One persisted conversation turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurnRow {
    /// Owning conversation.
    pub conversation_id: String,
    /// Dense 0-based position.
    pub turn_number: i64,
    /// Speaker role.
    pub role: Role,
    /// Turn content.
    pub content: String,
    /// Turn time.
    pub timestamp: String,
    /// Estimated tokens.
    pub tokens_used: i64,
}

impl ConversationTurnRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let role: String = row.get("role")?;
        Ok(Self {
            conversation_id: row.get("conversation_id")?,
            turn_number: row.get("turn_number")?,
            role: enum_column(2, &role)?,
            content: row.get("content")?,
            timestamp: row.get("timestamp")?,
            tokens_used: row.get("tokens_used")?,
        })
    }
}

/// Parameters for recording a task classification.
#[derive(Clone, Debug)]
pub struct NewTaskClassification {
    /// Owning session.
    pub session_id: String,
    /// Classifier label.
    pub task_type: TaskType,
    /// Classifier confidence.
    pub confidence: f64,
    /// Whether guardrails were required.
    pub requires_guardrails: bool,
    /// Feature score breakdown.
    pub features: Option<serde_json::Value>,
}

/// Parameters for the daily metrics rollup.
#[derive(Clone, Debug)]
pub struct MetricsRollup {
    /// Rollup date (`YYYY-MM-DD`).
    pub date: String,
    /// Sessions recorded that day.
    pub total_sessions: i64,
    /// Percentage of approved sessions.
    pub success_rate: f64,
    /// Mean execution time.
    pub avg_execution_time_ms: i64,
    /// Most frequent violation rules.
    pub top_violations: serde_json::Value,
    /// Most frequent failure categories.
    pub top_failures: serde_json::Value,
}
