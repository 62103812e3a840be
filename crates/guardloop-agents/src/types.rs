//! Reviewer input and output types.

use serde::{Deserialize, Serialize};

use guardloop_analysis::{DetectedFailure, ParsedResponse, Violation};
use guardloop_core::Mode;

/// Everything a reviewer may inspect.
#[derive(Clone, Debug, Default)]
pub struct AgentContext {
    /// The user's prompt.
    pub prompt: String,
    /// Enforcement posture.
    pub mode: Mode,
    /// Parsed tool output.
    pub parsed: ParsedResponse,
    /// Violations found so far.
    pub violations: Vec<Violation>,
    /// Failures found so far.
    pub failures: Vec<DetectedFailure>,
    /// Raw tool output.
    pub raw_output: String,
    /// Wrapped tool name.
    pub tool: String,
}

/// A reviewer's verdict.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentDecision {
    /// Reviewer name.
    pub agent_name: String,
    /// Whether the response passes this reviewer.
    pub approved: bool,
    /// One-line verdict.
    pub reason: String,
    /// Improvement suggestions (also for approved responses).
    pub suggestions: Vec<String>,
    /// Reviewer the chain should visit next, when suggested.
    pub next_agent: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Confidence from check outcomes.
///
/// `1 - (issues/checks)·0.3` when approved, `0.5 + (issues/checks)·0.3`
/// otherwise.
#[must_use]
pub fn decision_confidence(approved: bool, issues: usize, total_checks: usize) -> f64 {
    if total_checks == 0 {
        return 1.0;
    }
    let ratio = issues as f64 / total_checks as f64;
    if approved {
        1.0 - ratio * 0.3
    } else {
        0.5 + ratio * 0.3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_with_no_checks_is_full() {
        assert!((decision_confidence(true, 0, 0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn approved_confidence_decreases_with_issues() {
        let clean = decision_confidence(true, 0, 5);
        let noisy = decision_confidence(true, 3, 5);
        assert!(clean > noisy);
        assert!((clean - 1.0).abs() < f64::EPSILON);
        assert!((noisy - 0.82).abs() < 1e-9);
    }

    #[test]
    fn rejected_confidence_grows_with_issues() {
        let weak = decision_confidence(false, 1, 5);
        let strong = decision_confidence(false, 5, 5);
        assert!(strong > weak);
        assert!((strong - 0.8).abs() < 1e-9);
    }
}
