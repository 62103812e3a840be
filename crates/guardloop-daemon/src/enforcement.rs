//! Pure enforcement decision.

use tracing::{info, warn};

use guardloop_analysis::{DetectedFailure, Violation};
use guardloop_core::{Mode, Severity};

/// Decide approval for `(mode, violations, failures)`.
///
/// Standard mode always approves and only logs counts; strict mode denies
/// iff any violation or failure is critical. Denied requests still carry
/// their full result back to the caller.
#[must_use]
pub fn enforce(mode: Mode, violations: &[Violation], failures: &[DetectedFailure]) -> bool {
    match mode {
        Mode::Strict => {
            let critical_violations = violations
                .iter()
                .filter(|v| v.severity == Severity::Critical)
                .count();
            let critical_failures = failures
                .iter()
                .filter(|f| f.severity == Severity::Critical)
                .count();
            let blocked = critical_violations > 0 || critical_failures > 0;
            if blocked {
                warn!(
                    critical_violations,
                    critical_failures, "request blocked in strict mode"
                );
            }
            !blocked
        }
        Mode::Standard => {
            if !violations.is_empty() || !failures.is_empty() {
                info!(
                    violations = violations.len(),
                    failures = failures.len(),
                    "violations/failures detected in standard mode"
                );
            }
            true
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
