//! Adapter execution result.

/// Outcome of one tool invocation (after retries).
#[derive(Clone, Debug, Default)]
pub struct AiResponse {
    /// The tool's primary output (stdout, trimmed).
    pub raw_output: String,
    /// Wall-clock time of the final attempt.
    pub execution_time_ms: u64,
    /// Failure description when the tool did not succeed.
    pub error: Option<String>,
    /// Final exit code; zero means success.
    pub exit_code: i32,
    /// Captured stdout, trimmed.
    pub stdout: String,
    /// Captured stderr, trimmed.
    pub stderr: String,
}

impl AiResponse {
    /// Whether the invocation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// A failed response carrying only an error description.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            exit_code: 1,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_zero_exit_and_no_error() {
        let ok = AiResponse {
            raw_output: "out".to_string(),
            ..Default::default()
        };
        assert!(ok.is_success());
        assert!(!AiResponse::failure("boom").is_success());
    }
}
