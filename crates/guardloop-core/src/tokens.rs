//! Fallback token estimation.
//!
//! GuardLoop never tokenises for real; every budget decision uses the same
//! chars/4 approximation so estimates stay comparable across components.

/// Average characters per token assumed by the estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a string as `len / 4`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn remainder_truncates() {
        assert_eq!(estimate_tokens("abcdefg"), 1);
    }
}
