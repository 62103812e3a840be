//! Version-string normalisation.

use std::sync::OnceLock;

use regex::Regex;

fn version_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)version\s+([0-9.]+)").expect("static regex"),
            Regex::new(r"(?i)v([0-9.]+)").expect("static regex"),
            Regex::new(r"([0-9]+\.[0-9]+\.[0-9]+)").expect("static regex"),
        ]
    })
}

/// Extract a version number from `--version` output.
///
/// Tries the known forms in order; falls back to the first 50 characters of
/// the trimmed output when nothing matches.
#[must_use]
pub fn parse_version(version_output: &str) -> String {
    for pattern in version_patterns() {
        if let Some(captures) = pattern.captures(version_output) {
            if let Some(m) = captures.get(1) {
                return m.as_str().to_string();
            }
        }
    }
    let trimmed = version_output.trim();
    trimmed.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_word_form() {
        assert_eq!(parse_version("claude version 1.2.3 (stable)"), "1.2.3");
    }

    #[test]
    fn parses_v_prefix_form() {
        assert_eq!(parse_version("gemini v0.9"), "0.9");
    }

    #[test]
    fn parses_bare_semver() {
        assert_eq!(parse_version("codex 2.10.4"), "2.10.4");
    }

    #[test]
    fn falls_back_to_prefix() {
        assert_eq!(parse_version("  mystery build  "), "mystery build");
    }
}
