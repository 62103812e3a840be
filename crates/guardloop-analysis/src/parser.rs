//! Total parser for AI tool output.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A fenced code block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Lower-cased language tag; `text` when absent.
    pub language: String,
    /// Block body, trimmed.
    pub content: String,
    /// Path found in the block's first-line comment, if any.
    pub file_path: Option<String>,
}

/// Signal flags and free-text sections extracted alongside the structure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// `Reasoning:` section, if present.
    pub reasoning: Option<String>,
    /// `Decision:` section, if present.
    pub decision: Option<String>,
    /// `Analysis:` section, if present.
    pub analysis: Option<String>,
    /// Security lexemes present anywhere.
    pub has_security_mentions: bool,
    /// Test lexemes present anywhere.
    pub has_test_mentions: bool,
    /// Error-handling lexemes present anywhere.
    pub has_error_handling: bool,
}

/// Structured data extracted from a raw response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Fenced code blocks in order of appearance.
    pub code_blocks: Vec<CodeBlock>,
    /// Unique plausible file paths, sorted.
    pub file_paths: Vec<String>,
    /// Shell / package-manager commands in order of appearance.
    pub commands: Vec<String>,
    /// Non-code paragraphs of substance.
    pub explanations: Vec<String>,
    /// Coverage percentage when stated and within `[0, 100]`.
    pub test_coverage: Option<f64>,
    /// Signal flags and free-text sections.
    pub metadata: ResponseMetadata,
}

/// Recognised language extensions, used to post-filter path candidates.
const LANGUAGE_EXTENSIONS: &[(&str, &[&str])] = &[
    ("python", &[".py", ".pyw"]),
    ("javascript", &[".js", ".jsx", ".mjs"]),
    ("typescript", &[".ts", ".tsx"]),
    ("java", &[".java"]),
    ("csharp", &[".cs"]),
    ("c", &[".c", ".h"]),
    ("cpp", &[".cpp", ".cc", ".cxx", ".hpp", ".hh"]),
    ("go", &[".go"]),
    ("rust", &[".rs"]),
    ("ruby", &[".rb"]),
    ("php", &[".php"]),
    ("swift", &[".swift"]),
    ("kotlin", &[".kt"]),
    ("sql", &[".sql"]),
    ("html", &[".html", ".htm"]),
    ("css", &[".css", ".scss", ".sass"]),
    ("yaml", &[".yaml", ".yml"]),
    ("json", &[".json"]),
    ("xml", &[".xml"]),
    ("markdown", &[".md"]),
    ("bash", &[".sh", ".bash"]),
];

/// Extra non-language extensions still accepted as file paths.
const TEXT_EXTENSIONS: &[&str] = &[".txt", ".log", ".config", ".env"];

struct Patterns {
    code_block: Regex,
    file_paths: Vec<Regex>,
    commands: Vec<Regex>,
    coverage: Vec<Regex>,
    reasoning: Regex,
    decision: Regex,
    analysis: Regex,
    security: Regex,
    tests: Regex,
    error_handling: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        code_block: Regex::new(r"(?s)```(\w+)?\n(.*?)```").expect("static regex"),
        file_paths: vec![
            Regex::new(r"(?:^|\s)([a-zA-Z]:/\S+)").expect("static regex"),
            Regex::new(r"(?:^|\s)(/\S+\.[a-zA-Z0-9]+)").expect("static regex"),
            Regex::new(r"(?:^|\s)(\.{1,2}/\S+)").expect("static regex"),
            Regex::new(r"(?:File|Path|Location):\s*([^\n]+)").expect("static regex"),
            Regex::new(r"in\s+`?([a-zA-Z_][a-zA-Z0-9_/\\.]+\.[a-zA-Z0-9]+)`?").expect("static regex"),
        ],
        commands: vec![
            Regex::new(r"(?m)^\$\s+(.+)$").expect("static regex"),
            Regex::new(r"(?m)^>\s+(.+)$").expect("static regex"),
            Regex::new(r"(?m)^(?:npm|pip|dotnet|cargo|go)\s+(.+)$").expect("static regex"),
            Regex::new(r"(?mi)Run:\s*`?(.+?)`?$").expect("static regex"),
            Regex::new(r"(?mi)Execute:\s*`?(.+?)`?$").expect("static regex"),
        ],
        coverage: vec![
            Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*coverage").expect("static regex"),
            Regex::new(r"(?i)coverage(?:\s+is)?\s*:?\s*(\d+(?:\.\d+)?)\s*%").expect("static regex"),
            Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*tested").expect("static regex"),
        ],
        reasoning: Regex::new(r"(?si)Reasoning:\s*(.+?)(?:\n\n|\z)").expect("static regex"),
        decision: Regex::new(r"(?si)Decision:\s*(.+?)(?:\n\n|\z)").expect("static regex"),
        analysis: Regex::new(r"(?si)Analysis:\s*(.+?)(?:\n\n|\z)").expect("static regex"),
        security: Regex::new(r"(?i)\b(security|authentication|authorization|encryption)\b")
            .expect("static regex"),
        tests: Regex::new(r"(?i)\b(test|testing|unit test|e2e|integration test)\b")
            .expect("static regex"),
        error_handling: Regex::new(r"(?i)\b(try|catch|error|exception|handle)\b")
            .expect("static regex"),
    })
}

/// Parser for AI tool responses. Total: never fails on any input.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Create a parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw response into structured data.
    #[must_use]
    pub fn parse(&self, text: &str) -> ParsedResponse {
        let response = ParsedResponse {
            code_blocks: self.extract_code_blocks(text),
            file_paths: self.extract_file_paths(text),
            commands: self.extract_commands(text),
            explanations: self.extract_explanations(text),
            test_coverage: self.extract_test_coverage(text),
            metadata: self.extract_metadata(text),
        };

        debug!(
            code_blocks = response.code_blocks.len(),
            file_paths = response.file_paths.len(),
            commands = response.commands.len(),
            coverage = response.test_coverage,
            "response parsed"
        );

        response
    }

    /// Extract fenced code blocks, scanning the first line for a file path.
    #[must_use]
    pub fn extract_code_blocks(&self, text: &str) -> Vec<CodeBlock> {
        patterns()
            .code_block
            .captures_iter(text)
            .map(|caps| {
                let language = caps
                    .get(1)
                    .map_or_else(|| "text".to_string(), |m| m.as_str().to_lowercase());
                let content = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
                let first_line = content.lines().next().unwrap_or("");
                let file_path = patterns()
                    .file_paths
                    .iter()
                    .find_map(|p| p.captures(first_line))
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string());
                CodeBlock {
                    language,
                    content,
                    file_path,
                }
            })
            .collect()
    }

    /// Extract unique plausible file paths, sorted.
    #[must_use]
    pub fn extract_file_paths(&self, text: &str) -> Vec<String> {
        let mut paths = BTreeSet::new();
        for pattern in &patterns().file_paths {
            for caps in pattern.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    let path = m.as_str().trim();
                    if is_valid_file_path(path) {
                        let _ = paths.insert(path.to_string());
                    }
                }
            }
        }
        paths.into_iter().collect()
    }

    /// Extract shell and package-manager commands.
    #[must_use]
    pub fn extract_commands(&self, text: &str) -> Vec<String> {
        let mut commands = Vec::new();
        for pattern in &patterns().commands {
            for caps in pattern.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    let command = m.as_str().trim();
                    if command.len() > 2 {
                        commands.push(command.to_string());
                    }
                }
            }
        }
        commands
    }

    /// Extract a coverage percentage near `coverage`/`tested`; accepted iff
    /// within `[0, 100]`.
    #[must_use]
    pub fn extract_test_coverage(&self, text: &str) -> Option<f64> {
        for pattern in &patterns().coverage {
            if let Some(caps) = pattern.captures(text) {
                if let Ok(value) = caps.get(1)?.as_str().parse::<f64>() {
                    if (0.0..=100.0).contains(&value) {
                        return Some(value);
                    }
                }
            }
        }
        None
    }

    /// Extract non-code paragraphs of length ≥ 20 that don't look like
    /// commands.
    #[must_use]
    pub fn extract_explanations(&self, text: &str) -> Vec<String> {
        let without_code = patterns().code_block.replace_all(text, "");
        without_code
            .split("\n\n")
            .map(str::trim)
            .filter(|p| p.len() > 20 && !is_command_like(p))
            .map(ToString::to_string)
            .collect()
    }

    fn extract_metadata(&self, text: &str) -> ResponseMetadata {
        let section = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        };
        ResponseMetadata {
            reasoning: section(&patterns().reasoning),
            decision: section(&patterns().decision),
            analysis: section(&patterns().analysis),
            has_security_mentions: patterns().security.is_match(text),
            has_test_mentions: patterns().tests.is_match(text),
            has_error_handling: patterns().error_handling.is_match(text),
        }
    }

    /// Determine the language a file path implies, if recognised.
    #[must_use]
    pub fn language_for_path(&self, file_path: &str) -> Option<&'static str> {
        let ext = extension_of(file_path)?;
        LANGUAGE_EXTENSIONS
            .iter()
            .find(|(_, exts)| exts.contains(&ext.as_str()))
            .map(|(lang, _)| *lang)
    }
}

fn extension_of(path: &str) -> Option<String> {
    let idx = path.rfind('.')?;
    Some(path[idx..].to_lowercase())
}

fn is_valid_file_path(path: &str) -> bool {
    if path.len() < 3 || !path.contains('.') {
        return false;
    }
    if path.contains(' ') && !path.starts_with('/') {
        return false;
    }
    let Some(ext) = extension_of(path) else {
        return false;
    };
    LANGUAGE_EXTENSIONS
        .iter()
        .any(|(_, exts)| exts.contains(&ext.as_str()))
        || TEXT_EXTENSIONS.contains(&ext.as_str())
}

fn is_command_like(text: &str) -> bool {
    !text.contains('\n')
        && ["$", ">", "npm", "pip", "dotnet", "cargo", "go"]
            .iter()
            .any(|prefix| text.starts_with(prefix))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
