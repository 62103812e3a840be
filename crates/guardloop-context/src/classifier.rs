//! Prompt task classification.
//!
//! Pure and side-effect free: weighted keyword lexicons, a fixed syntactic
//! regex set, and extension scoring combine into per-type scores; the first
//! matching decision rule wins.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use guardloop_core::TaskType;

/// Feature score breakdown produced by the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFeatures {
    /// Average weight of matched code-lexicon keywords.
    pub code_keywords: f64,
    /// Average weight of matched content-lexicon keywords.
    pub content_keywords: f64,
    /// Average weight of matched creative-lexicon keywords.
    pub creative_keywords: f64,
    /// Fraction of the syntactic regex set that matched.
    pub code_patterns: f64,
    /// Extension score: +1 code, +0.5 content, -0.5 creative, 0 none.
    pub file_extensions: f64,
}

/// Classifier verdict.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskClassification {
    /// The label.
    pub task_type: TaskType,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether the pipeline must inject guardrails.
    pub requires_guardrails: bool,
    /// Feature score breakdown.
    pub features: TaskFeatures,
    /// One-line justification.
    pub reasoning: String,
}

const CODE_KEYWORDS: &[(&str, f64)] = &[
    ("implement", 0.9),
    ("code", 0.8),
    ("function", 0.8),
    ("class", 0.7),
    ("method", 0.7),
    ("api", 0.8),
    ("endpoint", 0.8),
    ("database", 0.7),
    ("authentication", 0.9),
    ("authorization", 0.9),
    ("refactor", 0.7),
    ("optimize", 0.6),
    ("debug", 0.8),
    ("fix bug", 0.9),
    ("test", 0.6),
    ("deploy", 0.7),
    ("algorithm", 0.7),
    ("data structure", 0.8),
    ("async", 0.7),
    ("promise", 0.6),
    ("callback", 0.6),
    ("exception", 0.7),
    ("import", 0.5),
    ("module", 0.6),
    ("package", 0.6),
    ("react", 0.6),
    ("vue", 0.6),
    ("angular", 0.6),
    ("django", 0.7),
    ("flask", 0.7),
    ("fastapi", 0.7),
    ("express", 0.6),
    ("typescript", 0.7),
    ("python", 0.6),
    ("javascript", 0.6),
];

const CONTENT_KEYWORDS: &[(&str, f64)] = &[
    ("write", 0.7),
    ("article", 0.9),
    ("blog", 0.9),
    ("post", 0.7),
    ("documentation", 0.8),
    ("guide", 0.8),
    ("tutorial", 0.8),
    ("readme", 0.9),
    ("explain", 0.7),
    ("describe", 0.7),
    ("summarize", 0.8),
    ("paragraph", 0.9),
    ("section", 0.6),
    ("content", 0.6),
];

const CREATIVE_KEYWORDS: &[(&str, f64)] = &[
    ("create", 0.6),
    ("design", 0.7),
    ("infographic", 0.9),
    ("illustration", 0.9),
    ("logo", 0.9),
    ("banner", 0.8),
    ("poster", 0.9),
    ("flyer", 0.9),
    ("brochure", 0.9),
    ("visual", 0.8),
    ("graphic", 0.8),
    ("artistic", 0.9),
    ("creative", 0.9),
    ("poem", 0.9),
    ("story", 0.7),
    ("mockup", 0.8),
    ("wireframe", 0.7),
    ("prototype", 0.6),
    ("html page", 0.5),
    ("landing page", 0.5),
];

const CODE_PATTERNS: &[&str] = &[
    r"\bdef\s+\w+",
    r"\bfunction\s+\w+",
    r"\bclass\s+\w+",
    r"\b(async|await)\b",
    r"\b(import|from)\s+\w+",
    r"\b(if|else|for|while)\b",
    r"[{}\[\]();]",
    r"===|!==|&&|\|\|",
    r"@\w+",
];

const CODE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".jsx", ".tsx", ".go", ".java", ".cpp", ".c", ".rs", ".rb", ".php",
];
const CONTENT_EXTENSIONS: &[&str] = &[".md", ".txt", ".rst", ".adoc"];
const CREATIVE_EXTENSIONS: &[&str] = &[".html", ".svg", ".css", ".scss"];

fn code_pattern_regexes() -> &'static Vec<Regex> {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        CODE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("static classifier regex"))
            .collect()
    })
}

/// Classifies prompts into task types to decide guardrail injection.
///
/// Keyword evidence alone tops out at a combined score of 0.5 (its weight
/// in the blend), so the default code threshold sits below that; syntax
/// patterns and file extensions push clear code prompts well past it.
#[derive(Clone, Copy, Debug)]
pub struct TaskClassifier {
    code_threshold: f64,
    creative_threshold: f64,
    content_threshold: f64,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self {
            code_threshold: 0.45,
            creative_threshold: 0.7,
            content_threshold: 0.5,
        }
    }
}

impl TaskClassifier {
    /// Classifier with the default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with custom thresholds.
    #[must_use]
    pub fn with_thresholds(code_threshold: f64, creative_threshold: f64) -> Self {
        Self {
            code_threshold,
            creative_threshold,
            ..Self::default()
        }
    }

    /// Classify a prompt.
    #[must_use]
    pub fn classify(&self, prompt: &str) -> TaskClassification {
        let prompt_lower = prompt.to_lowercase();

        let features = TaskFeatures {
            code_keywords: score_keywords(&prompt_lower, CODE_KEYWORDS),
            content_keywords: score_keywords(&prompt_lower, CONTENT_KEYWORDS),
            creative_keywords: score_keywords(&prompt_lower, CREATIVE_KEYWORDS),
            code_patterns: score_patterns(prompt),
            file_extensions: score_extensions(&prompt_lower),
        };

        let code_score = features.code_keywords * 0.5
            + features.code_patterns * 0.3
            + features.file_extensions.max(0.0) * 0.2;
        let creative_bonus = if prompt_lower.contains(".html") || prompt_lower.contains(".svg") {
            0.2
        } else {
            0.0
        };
        let creative_score = features.creative_keywords * 0.8 + creative_bonus;
        let content_score = features.content_keywords * 0.7;

        let classification =
            self.decide(code_score, creative_score, content_score, features);

        debug!(
            task_type = %classification.task_type,
            confidence = classification.confidence,
            requires_guardrails = classification.requires_guardrails,
            "task classified"
        );

        classification
    }

    /// First decision rule that matches wins; unknown requires guardrails.
    fn decide(
        &self,
        code: f64,
        creative: f64,
        content: f64,
        features: TaskFeatures,
    ) -> TaskClassification {
        if code >= self.code_threshold {
            return TaskClassification {
                task_type: TaskType::Code,
                confidence: code,
                requires_guardrails: true,
                features,
                reasoning: format!("High code score ({code:.2}), guardrails required"),
            };
        }
        if creative >= self.creative_threshold {
            return TaskClassification {
                task_type: TaskType::Creative,
                confidence: creative,
                requires_guardrails: false,
                features,
                reasoning: format!("Creative task detected ({creative:.2}), skipping guardrails"),
            };
        }
        if content >= self.content_threshold {
            return TaskClassification {
                task_type: TaskType::Content,
                confidence: content,
                requires_guardrails: false,
                features,
                reasoning: format!("Content task detected ({content:.2}), skipping guardrails"),
            };
        }
        if code > 0.3 && (creative > 0.3 || content > 0.3) {
            let confidence = code.max(creative).max(content);
            return TaskClassification {
                task_type: TaskType::Mixed,
                confidence,
                requires_guardrails: true,
                features,
                reasoning: format!(
                    "Mixed task type (code: {code:.2}, creative: {creative:.2}, \
                     content: {content:.2}), applying guardrails"
                ),
            };
        }
        TaskClassification {
            task_type: TaskType::Unknown,
            confidence: 0.5,
            requires_guardrails: true,
            features,
            reasoning: "Task type unclear, applying guardrails as safety measure".to_string(),
        }
    }
}

/// Average weight of matched keywords, capped at 1.0.
fn score_keywords(text: &str, keywords: &[(&str, f64)]) -> f64 {
    let mut total = 0.0;
    let mut matches = 0usize;
    for (keyword, weight) in keywords {
        if text.contains(keyword) {
            total += weight;
            matches += 1;
        }
    }
    if matches == 0 {
        0.0
    } else {
        (total / matches as f64).min(1.0)
    }
}

/// Fraction of syntactic patterns that matched.
fn score_patterns(text: &str) -> f64 {
    let matched = code_pattern_regexes()
        .iter()
        .filter(|re| re.is_match(text))
        .count();
    (matched as f64 / CODE_PATTERNS.len() as f64).min(1.0)
}

/// Extension score: code dominates, then content, then creative (negative).
fn score_extensions(text: &str) -> f64 {
    if CODE_EXTENSIONS.iter().any(|ext| text.contains(ext)) {
        return 1.0;
    }
    if CONTENT_EXTENSIONS.iter().any(|ext| text.contains(ext)) {
        return 0.5;
    }
    if CREATIVE_EXTENSIONS.iter().any(|ext| text.contains(ext)) {
        return -0.5;
    }
    0.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
