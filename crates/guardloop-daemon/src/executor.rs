//! Safe materialisation of files extracted from tool output.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Paths that must never be written, on any platform.
const SYSTEM_PATHS: &[&str] = &[
    "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
    "C:\\Windows", "C:\\Program Files",
];

/// Patterns that deduct safety when present in a path or content.
const DANGEROUS_PATTERNS: &[&str] = &[
    r"\.\./",
    r"\bsudo\b",
    r"\brm\s+-rf\b",
    r"\beval\b",
    r"\bexec\b",
    r"__import__",
    r"\.exe$",
    r"\.bat$",
    r"\.sh$",
];

/// Extensions eligible for writing without suspicion.
const SAFE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".go", ".rs", ".cpp", ".c", ".h", ".css",
    ".scss", ".html", ".json", ".yaml", ".yml", ".md", ".txt", ".sql",
];

const SECRET_PATTERNS: &[&str] = &[
    r#"(?i)password\s*=\s*['"][^'"]+['"]"#,
    r#"(?i)api_key\s*=\s*['"][^'"]+['"]"#,
    r#"(?i)secret\s*=\s*['"][^'"]+['"]"#,
    r#"(?i)token\s*=\s*['"][^'"]+['"]"#,
];

struct ExecutorPatterns {
    fenced_with_path: Regex,
    file_content: Regex,
    save_to: Regex,
    any_fence: Regex,
    dangerous: Vec<Regex>,
    secrets: Vec<Regex>,
}

fn patterns() -> &'static ExecutorPatterns {
    static PATTERNS: OnceLock<ExecutorPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ExecutorPatterns {
        fenced_with_path: Regex::new(r"(?s)```(\w+):([^\n]+)\n(.*?)```").expect("static regex"),
        file_content: Regex::new(r"(?s)File:\s*([^\n]+)\s*\n\s*Content:\s*(.*?)(?=\n\s*File:|\z)")
            .expect("static regex"),
        save_to: Regex::new(r"Save to:\s*([^\n]+)").expect("static regex"),
        any_fence: Regex::new(r"(?s)```(?:\w+)?\n(.*?)```").expect("static regex"),
        dangerous: DANGEROUS_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("static regex"))
            .collect(),
        secrets: SECRET_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("static regex"))
            .collect(),
    })
}

/// A pending file-create operation extracted from tool output.
#[derive(Clone, Debug, Serialize)]
pub struct FileOperation {
    /// Path relative to the project root (as stated by the tool).
    pub file_path: String,
    /// File body.
    pub content: String,
    /// Safety score in `[0, 1]`; populated by validation.
    pub safety_score: f64,
    /// Hazards found during validation.
    pub warnings: Vec<String>,
    /// Whether validation has run.
    pub validated: bool,
    /// Whether a hard-reject hazard fired (system path, escape).
    rejected: bool,
}

impl FileOperation {
    /// A create operation awaiting validation.
    #[must_use]
    pub fn create(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
            safety_score: 0.0,
            warnings: Vec::new(),
            validated: false,
            rejected: false,
        }
    }

    /// Auto-save eligibility: high score and not a single warning.
    #[must_use]
    pub fn auto_save_eligible(&self) -> bool {
        self.validated && self.safety_score >= 0.8 && self.warnings.is_empty()
    }
}

/// Batch execution outcome.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExecutionSummary {
    /// Operations attempted.
    pub total: usize,
    /// Files written.
    pub succeeded: usize,
    /// Operations that failed validation or I/O.
    pub failed: usize,
    /// Operations skipped pending confirmation.
    pub skipped: usize,
    /// `(path, error)` for each failure.
    pub errors: Vec<(String, String)>,
    /// Paths written, in order.
    pub created_files: Vec<String>,
}

/// Validates and writes files extracted from tool output.
#[derive(Clone, Debug)]
pub struct FileExecutor {
    project_root: PathBuf,
    auto_save_enabled: bool,
}

impl FileExecutor {
    /// Executor rooted at `project_root`.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, auto_save_enabled: bool) -> Self {
        Self {
            project_root: project_root.into(),
            auto_save_enabled,
        }
    }

    /// Extract file operations from tool output.
    ///
    /// Three shapes produce operations: a fence tagged `lang:path`, a
    /// `File:`/`Content:` block, and `Save to:` following an unlabelled
    /// fence.
    #[must_use]
    pub fn extract_operations(&self, llm_output: &str) -> Vec<FileOperation> {
        let mut operations = Vec::new();

        for caps in patterns().fenced_with_path.captures_iter(llm_output) {
            let path = caps.get(2).map_or("", |m| m.as_str()).trim();
            let content = caps.get(3).map_or("", |m| m.as_str()).trim();
            operations.push(FileOperation::create(path, content));
        }

        for caps in patterns().file_content.captures_iter(llm_output) {
            let path = caps.get(1).map_or("", |m| m.as_str()).trim();
            let content = caps.get(2).map_or("", |m| m.as_str()).trim();
            operations.push(FileOperation::create(path, content));
        }

        for caps in patterns().save_to.captures_iter(llm_output) {
            let Some(whole) = caps.get(0) else { continue };
            let path = caps.get(1).map_or("", |m| m.as_str()).trim();
            // Pair with the nearest fence before the marker.
            if let Some(code) = patterns()
                .any_fence
                .captures_iter(&llm_output[..whole.start()])
                .last()
                .and_then(|c| c.get(1))
            {
                operations.push(FileOperation::create(path, code.as_str().trim()));
            }
        }

        info!(count = operations.len(), "extracted file operations");
        operations
    }

    /// Score an operation's safety. Returns `(is_safe, warnings)`.
    ///
    /// Starts at 1.0 and deducts per hazard; an operation is safe iff the
    /// score stays at or above 0.5 and no absolute reject fired.
    pub fn validate(&self, operation: &mut FileOperation) -> (bool, Vec<String>) {
        let mut warnings = Vec::new();
        let mut score = 1.0f64;
        let mut rejected = false;

        let full_path = normalize(&self.project_root.join(&operation.file_path));
        let full_path_str = full_path.to_string_lossy();

        if !full_path.starts_with(&self.project_root) {
            warnings.push("Path outside project root (potential path traversal)".to_string());
            score -= 0.5;
            rejected = true;
        }

        for system in SYSTEM_PATHS {
            if full_path_str.starts_with(system) {
                warnings.push(format!("System path detected: {system}"));
                rejected = true;
            }
        }

        for (pattern, regex) in DANGEROUS_PATTERNS.iter().zip(&patterns().dangerous) {
            if regex.is_match(&operation.file_path) || regex.is_match(&full_path_str) {
                warnings.push(format!("Dangerous pattern in path: {pattern}"));
                score -= 0.3;
            }
        }

        let extension = extension_of(&operation.file_path);
        if !SAFE_EXTENSIONS.contains(&extension.as_str()) {
            warnings.push(format!("Uncommon file extension: {extension}"));
            score -= 0.2;
        }

        if !operation.content.is_empty() {
            for (pattern, regex) in DANGEROUS_PATTERNS.iter().zip(&patterns().dangerous) {
                if regex.is_match(&operation.content) {
                    warnings.push(format!("Dangerous pattern in content: {pattern}"));
                    score -= 0.3;
                }
            }
            if patterns().secrets.iter().any(|re| re.is_match(&operation.content)) {
                warnings.push("Potential hardcoded secret detected".to_string());
                score -= 0.2;
            }
        }

        operation.safety_score = score.max(0.0);
        operation.warnings.clone_from(&warnings);
        operation.validated = true;
        operation.rejected = rejected;

        let is_safe = operation.safety_score >= 0.5 && !rejected;
        debug!(
            file = %operation.file_path,
            safe = is_safe,
            score = operation.safety_score,
            warnings = warnings.len(),
            "operation validated"
        );
        (is_safe, warnings)
    }

    /// Write one operation.
    ///
    /// `confirm` asserts the user approved mid-scoring operations; without
    /// it, anything below 0.7 is skipped.
    pub fn execute(&self, operation: &mut FileOperation, confirm: bool) -> (bool, Option<String>) {
        if !operation.validated {
            let (is_safe, warnings) = self.validate(operation);
            if !is_safe {
                return (false, Some(format!("Unsafe operation: {}", warnings.join("; "))));
            }
        } else if operation.rejected || operation.safety_score < 0.5 {
            return (
                false,
                Some(format!(
                    "Unsafe operation: {}",
                    operation.warnings.join("; ")
                )),
            );
        }

        let can_auto_save = self.auto_save_enabled && operation.auto_save_eligible();
        if !can_auto_save && operation.safety_score < 0.7 && !confirm {
            return (false, Some("User confirmation required".to_string()));
        }

        let full_path = normalize(&self.project_root.join(&operation.file_path));
        if let Some(parent) = full_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return (false, Some(e.to_string()));
            }
        }
        match std::fs::write(&full_path, &operation.content) {
            Ok(()) => {
                info!(file = %full_path.display(), auto_save = can_auto_save, "file written");
                (true, None)
            }
            Err(e) => {
                warn!(file = %full_path.display(), error = %e, "file write failed");
                (false, Some(e.to_string()))
            }
        }
    }

    /// Execute a batch, producing the summary.
    #[must_use]
    pub fn execute_all(
        &self,
        mut operations: Vec<FileOperation>,
        confirm_all: bool,
    ) -> ExecutionSummary {
        let mut summary = ExecutionSummary {
            total: operations.len(),
            ..ExecutionSummary::default()
        };

        for operation in &mut operations {
            let (ok, error) = self.execute(operation, confirm_all);
            if ok {
                summary.succeeded += 1;
                summary.created_files.push(operation.file_path.clone());
            } else if error
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains("confirmation required"))
            {
                summary.skipped += 1;
            } else {
                summary.failed += 1;
                summary.errors.push((
                    operation.file_path.clone(),
                    error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "batch execution complete"
        );
        summary
    }
}

/// Lexical path normalisation: resolves `.` and `..` without touching the
/// filesystem, so escapes are caught before anything exists.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    let _ = parts.pop();
                } else {
                    parts.push(component);
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

fn extension_of(path: &str) -> String {
    path.rfind('.')
        .map_or_else(String::new, |idx| path[idx..].to_lowercase())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> (tempfile::TempDir, FileExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let executor = FileExecutor::new(dir.path(), true);
        (dir, executor)
    }

    #[test]
    fn extracts_fence_with_path() {
        let (_dir, executor) = executor();
        let ops = executor
            .extract_operations("```python:src/app.py\nprint('hi')\n```");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].file_path, "src/app.py");
        assert_eq!(ops[0].content, "print('hi')");
    }

    #[test]
    fn extracts_file_content_blocks() {
        let (_dir, executor) = executor();
        let output = "File: a.py\nContent: x = 1\n\nFile: b.py\nContent: y = 2";
        let ops = executor.extract_operations(output);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].file_path, "a.py");
        assert_eq!(ops[1].content, "y = 2");
    }

    #[test]
    fn extracts_save_to_with_preceding_fence() {
        let (_dir, executor) = executor();
        let output = "```\nbody text\n```\nSave to: notes.md";
        let ops = executor.extract_operations(output);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].file_path, "notes.md");
        assert_eq!(ops[0].content, "body text");
    }

    #[test]
    fn clean_operation_is_auto_save_eligible() {
        let (_dir, executor) = executor();
        let mut op = FileOperation::create("src/lib.rs", "pub fn f() {}");
        let (safe, warnings) = executor.validate(&mut op);
        assert!(safe);
        assert!(warnings.is_empty());
        assert!((op.safety_score - 1.0).abs() < f64::EPSILON);
        assert!(op.auto_save_eligible());
    }

    #[test]
    fn path_traversal_is_rejected() {
        let (_dir, executor) = executor();
        let mut op = FileOperation::create("../../etc/passwd", "root::0:0");
        let (safe, warnings) = executor.validate(&mut op);
        assert!(!safe);
        assert!(warnings.iter().any(|w| w.contains("outside project root")));
    }

    #[test]
    fn system_path_is_rejected_even_with_high_score() {
        let executor = FileExecutor::new("/etc", true);
        let mut op = FileOperation::create("passwd.txt", "data");
        let (safe, warnings) = executor.validate(&mut op);
        assert!(!safe);
        assert!(warnings.iter().any(|w| w.contains("System path")));
    }

    #[test]
    fn dangerous_content_lowers_score() {
        let (_dir, executor) = executor();
        let mut op = FileOperation::create("run.py", "import os\nos.system('sudo rm -rf /')");
        let (_, warnings) = executor.validate(&mut op);
        assert!(op.safety_score < 0.8);
        assert!(warnings.iter().any(|w| w.contains("Dangerous pattern in content")));
    }

    #[test]
    fn secrets_are_flagged() {
        let (_dir, executor) = executor();
        let mut op = FileOperation::create("config.py", "password = \"hunter2\"");
        let _ = executor.validate(&mut op);
        assert!(op
            .warnings
            .iter()
            .any(|w| w.contains("hardcoded secret")));
        assert!(!op.auto_save_eligible());
    }

    #[test]
    fn uncommon_extension_deducts() {
        let (_dir, executor) = executor();
        let mut op = FileOperation::create("blob.xyz", "data");
        let (safe, _) = executor.validate(&mut op);
        assert!(safe);
        assert!((op.safety_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn execute_writes_and_creates_parents() {
        let (dir, executor) = executor();
        let mut op = FileOperation::create("nested/deep/file.rs", "fn main() {}");
        let (ok, err) = executor.execute(&mut op, false);
        assert!(ok, "{err:?}");
        let written = std::fs::read_to_string(dir.path().join("nested/deep/file.rs")).unwrap();
        assert_eq!(written, "fn main() {}");
    }

    #[test]
    fn mid_score_requires_confirmation() {
        let (dir, executor) = executor();
        // Secret + uncommon extension: 1.0 - 0.2 - 0.2 = 0.6.
        let mut op = FileOperation::create("conf.xyz", "token = \"abc123\"");
        let (safe, _) = executor.validate(&mut op);
        assert!(safe);
        assert!((op.safety_score - 0.6).abs() < 1e-9);

        let (ok, err) = executor.execute(&mut op, false);
        assert!(!ok);
        assert_eq!(err.as_deref(), Some("User confirmation required"));
        assert!(!dir.path().join("conf.xyz").exists());

        let (ok, _) = executor.execute(&mut op, true);
        assert!(ok);
    }

    #[test]
    fn batch_summary_counts_outcomes() {
        let (_dir, executor) = executor();
        let output = "```rust:ok.rs\nfn main() {}\n```\n\
                      ```python:../../etc/passwd\nboom\n```\n\
                      ```text:conf.xyz\ntoken = \"abc123\"\n```";
        let ops = executor.extract_operations(output);
        assert_eq!(ops.len(), 3);

        let summary = executor.execute_all(ops, false);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.created_files, vec!["ok.rs".to_string()]);
        assert!(summary.errors[0].1.contains("Unsafe operation"));
    }
}
