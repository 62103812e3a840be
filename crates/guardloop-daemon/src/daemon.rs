//! The request pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use guardloop_adapters::{AdapterFactory, AiResponse, StreamCallback};
use guardloop_agents::{AgentContext, AgentDecision, ChainRunner};
use guardloop_analysis::{
    DetectedFailure, DetectorStats, FailureDetector, ParsedResponse, ResponseParser, Validator,
    Violation,
};
use guardloop_core::errors::{AdapterError, GuardLoopError};
use guardloop_core::{
    estimate_tokens, ContextType, ConversationId, GuardrailType, Mode, Role, SessionId, Severity,
};
use guardloop_context::{
    AssemblerStats, ContextAssembler, ConversationManager, Embedder, SemanticMatcher,
    TaskClassification, TaskClassifier,
};
use guardloop_learning::AdaptiveGuardrailManager;
use guardloop_settings::{expand_tilde, Settings};
use guardloop_store::repos::{
    ActivityRepository, ClassificationRepository, FailureRepository, SessionRepository,
    ViolationRepository,
};
use guardloop_store::rows::{
    NewAgentActivity, NewContextTracking, NewFailure, NewSession, NewTaskClassification,
    NewViolation,
};
use guardloop_store::{to_iso, Store, StoreStats};

use crate::enforcement::enforce;
use crate::executor::FileExecutor;
use crate::workers::WorkerManager;

/// Stored prompt size bound.
const PROMPT_BOUND: usize = 2_000;
/// Stored raw-output size bound.
const OUTPUT_BOUND: usize = 10_000;
/// Stored augmented-prompt size bound.
const AUGMENTED_BOUND: usize = 10_000;

/// One request to a wrapped tool.
pub struct AiRequest {
    /// Tool name (`claude`, `gemini`, `codex`, …).
    pub tool: String,
    /// The user's prompt.
    pub prompt: String,
    /// Requested reviewer, or `None`/`auto` for routing.
    pub agent: Option<String>,
    /// Enforcement posture.
    pub mode: Mode,
    /// Session identifier (generated when not supplied).
    pub session_id: SessionId,
    /// Multi-turn conversation to continue, if any.
    pub conversation_id: Option<ConversationId>,
    /// Root for extracted file materialisation.
    pub project_root: Option<PathBuf>,
    /// Live stdout observer.
    pub stream: Option<StreamCallback>,
}

impl std::fmt::Debug for AiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiRequest")
            .field("tool", &self.tool)
            .field("mode", &self.mode)
            .field("session_id", &self.session_id)
            .field("conversation_id", &self.conversation_id)
            .finish()
    }
}

impl AiRequest {
    /// A standard-mode request with a fresh session id.
    #[must_use]
    pub fn new(tool: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            prompt: prompt.into(),
            agent: None,
            mode: Mode::Standard,
            session_id: SessionId::new(),
            conversation_id: None,
            project_root: None,
            stream: None,
        }
    }

    /// Set the enforcement mode.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Request a specific reviewer.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Continue a conversation.
    #[must_use]
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    /// Enable file materialisation under `root`.
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Observe stdout line-by-line while the tool runs.
    #[must_use]
    pub fn with_stream(mut self, stream: StreamCallback) -> Self {
        self.stream = Some(stream);
        self
    }
}

/// The pipeline's answer.
#[derive(Clone, Debug)]
pub struct AiResult {
    /// Raw tool output.
    pub raw_output: String,
    /// Structured parse of the output.
    pub parsed: ParsedResponse,
    /// Policy violations (empty when guardrails were skipped).
    pub violations: Vec<Violation>,
    /// Detected failure signatures.
    pub failures: Vec<DetectedFailure>,
    /// Reviewer decisions, in chain order.
    pub agent_decisions: Vec<AgentDecision>,
    /// Enforcement outcome.
    pub approved: bool,
    /// Wall-clock pipeline time.
    pub execution_time_ms: u64,
    /// Session identifier.
    pub session_id: SessionId,
    /// Classifier verdict, when classification ran.
    pub task_classification: Option<TaskClassification>,
    /// Files written by the executor.
    pub file_operations: Vec<String>,
    /// Whether policy content was injected.
    pub guardrails_applied: bool,
}

/// Aggregate daemon statistics.
#[derive(Clone, Debug, Serialize)]
pub struct DaemonStats {
    /// Enforcement posture.
    pub mode: String,
    /// Tools accepting requests.
    pub enabled_tools: Vec<String>,
    /// Context assembler view.
    pub assembler: AssemblerStats,
    /// Failure-signature catalogue view.
    pub detector: DetectorStats,
    /// Persistence view.
    pub store: StoreStats,
}

/// Orchestrates the pipeline per request.
///
/// All collaborators arrive by construction; there are no global
/// singletons. Session logging is fire-and-forget relative to the response
/// path.
pub struct GuardLoopDaemon {
    settings: Settings,
    store: Store,
    factory: AdapterFactory,
    classifier: TaskClassifier,
    assembler: ContextAssembler,
    parser: ResponseParser,
    validator: Validator,
    detector: FailureDetector,
    runner: ChainRunner,
    conversations: ConversationManager,
    adaptive: Arc<AdaptiveGuardrailManager>,
    workers: tokio::sync::Mutex<WorkerManager>,
}

impl std::fmt::Debug for GuardLoopDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardLoopDaemon")
            .field("mode", &self.settings.mode)
            .field("enabled_tools", &self.settings.enabled_tools())
            .finish()
    }
}

impl GuardLoopDaemon {
    /// Assemble the daemon from its collaborators.
    ///
    /// `embedder` is optional; without one (or when its model fails to
    /// load) rule retrieval degrades to keyword scoring.
    #[must_use]
    pub fn new(
        settings: Settings,
        store: Store,
        factory: AdapterFactory,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        let matcher = Arc::new(
            embedder.map_or_else(SemanticMatcher::disabled, SemanticMatcher::new),
        );
        let adaptive = Arc::new(AdaptiveGuardrailManager::with_matcher(
            store.clone(),
            matcher,
        ));

        let mut assembler = ContextAssembler::new(
            expand_tilde(&settings.guardrails.base_path),
            expand_tilde(&settings.guardrails.agents_path),
        );
        if settings.features.v2_dynamic_guardrails {
            assembler = assembler.with_dynamic_rules(Arc::clone(&adaptive) as _);
        }
        assembler.prewarm();

        let workers = WorkerManager::new(
            store.clone(),
            Arc::clone(&adaptive),
            settings.features.clone(),
        )
        .with_log_rotation(settings.logging.clone());

        info!(
            mode = %settings.mode,
            enabled_tools = ?settings.enabled_tools(),
            "daemon initialized"
        );

        Self {
            conversations: ConversationManager::new(store.clone()),
            settings,
            store,
            factory,
            classifier: TaskClassifier::new(),
            assembler,
            parser: ResponseParser::new(),
            validator: Validator::new(),
            detector: FailureDetector::new(),
            runner: ChainRunner::new(),
            adaptive,
            workers: tokio::sync::Mutex::new(workers),
        }
    }

    /// Start the enabled background workers.
    pub async fn start(&self) {
        self.workers.lock().await.start();
    }

    /// Stop the background workers at their next tick boundary.
    pub async fn stop(&self) {
        self.workers.lock().await.stop().await;
    }

    /// The adaptive guardrail manager (exposed for learning-loop callers).
    #[must_use]
    pub fn adaptive(&self) -> &Arc<AdaptiveGuardrailManager> {
        &self.adaptive
    }

    /// Process one request end-to-end.
    ///
    /// Configuration and adapter failures surface as errors; everything
    /// else is embedded in the [`AiResult`].
    pub async fn process(&self, request: AiRequest) -> Result<AiResult, GuardLoopError> {
        let start = Instant::now();
        info!(
            session_id = %request.session_id,
            tool = %request.tool,
            agent = request.agent.as_deref(),
            mode = %request.mode,
            "processing request"
        );

        // 1. Classify the task.
        let classification = self
            .settings
            .features
            .v2_task_classification
            .then(|| self.classifier.classify(&request.prompt));
        let guardrails_required = classification
            .as_ref()
            .is_none_or(|c| c.requires_guardrails);

        if let Some(c) = &classification {
            info!(
                session_id = %request.session_id,
                task_type = %c.task_type,
                confidence = c.confidence,
                guardrails_required,
                "task classified"
            );
        }

        // 2. Prepend conversation history for interactive sessions.
        let context_prompt = match &request.conversation_id {
            Some(id) if self.settings.features.v2_conversation_history => {
                self.conversations.build_context(id, &request.prompt)
            }
            _ => request.prompt.clone(),
        };

        // 3. Build the augmented prompt, or pass the prompt through bare.
        let augmented = if guardrails_required {
            self.assembler.build_context(
                &context_prompt,
                request.agent.as_deref().filter(|a| *a != "auto"),
                request.mode,
                classification.as_ref().map(|c| c.task_type),
            )
        } else {
            info!(
                session_id = %request.session_id,
                "creative/content task - bypassing guardrails"
            );
            context_prompt.clone()
        };

        // 4. Resolve the adapter; disabled tools abort here.
        let adapter = self.factory.get(&request.tool)?;

        // 5. Execute the tool.
        let response = adapter
            .execute(&augmented, None, request.stream.clone())
            .await;
        if !response.is_success() {
            return Err(self.execution_error(&request.tool, &response));
        }

        debug!(
            session_id = %request.session_id,
            output_length = response.raw_output.len(),
            execution_time_ms = response.execution_time_ms,
            "tool execution completed"
        );

        // 6. Parse, validate, detect.
        let parsed = self.parser.parse(&response.raw_output);
        let mut violations = if guardrails_required {
            self.validator.validate(&parsed, &response.raw_output)
        } else {
            Vec::new()
        };
        let failures = self.detector.scan(&response.raw_output, Some(&request.tool));

        // 6b. Reviewer chain over the parsed response.
        let agent_decisions = if guardrails_required {
            let ctx = AgentContext {
                prompt: request.prompt.clone(),
                mode: request.mode,
                parsed: parsed.clone(),
                violations: violations.clone(),
                failures: failures.clone(),
                raw_output: response.raw_output.clone(),
                tool: request.tool.clone(),
            };
            let chain_task = chain_task_for(&request.prompt);
            let user_agent = request.agent.as_deref().filter(|a| *a != "auto");
            let decisions = self.runner.run(&ctx, chain_task, request.mode, user_agent);
            for decision in decisions.iter().filter(|d| !d.approved) {
                violations.push(Violation {
                    guardrail_type: GuardrailType::Agent,
                    rule: format!("{}_review", decision.agent_name),
                    severity: Severity::High,
                    description: decision.reason.clone(),
                    suggestion: decision.suggestions.join("; "),
                    file_path: None,
                    line_number: None,
                });
            }
            decisions
        } else {
            Vec::new()
        };

        // 7. Enforce.
        let approved = enforce(request.mode, &violations, &failures);
        info!(
            session_id = %request.session_id,
            approved,
            violations = violations.len(),
            failures = failures.len(),
            "enforcement decision"
        );

        // 8. Materialise extracted files when a project root is given.
        let mut file_operations = Vec::new();
        if let Some(root) = &request.project_root {
            if self.settings.features.v2_auto_save_files {
                let executor = FileExecutor::new(root, true);
                let operations = executor.extract_operations(&response.raw_output);
                if !operations.is_empty() {
                    let summary = executor.execute_all(operations, false);
                    info!(
                        session_id = %request.session_id,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        skipped = summary.skipped,
                        "file operations executed"
                    );
                    file_operations = summary.created_files;
                }
            }
        }

        // 9. Record the turn pair for interactive sessions.
        if let Some(id) = &request.conversation_id {
            if self.settings.features.v2_conversation_history {
                self.conversations
                    .add_message(id, Role::User, &request.prompt, None);
                self.conversations
                    .add_message(id, Role::Assistant, &response.raw_output, None);
            }
        }

        // 10. Persist asynchronously; the caller never waits on the store.
        let execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.spawn_session_log(
            &request,
            &response,
            &parsed,
            &violations,
            &failures,
            &agent_decisions,
            classification.as_ref(),
            guardrails_required.then_some(augmented.as_str()),
            approved,
            execution_time_ms,
        );

        Ok(AiResult {
            raw_output: response.raw_output,
            parsed,
            violations,
            failures,
            agent_decisions,
            approved,
            execution_time_ms,
            session_id: request.session_id,
            task_classification: classification,
            file_operations,
            guardrails_applied: guardrails_required,
        })
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> Result<DaemonStats, GuardLoopError> {
        Ok(DaemonStats {
            mode: self.settings.mode.to_string(),
            enabled_tools: self
                .settings
                .enabled_tools()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            assembler: self.assembler.stats(),
            detector: self.detector.stats(),
            store: self.store.stats()?,
        })
    }

    fn execution_error(&self, tool: &str, response: &AiResponse) -> GuardLoopError {
        let error = response.error.clone().unwrap_or_default();
        warn!(tool, error = %error, exit_code = response.exit_code, "tool execution failed");
        if error.starts_with("Timeout after") {
            let timeout_secs = self
                .settings
                .tools
                .get(tool)
                .map_or(120, |t| t.timeout_secs);
            GuardLoopError::Adapter(AdapterError::Timeout {
                timeout_secs,
                attempts: 3,
            })
        } else {
            GuardLoopError::Adapter(AdapterError::NonZeroExit {
                tool: tool.to_string(),
                exit_code: response.exit_code,
                attempts: 3,
                stderr: truncate_chars(&error, 500),
            })
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_session_log(
        &self,
        request: &AiRequest,
        response: &AiResponse,
        parsed: &ParsedResponse,
        violations: &[Violation],
        failures: &[DetectedFailure],
        decisions: &[AgentDecision],
        classification: Option<&TaskClassification>,
        augmented: Option<&str>,
        approved: bool,
        execution_time_ms: u64,
    ) {
        let store = self.store.clone();
        let session = NewSession {
            id: request.session_id.to_string(),
            timestamp: to_iso(chrono::Utc::now()),
            tool: request.tool.clone(),
            agent: request.agent.clone().unwrap_or_else(|| "auto".to_string()),
            mode: request.mode,
            prompt: truncate_chars(&request.prompt, PROMPT_BOUND),
            augmented_prompt: augmented.map(|a| truncate_chars(a, AUGMENTED_BOUND)),
            raw_output: Some(truncate_chars(&response.raw_output, OUTPUT_BOUND)),
            parsed_output: serde_json::to_value(parsed).ok(),
            violations_count: i64::try_from(violations.len()).unwrap_or(i64::MAX),
            failures_count: i64::try_from(failures.len()).unwrap_or(i64::MAX),
            approved,
            execution_time_ms: i64::try_from(execution_time_ms).unwrap_or(i64::MAX),
        };
        let violations = violations.to_vec();
        let failures = failures.to_vec();
        let decisions = decisions.to_vec();
        let classification = classification.cloned();
        let context_tokens = augmented.map(estimate_tokens);
        let session_id = request.session_id.to_string();
        let tool = request.tool.clone();

        // Fire-and-forget: a persistence failure is logged, never surfaced.
        drop(tokio::spawn(async move {
            let result = (|| -> Result<(), guardloop_core::errors::StoreError> {
                let conn = store.conn()?;
                SessionRepository::insert(&conn, &session)?;

                for violation in &violations {
                    ViolationRepository::insert(
                        &conn,
                        &NewViolation {
                            session_id: session_id.clone(),
                            guardrail_type: violation.guardrail_type,
                            rule: violation.rule.clone(),
                            severity: violation.severity,
                            description: violation.description.clone(),
                            suggestion: Some(violation.suggestion.clone()),
                            file_path: violation.file_path.clone(),
                            line_number: violation.line_number,
                        },
                    )?;
                }

                for failure in &failures {
                    FailureRepository::insert(
                        &conn,
                        &NewFailure {
                            session_id: Some(session_id.clone()),
                            tool: tool.clone(),
                            category: failure.category.clone(),
                            pattern: failure.pattern.clone(),
                            context: Some(failure.context.clone()),
                            severity: failure.severity,
                            suggestion: failure.suggestion.clone(),
                        },
                    )?;
                }

                for decision in &decisions {
                    ActivityRepository::insert(
                        &conn,
                        &NewAgentActivity {
                            session_id: Some(session_id.clone()),
                            agent: decision.agent_name.clone(),
                            action: "evaluate".to_string(),
                            success: decision.approved,
                            execution_time_ms: None,
                            error_message: None,
                            metadata: serde_json::to_value(decision).ok(),
                        },
                    )?;
                }

                if let Some(c) = &classification {
                    ClassificationRepository::insert(
                        &conn,
                        &NewTaskClassification {
                            session_id: session_id.clone(),
                            task_type: c.task_type,
                            confidence: c.confidence,
                            requires_guardrails: c.requires_guardrails,
                            features: serde_json::to_value(c.features).ok(),
                        },
                    )?;
                }

                if let Some(tokens) = context_tokens {
                    ActivityRepository::insert_context(
                        &conn,
                        &NewContextTracking {
                            session_id: session_id.clone(),
                            context_type: ContextType::Custom,
                            context_data: serde_json::json!({ "kind": "guardrail_injection" }),
                            tokens_used: i64::try_from(tokens).unwrap_or(i64::MAX),
                        },
                    )?;
                }
                Ok(())
            })();

            match result {
                Ok(()) => debug!(session_id = %session_id, "session logged"),
                Err(e) => warn!(session_id = %session_id, error = %e, "failed to log session"),
            }
        }));
    }
}

/// Bridge free-form prompts onto the chain optimiser's task table.
fn chain_task_for(prompt: &str) -> &'static str {
    let lower = prompt.to_lowercase();
    if lower.contains("auth") || lower.contains("login") || lower.contains("security") {
        "implement_auth"
    } else if lower.contains("database") || lower.contains("schema") || lower.contains("migration")
    {
        "database_design"
    } else if lower.contains("api") || lower.contains("endpoint") {
        "implement_api"
    } else if lower.contains("ui") || lower.contains("accessibility") || lower.contains("frontend")
    {
        "implement_ui"
    } else if lower.contains("bug") || lower.contains("crash") || lower.contains("debug") {
        "fix_bug"
    } else if lower.contains("test") {
        "add_tests"
    } else if lower.contains("doc") || lower.contains("readme") {
        "update_docs"
    } else {
        "implement_function"
    }
}

/// Char-boundary-safe prefix truncation.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use guardloop_adapters::ToolAdapter;
    use guardloop_core::TaskType;
    use std::sync::Mutex;

    /// Canned adapter capturing the prompts it receives.
    #[derive(Debug)]
    struct MockAdapter {
        output: String,
        error: Option<String>,
        seen_prompts: Arc<Mutex<Vec<String>>>,
    }

    impl MockAdapter {
        fn new(output: &str) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let adapter = Arc::new(Self {
                output: output.to_string(),
                error: None,
                seen_prompts: Arc::clone(&seen),
            });
            (adapter, seen)
        }

        fn failing(error: &str) -> Arc<Self> {
            Arc::new(Self {
                output: String::new(),
                error: Some(error.to_string()),
                seen_prompts: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    #[async_trait]
    impl ToolAdapter for MockAdapter {
        fn name(&self) -> &str {
            "mock"
        }

        async fn execute(
            &self,
            prompt: &str,
            _timeout: Option<Duration>,
            _stream: Option<StreamCallback>,
        ) -> AiResponse {
            self.seen_prompts.lock().unwrap().push(prompt.to_string());
            match &self.error {
                Some(error) => AiResponse::failure(error.clone()),
                None => AiResponse {
                    raw_output: self.output.clone(),
                    stdout: self.output.clone(),
                    execution_time_ms: 5,
                    ..AiResponse::default()
                },
            }
        }

        fn validate_installation(&self) -> bool {
            true
        }

        async fn version(&self) -> String {
            "1.0.0".to_string()
        }
    }

    const WELL_FORMED_OUTPUT: &str = "\
Implementation with MFA and Azure AD authentication, RBAC roles, and audit logging \
across database, backend, and frontend layers.

```python
# File: src/auth.py
def authenticate(user):
    return user.has_mfa
```

Unit test and integration test cases included; try/except error handling with logger \
calls, tooltip and aria accessibility hints, dark mode theme, and export to CSV.
Test coverage: 100%";

    fn daemon_with(adapter: Arc<dyn ToolAdapter>) -> (tempfile::TempDir, GuardLoopDaemon) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.database.path = dir
            .path()
            .join("guardloop.db")
            .to_string_lossy()
            .into_owned();
        settings.guardrails.base_path = dir.path().join("guardrails").to_string_lossy().into_owned();
        settings.guardrails.agents_path = dir
            .path()
            .join("guardrails/agents")
            .to_string_lossy()
            .into_owned();
        settings.tools.get_mut("gemini").unwrap().enabled = false;

        let store = Store::open(dir.path().join("guardloop.db")).unwrap();
        let factory = AdapterFactory::new(settings.tools.clone()).with_adapter("claude", adapter);
        let daemon = GuardLoopDaemon::new(settings, store, factory, None);
        (dir, daemon)
    }

    #[tokio::test]
    async fn code_task_standard_mode_approves() {
        let (mock, seen) = MockAdapter::new(WELL_FORMED_OUTPUT);
        let (_dir, daemon) = daemon_with(mock);

        let result = daemon
            .process(AiRequest::new("claude", "implement user authentication"))
            .await
            .unwrap();

        assert!(result.approved);
        assert!(result.guardrails_applied);
        let classification = result.task_classification.unwrap();
        assert_eq!(classification.task_type, TaskType::Code);
        assert!(classification.confidence >= 0.45);
        assert_eq!(result.parsed.code_blocks.len(), 1);
        assert_eq!(result.parsed.test_coverage, Some(100.0));
        assert!(result
            .violations
            .iter()
            .all(|v| v.severity != Severity::Critical));

        let prompts = seen.lock().unwrap();
        assert!(prompts[0].contains("<guardrails>"));
        assert!(prompts[0]
            .contains("<user_request>\nimplement user authentication\n</user_request>"));
    }

    #[tokio::test]
    async fn creative_task_bypasses_policy() {
        let (mock, seen) = MockAdapter::new("Roses are red...");
        let (_dir, daemon) = daemon_with(mock);

        let result = daemon
            .process(AiRequest::new("claude", "write a poem about coding"))
            .await
            .unwrap();

        let classification = result.task_classification.unwrap();
        assert_eq!(classification.task_type, TaskType::Creative);
        assert!(!classification.requires_guardrails);
        assert!(!result.guardrails_applied);
        assert!(result.violations.is_empty());
        assert!(result.agent_decisions.is_empty());

        // The adapter saw the bare prompt, verbatim.
        assert_eq!(seen.lock().unwrap()[0], "write a poem about coding");
    }

    #[tokio::test]
    async fn strict_mode_blocks_critical_failures() {
        let (mock, _) = MockAdapter::new("Stack overflow, infinite recursion detected");
        let (_dir, daemon) = daemon_with(mock);

        let result = daemon
            .process(
                AiRequest::new("claude", "implement the retry api endpoint").with_mode(Mode::Strict),
            )
            .await
            .unwrap();

        assert!(!result.approved);
        let looping: Vec<_> = result
            .failures
            .iter()
            .filter(|f| f.category == "Looping")
            .collect();
        assert!(!looping.is_empty());
        assert_eq!(looping[0].severity, Severity::Critical);
        // The raw output is still returned to the caller.
        assert!(result.raw_output.contains("Stack overflow"));
    }

    #[tokio::test]
    async fn disabled_tool_is_a_config_error() {
        let (mock, _) = MockAdapter::new("x");
        let (_dir, daemon) = daemon_with(mock);

        let err = daemon
            .process(AiRequest::new("gemini", "implement auth"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_TOOL_DISABLED");
    }

    #[tokio::test]
    async fn adapter_failure_surfaces_as_error() {
        let (_dir, daemon) = daemon_with(MockAdapter::failing("exit code: 2"));

        let err = daemon
            .process(AiRequest::new("claude", "implement auth"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ADAPTER_NONZERO_EXIT");
    }

    #[tokio::test]
    async fn adapter_timeout_maps_to_timeout_error() {
        let (_dir, daemon) = daemon_with(MockAdapter::failing("Timeout after 120s"));

        let err = daemon
            .process(AiRequest::new("claude", "implement auth"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ADAPTER_TIMEOUT");
    }

    #[tokio::test]
    async fn conversation_turns_are_recorded_and_replayed() {
        let (mock, seen) = MockAdapter::new(WELL_FORMED_OUTPUT);
        let (_dir, daemon) = daemon_with(mock);
        let conversation = ConversationId::from("conv-1");

        let _ = daemon
            .process(
                AiRequest::new("claude", "implement user authentication")
                    .with_conversation(conversation.clone()),
            )
            .await
            .unwrap();
        let _ = daemon
            .process(
                AiRequest::new("claude", "now add rbac checks")
                    .with_conversation(conversation.clone()),
            )
            .await
            .unwrap();

        let prompts = seen.lock().unwrap();
        assert!(prompts[1].contains("# Conversation History"));
        assert!(prompts[1].contains("implement user authentication"));
        assert!(prompts[1].contains("# Current Request\nUser: now add rbac checks"));
    }

    #[tokio::test]
    async fn safe_files_are_materialised() {
        let output = "Created the module:\n```rust:src/hello.rs\npub fn hello() {}\n```";
        let (mock, _) = MockAdapter::new(output);
        let (dir, daemon) = daemon_with(mock);
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();

        let result = daemon
            .process(
                AiRequest::new("claude", "implement the hello api endpoint")
                    .with_project_root(&project),
            )
            .await
            .unwrap();

        assert_eq!(result.file_operations, vec!["src/hello.rs".to_string()]);
        assert!(project.join("src/hello.rs").exists());
    }

    #[tokio::test]
    async fn traversal_operations_are_never_written() {
        let output = "```python:../../etc/passwd\nroot::0:0\n```";
        let (mock, _) = MockAdapter::new(output);
        let (dir, daemon) = daemon_with(mock);
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();

        let result = daemon
            .process(
                AiRequest::new("claude", "implement the export api").with_project_root(&project),
            )
            .await
            .unwrap();

        assert!(result.file_operations.is_empty());
        assert!(!dir.path().join("etc/passwd").exists());
    }

    #[tokio::test]
    async fn sessions_and_children_are_persisted() {
        let (mock, _) = MockAdapter::new(WELL_FORMED_OUTPUT);
        let (_dir, daemon) = daemon_with(mock);

        let result = daemon
            .process(AiRequest::new("claude", "implement user authentication"))
            .await
            .unwrap();

        // Persistence is fire-and-forget; poll briefly for the write.
        let mut session = None;
        for _ in 0..50 {
            let conn = daemon.store.conn().unwrap();
            session = SessionRepository::get(&conn, result.session_id.as_str()).unwrap();
            if session.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let session = session.expect("session row should be written");
        assert_eq!(session.tool, "claude");
        assert!(session.approved);
        assert_eq!(session.violations_count, i64::try_from(result.violations.len()).unwrap());
    }

    #[tokio::test]
    async fn user_agent_runs_a_single_reviewer() {
        let (mock, _) = MockAdapter::new(WELL_FORMED_OUTPUT);
        let (_dir, daemon) = daemon_with(mock);

        let result = daemon
            .process(
                AiRequest::new("claude", "implement user authentication").with_agent("tester"),
            )
            .await
            .unwrap();

        assert_eq!(result.agent_decisions.len(), 1);
        assert_eq!(result.agent_decisions[0].agent_name, "tester");
    }

    #[tokio::test]
    async fn stats_aggregate_components() {
        let (mock, _) = MockAdapter::new("x");
        let (_dir, daemon) = daemon_with(mock);
        let stats = daemon.stats().unwrap();
        assert_eq!(stats.mode, "standard");
        assert!(stats.enabled_tools.contains(&"claude".to_string()));
        assert_eq!(stats.detector.total_patterns, 20);
    }

    #[tokio::test]
    async fn workers_start_and_stop_via_lifecycle() {
        let (mock, _) = MockAdapter::new("x");
        let (_dir, daemon) = daemon_with(mock);
        daemon.start().await;
        daemon.stop().await;
    }
}
