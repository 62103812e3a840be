//! The adapter seam and the generic CLI-backed implementation.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use guardloop_core::RetryPolicy;

use crate::response::AiResponse;
use crate::version::parse_version;

/// Line-by-line stdout observer invoked while the tool runs.
pub type StreamCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Seam between the daemon and a wrapped CLI tool.
#[async_trait]
pub trait ToolAdapter: Send + Sync + std::fmt::Debug {
    /// Tool name as configured (`claude`, `gemini`, `codex`, …).
    fn name(&self) -> &str;

    /// Run the tool with the augmented prompt.
    ///
    /// Never returns `Err`: a final failure is an [`AiResponse`] with a
    /// non-zero exit code and a populated `error`.
    async fn execute(
        &self,
        prompt: &str,
        timeout_override: Option<Duration>,
        stream: Option<StreamCallback>,
    ) -> AiResponse;

    /// Whether the executable exists on the search path.
    fn validate_installation(&self) -> bool;

    /// Version reported by `--version`, or a diagnostic token.
    async fn version(&self) -> String;
}

/// Generic adapter that spawns `cli_path <prompt>` as a subprocess.
#[derive(Debug)]
pub struct CliAdapter {
    tool: String,
    cli_path: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CliAdapter {
    /// Create an adapter for `tool` backed by `cli_path`.
    #[must_use]
    pub fn new(tool: impl Into<String>, cli_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            cli_path: cli_path.into(),
            timeout,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (tests use a single fast attempt).
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One spawn/capture/wait cycle under the per-attempt deadline.
    async fn run_once(&self, prompt: &str, timeout: Duration, stream: Option<&StreamCallback>) -> AiResponse {
        let start = Instant::now();

        let spawned = Command::new(&self.cli_path)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return AiResponse::failure(format!(
                    "failed to spawn {}: {e}",
                    self.cli_path
                ));
            }
        };

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let io_and_wait = async {
            let stdout_task = async {
                let mut collected = String::new();
                if let Some(out) = stdout_pipe {
                    let mut lines = BufReader::new(out).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if let Some(cb) = stream {
                            cb(&line);
                        }
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                }
                collected
            };
            let stderr_task = async {
                let mut buf = String::new();
                if let Some(mut err) = stderr_pipe {
                    let _ = err.read_to_string(&mut buf).await;
                }
                buf
            };
            let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);
            let status = child.wait().await;
            (status, stdout, stderr)
        };

        match tokio::time::timeout(timeout, io_and_wait).await {
            Ok((status, stdout, stderr)) => {
                let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let stdout = stdout.trim().to_string();
                let stderr = stderr.trim().to_string();
                match status {
                    Ok(status) => {
                        let exit_code = status.code().unwrap_or(-1);
                        AiResponse {
                            raw_output: stdout.clone(),
                            execution_time_ms: elapsed,
                            error: (exit_code != 0).then(|| {
                                if stderr.is_empty() {
                                    format!("exit code: {exit_code}")
                                } else {
                                    stderr.clone()
                                }
                            }),
                            exit_code,
                            stdout,
                            stderr,
                        }
                    }
                    Err(e) => AiResponse::failure(format!("wait failed: {e}")),
                }
            }
            Err(_) => {
                // Deadline hit: kill the subprocess and report the timeout.
                let _ = child.start_kill();
                let _ = child.wait().await;
                AiResponse::failure(format!("Timeout after {}s", timeout.as_secs()))
            }
        }
    }
}

#[async_trait]
impl ToolAdapter for CliAdapter {
    fn name(&self) -> &str {
        &self.tool
    }

    async fn execute(
        &self,
        prompt: &str,
        timeout_override: Option<Duration>,
        stream: Option<StreamCallback>,
    ) -> AiResponse {
        let timeout = timeout_override.unwrap_or(self.timeout);
        let mut last: Option<AiResponse> = None;

        for attempt in 1..=self.retry.max_attempts {
            debug!(
                tool = %self.tool,
                attempt,
                timeout_secs = timeout.as_secs(),
                "executing tool"
            );

            let response = self.run_once(prompt, timeout, stream.as_ref()).await;
            if response.is_success() {
                info!(
                    tool = %self.tool,
                    execution_time_ms = response.execution_time_ms,
                    "tool executed"
                );
                return response;
            }

            warn!(
                tool = %self.tool,
                attempt,
                error = response.error.as_deref().unwrap_or("unknown"),
                "tool execution failed"
            );
            last = Some(response);

            if let Some(delay) = self.retry.delay_after(attempt) {
                debug!(tool = %self.tool, delay_ms = delay.as_millis() as u64, "retrying after delay");
                tokio::time::sleep(delay).await;
            }
        }

        let mut response = last.unwrap_or_else(|| AiResponse::failure("no attempts made"));
        if response.exit_code == 0 {
            response.exit_code = 1;
        }
        response
    }

    fn validate_installation(&self) -> bool {
        let path = Path::new(&self.cli_path);
        if path.components().count() > 1 {
            return path.exists();
        }
        std::env::var_os("PATH").is_some_and(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(&self.cli_path).exists())
        })
    }

    async fn version(&self) -> String {
        let probe = Command::new(&self.cli_path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(Duration::from_secs(5), probe).await {
            Ok(Ok(output)) if output.status.success() => {
                parse_version(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(Ok(_)) => "unknown".to_string(),
            Ok(Err(_)) => "error".to_string(),
            Err(_) => "timeout".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
