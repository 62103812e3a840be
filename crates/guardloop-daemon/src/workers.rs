//! Periodic background workers.
//!
//! Four independent actors share a watch-channel shutdown signal and their
//! own periods. Workers never talk to each other; they read persistence and
//! write through the managers. Any tick error is logged and the worker
//! carries on — workers never abort the process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use guardloop_core::errors::StoreError;
use guardloop_learning::{AdaptiveGuardrailManager, PatternAnalyzer};
use guardloop_settings::{expand_tilde, FeatureSettings, LoggingSettings};
use guardloop_store::repos::{
    EffectivenessRepository, FailureRepository, MetricsRepository, RuleRepository,
    SessionRepository, ViolationRepository,
};
use guardloop_store::rows::MetricsRollup;
use guardloop_store::{days_ago_iso, today_date, Store};

/// Occurrences in 24 h that make a category an insight.
const SPIKE_THRESHOLD: i64 = 10;

/// Session retention in days.
const RETENTION_DAYS: i64 = 30;

/// Triggers needed before a trial rule may be judged.
const PROMOTION_MIN_TRIGGERS: i64 = 5;

/// Periods for the four workers.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPeriods {
    /// Failure-trend analysis.
    pub analysis: Duration,
    /// Metrics aggregation.
    pub metrics: Duration,
    /// Markdown export.
    pub export: Duration,
    /// Retention cleanup.
    pub cleanup: Duration,
}

impl Default for WorkerPeriods {
    fn default() -> Self {
        Self {
            analysis: Duration::from_secs(300),
            metrics: Duration::from_secs(60),
            export: Duration::from_secs(600),
            cleanup: Duration::from_secs(86_400),
        }
    }
}

/// Spawns and stops the enabled background workers.
pub struct WorkerManager {
    store: Store,
    adaptive: Arc<AdaptiveGuardrailManager>,
    features: FeatureSettings,
    periods: WorkerPeriods,
    export_path: PathBuf,
    logging: Option<LoggingSettings>,
    handles: Vec<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl std::fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerManager")
            .field("running", &self.shutdown.is_some())
            .field("workers", &self.handles.len())
            .finish()
    }
}

impl WorkerManager {
    /// Manager over the shared store and adaptive manager.
    #[must_use]
    pub fn new(
        store: Store,
        adaptive: Arc<AdaptiveGuardrailManager>,
        features: FeatureSettings,
    ) -> Self {
        Self {
            store,
            adaptive,
            features,
            periods: WorkerPeriods::default(),
            export_path: expand_tilde("~/.guardloop/AI_Failure_Modes.md"),
            logging: None,
            handles: Vec::new(),
            shutdown: None,
        }
    }

    /// Let the cleanup worker rotate this log file by size.
    #[must_use]
    pub fn with_log_rotation(mut self, logging: LoggingSettings) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Override worker periods (tests use short ones).
    #[must_use]
    pub fn with_periods(mut self, periods: WorkerPeriods) -> Self {
        self.periods = periods;
        self
    }

    /// Override the markdown export target.
    #[must_use]
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = path.into();
        self
    }

    /// Spawn every enabled worker. Idempotent: a running manager is left
    /// untouched.
    pub fn start(&mut self) {
        if self.shutdown.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);

        if self.features.analysis_worker && self.features.background_analysis {
            let store = self.store.clone();
            let adaptive = Arc::clone(&self.adaptive);
            let adaptive_learning = self.features.v2_adaptive_learning;
            self.handles.push(spawn_worker(
                "analysis",
                self.periods.analysis,
                rx.clone(),
                move || {
                    let store = store.clone();
                    let adaptive = Arc::clone(&adaptive);
                    async move { run_analysis_tick(&store, &adaptive, adaptive_learning) }
                },
            ));
        }
        if self.features.metrics_worker {
            let store = self.store.clone();
            self.handles.push(spawn_worker(
                "metrics",
                self.periods.metrics,
                rx.clone(),
                move || {
                    let store = store.clone();
                    async move { run_metrics_tick(&store) }
                },
            ));
        }
        if self.features.markdown_export {
            let store = self.store.clone();
            let path = self.export_path.clone();
            self.handles.push(spawn_worker(
                "markdown_export",
                self.periods.export,
                rx.clone(),
                move || {
                    let store = store.clone();
                    let path = path.clone();
                    async move { run_export_tick(&store, &path) }
                },
            ));
        }
        if self.features.cleanup_worker {
            let store = self.store.clone();
            let logging = self.logging.clone();
            self.handles.push(spawn_worker(
                "cleanup",
                self.periods.cleanup,
                rx,
                move || {
                    let store = store.clone();
                    let logging = logging.clone();
                    async move { run_cleanup_tick(&store, logging.as_ref()) }
                },
            ));
        }

        info!(worker_count = self.handles.len(), "workers started");
    }

    /// Signal shutdown and wait for every worker to exit its tick boundary.
    pub async fn stop(&mut self) {
        let Some(tx) = self.shutdown.take() else {
            return;
        };
        let _ = tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("workers stopped");
    }

    /// Names and count of running workers.
    #[must_use]
    pub fn status(&self) -> (bool, usize) {
        (self.shutdown.is_some(), self.handles.len())
    }
}

fn spawn_worker<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), StoreError>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(worker = name, period_secs = period.as_secs(), "worker starting");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = tick().await {
                        error!(worker = name, error = %e, "worker tick failed");
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!(worker = name, "worker stopping");
                        break;
                    }
                }
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick bodies (synchronous, individually testable)
// ─────────────────────────────────────────────────────────────────────────────

/// Analysis tick: 24 h failure trends, spike insights, pattern mining, and
/// rule lifecycle review.
pub(crate) fn run_analysis_tick(
    store: &Store,
    adaptive: &AdaptiveGuardrailManager,
    adaptive_learning: bool,
) -> Result<(), StoreError> {
    let conn = store.conn()?;
    let cutoff = days_ago_iso(1);
    let trends = FailureRepository::counts_by_category_since(&conn, &cutoff)?;
    drop(conn);

    for (category, count) in &trends {
        if *count > SPIKE_THRESHOLD {
            warn!(
                category = %category,
                count,
                "high frequency of failures detected"
            );
        }
    }

    if adaptive_learning {
        let analyzer = PatternAnalyzer::new(store.clone());
        let patterns = analyzer.analyze_failures(RETENTION_DAYS, None)?;
        let minted = adaptive.generate_from_patterns(&patterns, None)?;
        debug!(
            patterns = patterns.len(),
            minted = minted.len(),
            "adaptive mining complete"
        );
        review_rule_lifecycles(store, adaptive)?;
    }

    debug!(categories = trends.len(), "analysis tick complete");
    Ok(())
}

/// Promote trial rules with sustained effectiveness; deprecate rules whose
/// false positives dominate.
fn review_rule_lifecycles(
    store: &Store,
    adaptive: &AdaptiveGuardrailManager,
) -> Result<(), StoreError> {
    let conn = store.conn()?;

    for rule in RuleRepository::in_trial(&conn)? {
        let totals = EffectivenessRepository::totals(&conn, rule.id)?;
        if totals.times_triggered >= PROMOTION_MIN_TRIGGERS && totals.success_rate() > 0.5 {
            let _ = adaptive.promote_to_validated(rule.id);
        }
    }

    for rule in RuleRepository::active(&conn, 0.0)? {
        let totals = EffectivenessRepository::totals(&conn, rule.id)?;
        if totals.times_triggered >= PROMOTION_MIN_TRIGGERS
            && totals.false_positives > totals.prevented_failures
        {
            let _ = adaptive.deprecate(rule.id, "low_effectiveness");
        }
    }

    Ok(())
}

/// Metrics tick: aggregate the last 24 h into today's rollup row.
pub(crate) fn run_metrics_tick(store: &Store) -> Result<(), StoreError> {
    let conn = store.conn()?;
    let cutoff = days_ago_iso(1);

    let total = SessionRepository::count_since(&conn, &cutoff)?;
    let approved = SessionRepository::approved_count_since(&conn, &cutoff)?;
    let success_rate = if total > 0 {
        approved as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let avg_ms = SessionRepository::avg_execution_ms_since(&conn, &cutoff)?.unwrap_or(0.0);
    let top_violations = ViolationRepository::top_rules_since(&conn, &cutoff, 5)?;
    let top_failures = FailureRepository::counts_by_category_since(&conn, &cutoff)?;

    MetricsRepository::upsert(
        &conn,
        &MetricsRollup {
            date: today_date(),
            total_sessions: total,
            success_rate,
            avg_execution_time_ms: avg_ms as i64,
            top_violations: serde_json::json!(top_violations),
            top_failures: serde_json::json!(
                top_failures.iter().take(5).collect::<Vec<_>>()
            ),
        },
    )?;

    debug!(total_sessions = total, success_rate, "metrics tick complete");
    Ok(())
}

/// Export tick: render recent failures into the markdown report.
pub(crate) fn run_export_tick(store: &Store, export_path: &PathBuf) -> Result<(), StoreError> {
    let conn = store.conn()?;
    let failures = FailureRepository::recent(&conn, 100)?;

    let mut lines = vec![
        "# AI Failure Modes - GuardLoop".to_string(),
        String::new(),
        format!(
            "**Generated**: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        ),
        format!("**Total Failures**: {}", failures.len()),
        String::new(),
        "---".to_string(),
        String::new(),
        "## Recent Failures".to_string(),
        String::new(),
    ];

    if failures.is_empty() {
        lines.push("No failures detected recently.".to_string());
    } else {
        lines.push("| Timestamp | Category | Severity | Tool | Context |".to_string());
        lines.push("|-----------|----------|----------|------|---------|".to_string());
        for failure in failures.iter().take(50) {
            let context: String = failure
                .context
                .as_deref()
                .unwrap_or("")
                .chars()
                .take(50)
                .collect();
            lines.push(format!(
                "| {} | {} | {} | {} | {}... |",
                failure.timestamp, failure.category, failure.severity, failure.tool, context
            ));
        }
    }

    lines.extend([
        String::new(),
        "---".to_string(),
        String::new(),
        "**Powered by GuardLoop**".to_string(),
    ]);

    if let Some(parent) = export_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::write(export_path, lines.join("\n")).map_err(|e| {
        StoreError::new(
            "markdown_export",
            guardloop_core::errors::StoreOperation::Write,
            e.to_string(),
        )
    })?;

    debug!(exported = failures.len(), path = %export_path.display(), "export tick complete");
    Ok(())
}

/// Cleanup tick: session retention, vacuum, and log rotation.
pub(crate) fn run_cleanup_tick(
    store: &Store,
    logging: Option<&LoggingSettings>,
) -> Result<(), StoreError> {
    let cutoff = days_ago_iso(RETENTION_DAYS);
    let conn = store.conn()?;
    let deleted = SessionRepository::delete_older_than(&conn, &cutoff)?;
    store.vacuum()?;

    if let Some(logging) = logging.filter(|l| !l.file.is_empty()) {
        guardloop_logging::rotate_if_needed(
            &expand_tilde(&logging.file),
            logging.max_size_mb,
            logging.backup_count,
        );
    }

    info!(deleted_sessions = deleted, "cleanup tick complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
