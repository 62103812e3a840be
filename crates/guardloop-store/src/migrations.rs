//! Schema migrations.
//!
//! Each migration is a batch of SQL applied in a single transaction; applied
//! versions are recorded in `schema_migrations` so reopening an existing
//! store is a no-op.

use rusqlite::Connection;
use tracing::debug;

use guardloop_core::errors::{StoreError, StoreOperation};

/// Ordered migration batches. Index + 1 is the schema version.
const MIGRATIONS: &[&str] = &[
    // v1 — full initial schema
    r"
    CREATE TABLE sessions (
        id                TEXT PRIMARY KEY,
        timestamp         TEXT NOT NULL,
        tool              TEXT NOT NULL,
        agent             TEXT NOT NULL DEFAULT 'auto',
        mode              TEXT NOT NULL CHECK (mode IN ('standard', 'strict')),
        prompt            TEXT NOT NULL,
        augmented_prompt  TEXT,
        raw_output        TEXT,
        parsed_output     TEXT,
        violations_count  INTEGER NOT NULL DEFAULT 0,
        failures_count    INTEGER NOT NULL DEFAULT 0,
        approved          INTEGER NOT NULL DEFAULT 0,
        execution_time_ms INTEGER,
        created_at        TEXT NOT NULL
    );
    CREATE INDEX idx_sessions_timestamp ON sessions (timestamp);
    CREATE INDEX idx_sessions_tool ON sessions (tool);
    CREATE INDEX idx_sessions_approved ON sessions (approved);

    CREATE TABLE failure_modes (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT REFERENCES sessions (id) ON DELETE CASCADE,
        timestamp        TEXT NOT NULL,
        tool             TEXT NOT NULL,
        category         TEXT NOT NULL,
        pattern          TEXT NOT NULL,
        context          TEXT,
        severity         TEXT NOT NULL
            CHECK (severity IN ('low', 'medium', 'high', 'critical')),
        suggestion       TEXT,
        resolved         INTEGER NOT NULL DEFAULT 0,
        resolution_notes TEXT,
        created_at       TEXT NOT NULL
    );
    CREATE INDEX idx_failure_modes_session ON failure_modes (session_id);
    CREATE INDEX idx_failure_modes_timestamp ON failure_modes (timestamp);
    CREATE INDEX idx_failure_modes_category ON failure_modes (category);
    CREATE INDEX idx_failure_modes_severity ON failure_modes (severity);

    CREATE TABLE violations (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id     TEXT NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
        timestamp      TEXT NOT NULL,
        guardrail_type TEXT NOT NULL
            CHECK (guardrail_type IN ('bpsbs', 'ai', 'ux_ui', 'agent')),
        rule           TEXT NOT NULL,
        severity       TEXT NOT NULL
            CHECK (severity IN ('low', 'medium', 'high', 'critical')),
        description    TEXT NOT NULL,
        suggestion     TEXT,
        file_path      TEXT,
        line_number    INTEGER,
        created_at     TEXT NOT NULL
    );
    CREATE INDEX idx_violations_session ON violations (session_id);
    CREATE INDEX idx_violations_timestamp ON violations (timestamp);
    CREATE INDEX idx_violations_type ON violations (guardrail_type);

    CREATE TABLE agent_activity (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id        TEXT REFERENCES sessions (id) ON DELETE CASCADE,
        timestamp         TEXT NOT NULL,
        agent             TEXT NOT NULL,
        action            TEXT NOT NULL,
        success           INTEGER NOT NULL DEFAULT 1,
        execution_time_ms INTEGER,
        error_message     TEXT,
        metadata          TEXT,
        created_at        TEXT NOT NULL
    );
    CREATE INDEX idx_agent_activity_session ON agent_activity (session_id);
    CREATE INDEX idx_agent_activity_timestamp ON agent_activity (timestamp);
    CREATE INDEX idx_agent_activity_agent ON agent_activity (agent);

    CREATE TABLE context_tracking (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id   TEXT NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
        timestamp    TEXT NOT NULL,
        context_type TEXT NOT NULL
            CHECK (context_type IN ('file', 'directory', 'project', 'custom')),
        context_data TEXT NOT NULL,
        tokens_used  INTEGER NOT NULL DEFAULT 0 CHECK (tokens_used >= 0),
        created_at   TEXT NOT NULL
    );
    CREATE INDEX idx_context_tracking_session ON context_tracking (session_id);

    CREATE TABLE learned_patterns (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        pattern_hash     TEXT NOT NULL UNIQUE,
        category         TEXT NOT NULL,
        signature        TEXT NOT NULL,
        description      TEXT NOT NULL,
        frequency        INTEGER NOT NULL DEFAULT 0,
        severity         TEXT NOT NULL
            CHECK (severity IN ('low', 'medium', 'high', 'critical')),
        first_seen       TEXT NOT NULL,
        last_seen        TEXT NOT NULL,
        confidence       REAL NOT NULL DEFAULT 0.0,
        example_sessions TEXT,
        metadata         TEXT,
        created_at       TEXT NOT NULL
    );
    CREATE INDEX idx_learned_patterns_category ON learned_patterns (category);
    CREATE INDEX idx_learned_patterns_last_seen ON learned_patterns (last_seen);

    CREATE TABLE dynamic_guardrails (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        pattern_id       INTEGER NOT NULL REFERENCES learned_patterns (id),
        rule_text        TEXT NOT NULL,
        category         TEXT NOT NULL,
        confidence       REAL NOT NULL DEFAULT 0.0,
        status           TEXT NOT NULL DEFAULT 'trial'
            CHECK (status IN ('trial', 'validated', 'enforced', 'deprecated')),
        enforcement_mode TEXT NOT NULL DEFAULT 'warn'
            CHECK (enforcement_mode IN ('warn', 'auto_fix', 'block')),
        task_types       TEXT,
        created_by       TEXT NOT NULL DEFAULT 'pattern_analyzer',
        created_at       TEXT NOT NULL,
        activated_at     TEXT,
        deactivated_at   TEXT,
        metadata         TEXT
    );
    CREATE INDEX idx_dynamic_guardrails_pattern ON dynamic_guardrails (pattern_id);
    CREATE INDEX idx_dynamic_guardrails_status ON dynamic_guardrails (status);

    CREATE TABLE rule_effectiveness (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        rule_id            INTEGER NOT NULL REFERENCES dynamic_guardrails (id),
        date               TEXT NOT NULL,
        times_triggered    INTEGER NOT NULL DEFAULT 0,
        prevented_failures INTEGER NOT NULL DEFAULT 0,
        true_positives     INTEGER NOT NULL DEFAULT 0,
        false_positives    INTEGER NOT NULL DEFAULT 0,
        avg_confidence     REAL NOT NULL DEFAULT 0.0,
        UNIQUE (rule_id, date)
    );
    CREATE INDEX idx_rule_effectiveness_rule ON rule_effectiveness (rule_id);

    CREATE TABLE conversation_history (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id TEXT NOT NULL,
        turn_number     INTEGER NOT NULL,
        role            TEXT NOT NULL
            CHECK (role IN ('user', 'assistant', 'system')),
        content         TEXT NOT NULL,
        timestamp       TEXT NOT NULL,
        tokens_used     INTEGER NOT NULL DEFAULT 0 CHECK (tokens_used >= 0),
        metadata        TEXT,
        UNIQUE (conversation_id, turn_number)
    );
    CREATE INDEX idx_conversation_history_conv
        ON conversation_history (conversation_id, turn_number);

    CREATE TABLE task_classifications (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id          TEXT NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
        task_type           TEXT NOT NULL
            CHECK (task_type IN ('code', 'content', 'creative', 'mixed', 'unknown')),
        confidence          REAL NOT NULL DEFAULT 0.0,
        requires_guardrails INTEGER NOT NULL DEFAULT 1,
        features            TEXT,
        created_at          TEXT NOT NULL
    );
    CREATE INDEX idx_task_classifications_session ON task_classifications (session_id);

    CREATE TABLE metrics (
        id                    INTEGER PRIMARY KEY AUTOINCREMENT,
        date                  TEXT NOT NULL UNIQUE,
        total_sessions        INTEGER NOT NULL DEFAULT 0,
        success_rate          REAL NOT NULL DEFAULT 0.0,
        avg_execution_time_ms INTEGER NOT NULL DEFAULT 0,
        top_violations        TEXT,
        top_failures          TEXT,
        created_at            TEXT NOT NULL,
        updated_at            TEXT NOT NULL
    );
    ",
];

/// Apply all pending migrations.
pub fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .map_err(|e| migrate_err("schema_migrations", e))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| migrate_err("schema_migrations", e))?;

    for (idx, batch) in MIGRATIONS.iter().enumerate() {
        let version = i64::try_from(idx).unwrap_or(i64::MAX) + 1;
        if version <= current {
            continue;
        }
        let tx_sql = format!(
            "BEGIN;\n{batch}\nINSERT INTO schema_migrations (version, applied_at) \
             VALUES ({version}, '{now}');\nCOMMIT;",
            now = crate::now_iso(),
        );
        conn.execute_batch(&tx_sql)
            .map_err(|e| migrate_err("migration batch", e))?;
        debug!(version, "migration applied");
    }

    Ok(())
}

fn migrate_err(table: &str, err: rusqlite::Error) -> StoreError {
    StoreError::new(table, StoreOperation::Migrate, err.to_string()).with_source(err)
}
