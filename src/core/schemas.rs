// src/core/schemas.rs
// Centralized schema definitions for every corpus group.
//
// Groups are append-only tables: rows are inserted, never updated or
// deleted. `seq` is the per-group monotonic position the length log tracks.
// The one sanctioned exception is audit retention compaction (see
// core::audit), which moves aged rows into audit_digests.

pub const CORPUS_DB_NAME: &str = "corpus.db";
pub const LENGTHS_LOG_NAME: &str = "corpus.lengths.log";
pub const SCHEMA_VERSION: u32 = 1;

/// Every append-only group, in initialization order.
pub const GROUPS: &[&str] = &[
    "interactions",
    "embeddings",
    "sessions",
    "session_events",
    "audio_artifacts",
    "jobs",
    "job_events",
    "audit_events",
    "audit_digests",
    "exports",
    "export_events",
];

pub const CORPUS_META_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS corpus_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const INTERACTIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS interactions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        interaction_id TEXT NOT NULL UNIQUE,
        session_id TEXT NOT NULL,
        prompt TEXT NOT NULL,
        response TEXT NOT NULL,
        model TEXT NOT NULL,
        tokens INTEGER NOT NULL,
        ts TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}'
    )
";

pub const EMBEDDINGS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS embeddings (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        interaction_id TEXT NOT NULL,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        ts TEXT NOT NULL
    )
";

pub const SESSIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}'
    )
";

// Session state is the fold of this group; the sessions row never changes.
pub const SESSION_EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS session_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL UNIQUE,
        session_id TEXT NOT NULL,
        state TEXT NOT NULL,
        ts TEXT NOT NULL
    )
";

pub const AUDIO_ARTIFACTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audio_artifacts (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        artifact_id TEXT NOT NULL UNIQUE,
        session_id TEXT NOT NULL,
        bytes_ref TEXT NOT NULL,
        sha256 TEXT NOT NULL,
        mime TEXT NOT NULL,
        duration_ms INTEGER,
        uploaded_at TEXT NOT NULL
    )
";

pub const JOBS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS jobs (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        input_ref TEXT NOT NULL,
        input_digest TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
";

// Current status is the latest event for the job_id.
pub const JOB_EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS job_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL UNIQUE,
        job_id TEXT NOT NULL,
        status TEXT NOT NULL,
        ts TEXT NOT NULL,
        error_class TEXT,
        result_ref TEXT
    )
";

pub const AUDIT_EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audit_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL UNIQUE,
        ts TEXT NOT NULL,
        operation TEXT NOT NULL,
        user_id TEXT NOT NULL,
        resource TEXT NOT NULL,
        result TEXT NOT NULL,
        payload_digest TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}'
    )
";

pub const AUDIT_DIGESTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audit_digests (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        digest_id TEXT NOT NULL UNIQUE,
        month TEXT NOT NULL,
        event_count INTEGER NOT NULL,
        first_seq INTEGER NOT NULL,
        last_seq INTEGER NOT NULL,
        aggregate_sha256 TEXT NOT NULL,
        signature TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

pub const EXPORTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS exports (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        export_id TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        selectors TEXT NOT NULL,
        manifest TEXT NOT NULL,
        signature TEXT NOT NULL,
        policy_version TEXT NOT NULL
    )
";

// Soft deletion is an event here; export rows and artifact bytes survive.
pub const EXPORT_EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS export_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL UNIQUE,
        export_id TEXT NOT NULL,
        event TEXT NOT NULL,
        ts TEXT NOT NULL
    )
";

pub const IDX_INTERACTIONS_SESSION: &str =
    "CREATE INDEX IF NOT EXISTS idx_interactions_session ON interactions(session_id)";
pub const IDX_EMBEDDINGS_INTERACTION: &str =
    "CREATE INDEX IF NOT EXISTS idx_embeddings_interaction ON embeddings(interaction_id)";
pub const IDX_SESSION_EVENTS_SESSION: &str =
    "CREATE INDEX IF NOT EXISTS idx_session_events_session ON session_events(session_id)";
pub const IDX_JOB_EVENTS_JOB: &str =
    "CREATE INDEX IF NOT EXISTS idx_job_events_job ON job_events(job_id)";
pub const IDX_AUDIT_OPERATION: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_operation ON audit_events(operation)";
pub const IDX_AUDIT_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_events(user_id)";
pub const IDX_ARTIFACTS_SESSION: &str =
    "CREATE INDEX IF NOT EXISTS idx_artifacts_session ON audio_artifacts(session_id)";

/// All CREATE statements in initialization order.
pub const ALL_SCHEMAS: &[&str] = &[
    CORPUS_META_SCHEMA,
    INTERACTIONS_SCHEMA,
    EMBEDDINGS_SCHEMA,
    SESSIONS_SCHEMA,
    SESSION_EVENTS_SCHEMA,
    AUDIO_ARTIFACTS_SCHEMA,
    JOBS_SCHEMA,
    JOB_EVENTS_SCHEMA,
    AUDIT_EVENTS_SCHEMA,
    AUDIT_DIGESTS_SCHEMA,
    EXPORTS_SCHEMA,
    EXPORT_EVENTS_SCHEMA,
    IDX_INTERACTIONS_SESSION,
    IDX_EMBEDDINGS_INTERACTION,
    IDX_SESSION_EVENTS_SESSION,
    IDX_JOB_EVENTS_JOB,
    IDX_AUDIT_OPERATION,
    IDX_AUDIT_USER,
    IDX_ARTIFACTS_SESSION,
];

/// Salvage table DDL for a group, created lazily when a crash tail is
/// quarantined. Rows keep their original seq for later operator inspection.
pub fn salvage_schema(group: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}_salvage (
            original_seq INTEGER NOT NULL,
            quarantined_at TEXT NOT NULL,
            row_json TEXT NOT NULL
        )",
        group
    )
}
