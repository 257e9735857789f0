//! The append-only corpus store.
//!
//! One SQLite file holds every entity group; a JSONL sidecar
//! (`corpus.lengths.log`) records each group's length after every append so
//! later opens can prove the groups only ever grew. Shrinkage is fatal
//! (`MutationDetected`): the store latches read-only for the rest of the
//! process and a persistent `violation` marker keeps subsequent opens in
//! that state until an operator intervenes. A crash tail (rows committed
//! after the last recorded length) is quarantined into `<group>_salvage`,
//! never silently truncated.

use crate::core::audit::{self, AuditEvent, AuditOperation, AuditResult};
use crate::core::broker::CorpusBroker;
use crate::core::config::EngineConfig;
use crate::core::db;
use crate::core::error::EngineError;
use crate::core::identity;
use crate::core::schemas;
use crate::core::time;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// One line of the sidecar length log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthEntry {
    /// `init`, `append`, `salvage`, `compact`, or `violation`.
    pub op: String,
    pub group: String,
    pub len: i64,
    pub ts: String,
}

/// Corpus identity block from `corpus_meta`.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusMeta {
    pub corpus_id: String,
    pub schema_version: u32,
    pub owner_identity: String,
    pub salt: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct GroupReport {
    pub group: String,
    pub recorded: i64,
    pub live: i64,
    pub salvaged: i64,
}

#[derive(Debug, Serialize)]
pub struct StoreReport {
    pub corpus_id: String,
    pub schema_version: u32,
    pub groups: Vec<GroupReport>,
    pub read_only: Option<String>,
}

/// Handle over an initialized corpus.
#[derive(Debug)]
pub struct CorpusStore {
    config: EngineConfig,
    broker: CorpusBroker,
    db_path: PathBuf,
    lengths_path: PathBuf,
}

impl CorpusStore {
    /// Create a new corpus: all group tables, the identity block, and the
    /// seeded length log. Fails with `AlreadyInitialized` when a valid
    /// corpus already exists at the path.
    pub fn init(
        config: &EngineConfig,
        owner_credential: &str,
        salt: &str,
    ) -> Result<Self, EngineError> {
        let db_path = config.corpus_db_path();
        if db_path.exists() {
            // Existing and valid means the caller is re-initializing.
            match Self::open(config) {
                Ok(_) => {
                    return Err(EngineError::AlreadyInitialized(format!(
                        "corpus already exists at {}",
                        db_path.display()
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(config.audio_path())?;
        fs::create_dir_all(config.exports_path())?;

        let store = Self {
            config: config.clone(),
            broker: CorpusBroker::new(&db_path),
            db_path: db_path.clone(),
            lengths_path: config.lengths_log_path(),
        };

        let owner_identity = identity::owner_identity(owner_credential, salt);
        let corpus_id = identity::corpus_id(owner_credential, salt);
        let created_at = time::now_monotonic_ms_z();

        store.broker.with_write(|conn| {
            for ddl in schemas::ALL_SCHEMAS {
                conn.execute(ddl, [])?;
            }
            let mut put = |k: &str, v: &str| -> Result<(), EngineError> {
                conn.execute(
                    "INSERT INTO corpus_meta(key, value) VALUES(?1, ?2)",
                    params![k, v],
                )?;
                Ok(())
            };
            put("schema_version", &schemas::SCHEMA_VERSION.to_string())?;
            put("owner_identity", &owner_identity)?;
            put("corpus_id", &corpus_id)?;
            put("salt", salt)?;
            put("created_at", &created_at)?;

            let event = AuditEvent::new(
                AuditOperation::CORPUS_INITIALIZED,
                "system",
                &format!("corpus/{}", corpus_id),
                AuditResult::Success,
                &serde_json::json!({"corpus_id": corpus_id, "schema_version": schemas::SCHEMA_VERSION}),
            );
            audit::insert_event(conn, &event)?;
            Ok(())
        })?;

        for group in schemas::GROUPS {
            let len = if *group == "audit_events" { 1 } else { 0 };
            store.append_length_entry("init", group, len)?;
        }
        Ok(store)
    }

    /// Open an existing corpus, replaying the length log against live group
    /// counts. Crash tails are quarantined; shrinkage is fatal.
    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let db_path = config.corpus_db_path();
        if !db_path.exists() {
            return Err(EngineError::NotFound(format!(
                "no corpus at {}",
                db_path.display()
            )));
        }
        let store = Self {
            config: config.clone(),
            broker: CorpusBroker::new(&db_path),
            db_path: db_path.clone(),
            lengths_path: config.lengths_log_path(),
        };

        store.check_schema_version()?;

        if store
            .read_length_log()?
            .iter()
            .any(|e| e.op == "violation")
        {
            latch_read_only(&store.db_path, "prior mutation detected; operator recovery required");
            return Err(EngineError::MutationDetected(
                "length log carries a violation marker".to_string(),
            ));
        }

        // Replay runs under the writer lock: in-flight appends in this
        // process always commit their row and length entry together, so a
        // consistent read here sees either both or neither.
        let mut shrunk: Option<(String, i64, i64)> = None;
        store.broker.with_write(|conn| {
            let recorded = fold_recorded_lengths(&store.read_length_log()?);
            for group in schemas::GROUPS {
                let live = group_count(conn, group)?;
                let rec = recorded.get(*group).copied().unwrap_or(0);
                if live < rec {
                    shrunk = Some((group.to_string(), rec, live));
                    return Ok(());
                }
                if live > rec {
                    quarantine_tail(conn, group, live - rec)?;
                    store.append_length_entry("salvage", group, rec)?;
                }
            }
            Ok(())
        })?;

        if let Some((group, rec, live)) = shrunk {
            store.record_violation(&group, rec, live)?;
            return Err(EngineError::MutationDetected(format!(
                "group '{}' shrank from {} to {}",
                group, rec, live
            )));
        }

        Ok(store)
    }

    fn check_schema_version(&self) -> Result<(), EngineError> {
        let version: String = self.broker.with_read(|conn| {
            conn.query_row(
                "SELECT value FROM corpus_meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )
            .map_err(|_| EngineError::Integrity("corpus_meta missing schema_version".to_string()))
        })?;
        let version: u32 = version
            .parse()
            .map_err(|_| EngineError::SchemaMismatch(format!("unparseable version '{}'", version)))?;
        if version != schemas::SCHEMA_VERSION {
            return Err(EngineError::SchemaMismatch(format!(
                "stored version {} unknown to this build (expected {})",
                version,
                schemas::SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    /// Identity block.
    pub fn meta(&self) -> Result<CorpusMeta, EngineError> {
        self.broker.with_read(|conn| {
            let mut get = |k: &str| -> Result<String, EngineError> {
                conn.query_row(
                    "SELECT value FROM corpus_meta WHERE key = ?1",
                    params![k],
                    |r| r.get(0),
                )
                .map_err(|_| EngineError::Integrity(format!("corpus_meta missing '{}'", k)))
            };
            let schema_version = get("schema_version")?
                .parse()
                .map_err(|_| EngineError::Integrity("bad schema_version".to_string()))?;
            Ok(CorpusMeta {
                corpus_id: get("corpus_id")?,
                schema_version,
                owner_identity: get("owner_identity")?,
                salt: get("salt")?,
                created_at: get("created_at")?,
            })
        })
    }

    /// Append one record plus its audit event in a single critical section.
    ///
    /// `insert` must add exactly one row to `group`. The audit event is
    /// appended after the data row; both length entries are flushed before
    /// the writer lock is released, so audit order equals append order.
    pub fn with_append<R>(
        &self,
        group: &str,
        event: AuditEvent,
        insert: impl FnOnce(&Connection) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.ensure_writable()?;
        self.detect_shrinkage(&[group, "audit_events"])?;
        self.broker.with_write(|conn| {
            // Baseline read and bookkeeping both happen under the writer
            // lock; a crash after COMMIT but before the length entries is
            // exactly the salvage case the next open handles.
            let recorded = fold_recorded_lengths(&self.read_length_log()?);
            check_monotonic(conn, group, &recorded)?;
            check_monotonic(conn, "audit_events", &recorded)?;
            conn.execute("BEGIN IMMEDIATE", [])?;
            let out = (|| -> Result<R, EngineError> {
                let r = insert(conn)?;
                audit::insert_event(conn, &event)?;
                Ok(r)
            })();
            match out {
                Ok(r) => {
                    conn.execute("COMMIT", [])?;
                    let group_len = group_count(conn, group)?;
                    let audit_len = group_count(conn, "audit_events")?;
                    self.append_length_entry("append", group, group_len)?;
                    self.append_length_entry("append", "audit_events", audit_len)?;
                    Ok(r)
                }
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    Err(e)
                }
            }
        })
    }

    /// Append an audit event with no accompanying data row (ownership
    /// checks, denials, verifications).
    pub fn append_audit_only(&self, event: AuditEvent) -> Result<(), EngineError> {
        self.ensure_writable()?;
        self.detect_shrinkage(&["audit_events"])?;
        self.broker.with_write(|conn| {
            let recorded = fold_recorded_lengths(&self.read_length_log()?);
            check_monotonic(conn, "audit_events", &recorded)?;
            audit::insert_event(conn, &event)?;
            let audit_len = group_count(conn, "audit_events")?;
            self.append_length_entry("append", "audit_events", audit_len)?;
            Ok(())
        })
    }

    /// Random-access read; unbounded concurrency, never exposes a writer.
    pub fn with_read<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.broker.with_read(f)
    }

    /// Recompute the identity hash for a presented credential and compare
    /// constant-time. Emits OWNERSHIP_VERIFIED or OWNERSHIP_DENIED.
    pub fn verify_ownership(&self, owner_credential: &str, user_id: &str) -> Result<bool, EngineError> {
        let meta = self.meta()?;
        let ok = identity::verify_identity(&meta.owner_identity, owner_credential, &meta.salt);
        let (op, result) = if ok {
            (AuditOperation::OWNERSHIP_VERIFIED, AuditResult::Success)
        } else {
            (AuditOperation::OWNERSHIP_DENIED, AuditResult::Denied)
        };
        let event = AuditEvent::new(
            op,
            user_id,
            &format!("corpus/{}", meta.corpus_id),
            result,
            &serde_json::json!({"verified": ok}),
        );
        // A denial must be auditable even after the latch trips.
        if read_only_reason(&self.db_path).is_none() {
            self.append_audit_only(event)?;
        }
        Ok(ok)
    }

    /// Full consistency report: schema version, recorded vs live lengths,
    /// salvage inventory, read-only latch state.
    pub fn validate(&self) -> Result<StoreReport, EngineError> {
        self.check_schema_version()?;
        let meta = self.meta()?;
        let recorded = fold_recorded_lengths(&self.read_length_log()?);
        let groups = self.broker.with_read(|conn| {
            let mut out = Vec::new();
            for group in schemas::GROUPS {
                let live = group_count(conn, group)?;
                let salvaged = salvage_count(conn, group)?;
                out.push(GroupReport {
                    group: group.to_string(),
                    recorded: recorded.get(*group).copied().unwrap_or(0),
                    live,
                    salvaged,
                });
            }
            Ok(out)
        })?;
        for g in &groups {
            if g.live < g.recorded {
                self.record_violation(&g.group, g.recorded, g.live)?;
                return Err(EngineError::MutationDetected(format!(
                    "group '{}' shrank from {} to {}",
                    g.group, g.recorded, g.live
                )));
            }
        }
        Ok(StoreReport {
            corpus_id: meta.corpus_id,
            schema_version: meta.schema_version,
            groups,
            read_only: read_only_reason(&self.db_path),
        })
    }

    /// Current length of a group; the export pipeline uses this as its
    /// consistency marker.
    pub fn group_len(&self, group: &str) -> Result<i64, EngineError> {
        self.broker.with_read(|conn| group_count(conn, group))
    }

    /// Run the audit retention sweep under the writer lock, then record the
    /// compaction baseline and its audit event.
    pub fn sweep_audit(
        &self,
        retention_days: u32,
        signing_key: &str,
        user_id: &str,
    ) -> Result<audit::SweepReport, EngineError> {
        self.ensure_writable()?;
        let report = self.broker.with_write(|conn| {
            let report = audit::sweep_expired(conn, retention_days, signing_key)?;
            if report.compacted > 0 {
                // New baselines land before the lock releases so no writer
                // ever observes the between state.
                self.append_length_entry("compact", "audit_events", report.new_audit_len)?;
                let digests_len = group_count(conn, "audit_digests")?;
                self.append_length_entry("append", "audit_digests", digests_len)?;
            }
            Ok(report)
        })?;
        if report.compacted > 0 {
            let meta = self.meta()?;
            self.append_audit_only(
                AuditEvent::new(
                    AuditOperation::AUDIT_COMPACTED,
                    user_id,
                    &format!("corpus/{}", meta.corpus_id),
                    AuditResult::Success,
                    &serde_json::json!({
                        "compacted": report.compacted,
                        "digests_written": report.digests_written,
                    }),
                ),
            )?;
        }
        Ok(report)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_only(&self) -> Option<String> {
        read_only_reason(&self.db_path)
    }

    fn ensure_writable(&self) -> Result<(), EngineError> {
        if let Some(reason) = read_only_reason(&self.db_path) {
            return Err(EngineError::MutationDetected(format!(
                "store is read-only: {}",
                reason
            )));
        }
        Ok(())
    }

    /// Pre-lock shrinkage detection: compares live counts to the recorded
    /// baseline and, on shrinkage, latches and records the violation before
    /// returning `MutationDetected`. Runs without the writer lock held so
    /// the violation can be recorded through the normal write path.
    fn detect_shrinkage(&self, groups: &[&str]) -> Result<(), EngineError> {
        let recorded = fold_recorded_lengths(&self.read_length_log()?);
        let mut shrunk: Option<(String, i64, i64)> = None;
        self.broker.with_read(|conn| {
            for group in groups {
                let rec = recorded.get(*group).copied().unwrap_or(0);
                let live = group_count(conn, group)?;
                if live < rec {
                    shrunk = Some((group.to_string(), rec, live));
                    break;
                }
            }
            Ok(())
        })?;
        if let Some((group, rec, live)) = shrunk {
            self.record_violation(&group, rec, live)?;
            return Err(EngineError::MutationDetected(format!(
                "group '{}' shrank from {} to {}",
                group, rec, live
            )));
        }
        Ok(())
    }

    fn record_violation(&self, group: &str, recorded: i64, live: i64) -> Result<(), EngineError> {
        latch_read_only(
            &self.db_path,
            &format!("group '{}' shrank from {} to {}", group, recorded, live),
        );
        self.append_length_entry("violation", group, live)?;
        // Best-effort: the violation itself is audited, directly, because
        // the normal append path is latched.
        let _ = self.broker.with_write(|conn| {
            let event = AuditEvent::new(
                AuditOperation::INTEGRITY_VIOLATION,
                "system",
                &format!("group/{}", group),
                AuditResult::Failure,
                &serde_json::json!({"recorded": recorded, "live": live}),
            );
            audit::insert_event(conn, &event)?;
            Ok(())
        });
        Ok(())
    }

    fn read_length_log(&self) -> Result<Vec<LengthEntry>, EngineError> {
        if !self.lengths_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.lengths_path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LengthEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(_) => continue,
            }
        }
        Ok(entries)
    }

    fn append_length_entry(&self, op: &str, group: &str, len: i64) -> Result<(), EngineError> {
        let entry = LengthEntry {
            op: op.to_string(),
            group: group.to_string(),
            len,
            ts: time::now_monotonic_ms_z(),
        };
        let lock = lengths_log_lock();
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::Internal("length log lock poisoned".to_string()))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.lengths_path)?;
        writeln!(f, "{}", serde_json::to_string(&entry)?)?;
        f.sync_all()?;
        Ok(())
    }
}

/// In-lock monotonicity check. Recording happens in `detect_shrinkage`
/// before the lock is taken; this guard only refuses the write.
fn check_monotonic(
    conn: &Connection,
    group: &str,
    recorded: &HashMap<String, i64>,
) -> Result<(), EngineError> {
    let rec = recorded.get(group).copied().unwrap_or(0);
    let live = group_count(conn, group)?;
    if live < rec {
        return Err(EngineError::MutationDetected(format!(
            "group '{}' shrank from {} to {}",
            group, rec, live
        )));
    }
    if live > rec {
        return Err(EngineError::Integrity(format!(
            "group '{}' has {} unrecorded rows; reopen to salvage",
            group,
            live - rec
        )));
    }
    Ok(())
}

/// Last recorded length per group. `compact` entries reset the baseline;
/// `violation` entries are inspected separately.
fn fold_recorded_lengths(entries: &[LengthEntry]) -> HashMap<String, i64> {
    let mut map = HashMap::new();
    for entry in entries {
        match entry.op.as_str() {
            "init" | "append" | "salvage" | "compact" => {
                map.insert(entry.group.clone(), entry.len);
            }
            _ => {}
        }
    }
    map
}

fn group_count(conn: &Connection, group: &str) -> Result<i64, EngineError> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", group), [], |r| r.get(0))?)
}

fn salvage_count(conn: &Connection, group: &str) -> Result<i64, EngineError> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        params![format!("{}_salvage", group)],
        |r| r.get(0),
    )?;
    if exists == 0 {
        return Ok(0);
    }
    group_count(conn, &format!("{}_salvage", group))
}

/// Move the newest `n` rows of a group into its salvage table, preserving
/// the row content as JSON for operator inspection.
fn quarantine_tail(conn: &Connection, group: &str, n: i64) -> Result<(), EngineError> {
    conn.execute(&schemas::salvage_schema(group), [])?;
    let quarantined_at = time::now_monotonic_ms_z();

    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} ORDER BY seq DESC LIMIT {}",
        group, n
    ))?;
    let col_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let seq_idx = col_names
        .iter()
        .position(|c| c == "seq")
        .ok_or_else(|| EngineError::Integrity(format!("group '{}' lacks seq column", group)))?;

    let rows: Vec<(i64, JsonValue)> = stmt
        .query_map([], |row| {
            let seq: i64 = row.get(seq_idx)?;
            let mut obj = serde_json::Map::new();
            for (i, name) in col_names.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => JsonValue::Null,
                    ValueRef::Integer(v) => JsonValue::from(v),
                    ValueRef::Real(v) => JsonValue::from(v),
                    ValueRef::Text(t) => {
                        JsonValue::String(String::from_utf8_lossy(t).to_string())
                    }
                    ValueRef::Blob(b) => JsonValue::String(hex::encode(b)),
                };
                obj.insert(name.clone(), value);
            }
            Ok((seq, JsonValue::Object(obj)))
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    for (seq, row_json) in rows {
        conn.execute(
            &format!(
                "INSERT INTO {}_salvage(original_seq, quarantined_at, row_json) VALUES(?1, ?2, ?3)",
                group
            ),
            params![seq, quarantined_at, row_json.to_string()],
        )?;
        conn.execute(
            &format!("DELETE FROM {} WHERE seq = ?1", group),
            params![seq],
        )?;
    }
    Ok(())
}

fn read_only_map() -> &'static Mutex<HashMap<PathBuf, String>> {
    static MAP: OnceLock<Mutex<HashMap<PathBuf, String>>> = OnceLock::new();
    MAP.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lengths_log_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Latch a corpus read-only for the remainder of the process.
pub fn latch_read_only(db_path: &Path, reason: &str) {
    if let Ok(mut map) = read_only_map().lock() {
        map.entry(db_path.to_path_buf())
            .or_insert_with(|| reason.to_string());
    }
}

pub fn read_only_reason(db_path: &Path) -> Option<String> {
    read_only_map()
        .lock()
        .ok()
        .and_then(|map| map.get(db_path).cloned())
}

/// Test hook: drop a latch so isolated cases can reuse a path.
pub fn reset_read_only_latch(db_path: &Path) {
    if let Ok(mut map) = read_only_map().lock() {
        map.remove(db_path);
    }
}

/// Open a raw connection for out-of-band inspection in tests and tooling.
/// Mutating through this handle is exactly what `MutationDetected` exists
/// to catch.
pub fn raw_connection(db_path: &Path) -> Result<Connection, EngineError> {
    db::db_connect(db_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &Path) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.storage_root = root.to_path_buf();
        config
    }

    #[test]
    fn test_init_then_reinit_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        CorpusStore::init(&config, "alice", "s1").unwrap();
        let err = CorpusStore::init(&config, "alice", "s1").unwrap_err();
        assert!(matches!(err, EngineError::AlreadyInitialized(_)));
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let err = CorpusStore::open(&config).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_append_records_lengths_and_audit() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let store = CorpusStore::init(&config, "alice", "s1").unwrap();

        let event = AuditEvent::new(
            AuditOperation::SESSION_CREATED,
            "alice",
            "session/s-1",
            AuditResult::Success,
            &serde_json::json!({}),
        );
        store
            .with_append("sessions", event, |conn| {
                conn.execute(
                    "INSERT INTO sessions(session_id, user_id, created_at, metadata) VALUES('s-1', 'alice', '0Z', '{}')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.group_len("sessions").unwrap(), 1);
        // init event + session event
        assert_eq!(store.group_len("audit_events").unwrap(), 2);

        let report = store.validate().unwrap();
        let sessions = report.groups.iter().find(|g| g.group == "sessions").unwrap();
        assert_eq!(sessions.recorded, 1);
        assert_eq!(sessions.live, 1);
    }

    #[test]
    fn test_ownership_verification() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let store = CorpusStore::init(&config, "alice", "s1").unwrap();
        assert!(store.verify_ownership("alice", "alice").unwrap());
        assert!(!store.verify_ownership("bob", "bob").unwrap());
    }
}
