//! Append-only audit log.
//!
//! Every externally observable state change lands here as an event drawn
//! from a closed catalog of UPPER_SNAKE_CASE operations. Events carry a
//! payload digest, never the payload. The retention sweep compacts events
//! older than the policy window into HS256-signed monthly digest rows; that
//! compaction is the single sanctioned row removal in the whole store and
//! is recorded in the length log as a `compact` entry.

use crate::core::error::EngineError;
use crate::core::manifest;
use crate::core::serialize;
use crate::core::time;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Closed catalog of audit operations. Adding a member here is the only way
/// to introduce a new event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum AuditOperation {
    CORPUS_INITIALIZED,
    INTERACTION_APPENDED,
    EMBEDDING_APPENDED,
    SESSION_CREATED,
    SESSION_FINALIZED,
    SESSION_ARCHIVED,
    ARTIFACT_STORED,
    JOB_ENQUEUED,
    JOB_STARTED,
    JOB_SUCCEEDED,
    JOB_FAILED,
    JOB_CANCEL_REQUESTED,
    LLM_CALL_ROUTED,
    LLM_CALL_FAILED,
    EXPORT_CREATED,
    EXPORT_VERIFIED,
    EXPORT_DELETED,
    POLICY_DENIED,
    OWNERSHIP_VERIFIED,
    OWNERSHIP_DENIED,
    BACKPRESSURE_REJECTED,
    INTEGRITY_VIOLATION,
    AUDIT_COMPACTED,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CORPUS_INITIALIZED => "CORPUS_INITIALIZED",
            Self::INTERACTION_APPENDED => "INTERACTION_APPENDED",
            Self::EMBEDDING_APPENDED => "EMBEDDING_APPENDED",
            Self::SESSION_CREATED => "SESSION_CREATED",
            Self::SESSION_FINALIZED => "SESSION_FINALIZED",
            Self::SESSION_ARCHIVED => "SESSION_ARCHIVED",
            Self::ARTIFACT_STORED => "ARTIFACT_STORED",
            Self::JOB_ENQUEUED => "JOB_ENQUEUED",
            Self::JOB_STARTED => "JOB_STARTED",
            Self::JOB_SUCCEEDED => "JOB_SUCCEEDED",
            Self::JOB_FAILED => "JOB_FAILED",
            Self::JOB_CANCEL_REQUESTED => "JOB_CANCEL_REQUESTED",
            Self::LLM_CALL_ROUTED => "LLM_CALL_ROUTED",
            Self::LLM_CALL_FAILED => "LLM_CALL_FAILED",
            Self::EXPORT_CREATED => "EXPORT_CREATED",
            Self::EXPORT_VERIFIED => "EXPORT_VERIFIED",
            Self::EXPORT_DELETED => "EXPORT_DELETED",
            Self::POLICY_DENIED => "POLICY_DENIED",
            Self::OWNERSHIP_VERIFIED => "OWNERSHIP_VERIFIED",
            Self::OWNERSHIP_DENIED => "OWNERSHIP_DENIED",
            Self::BACKPRESSURE_REJECTED => "BACKPRESSURE_REJECTED",
            Self::INTEGRITY_VIOLATION => "INTEGRITY_VIOLATION",
            Self::AUDIT_COMPACTED => "AUDIT_COMPACTED",
        }
    }

    pub const CATALOG: &'static [AuditOperation] = &[
        Self::CORPUS_INITIALIZED,
        Self::INTERACTION_APPENDED,
        Self::EMBEDDING_APPENDED,
        Self::SESSION_CREATED,
        Self::SESSION_FINALIZED,
        Self::SESSION_ARCHIVED,
        Self::ARTIFACT_STORED,
        Self::JOB_ENQUEUED,
        Self::JOB_STARTED,
        Self::JOB_SUCCEEDED,
        Self::JOB_FAILED,
        Self::JOB_CANCEL_REQUESTED,
        Self::LLM_CALL_ROUTED,
        Self::LLM_CALL_FAILED,
        Self::EXPORT_CREATED,
        Self::EXPORT_VERIFIED,
        Self::EXPORT_DELETED,
        Self::POLICY_DENIED,
        Self::OWNERSHIP_VERIFIED,
        Self::OWNERSHIP_DENIED,
        Self::BACKPRESSURE_REJECTED,
        Self::INTEGRITY_VIOLATION,
        Self::AUDIT_COMPACTED,
    ];
}

/// Outcome recorded on an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditResult {
    Success,
    Failure,
    Denied,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub ts: String,
    pub operation: String,
    pub user_id: String,
    pub resource: String,
    pub result: String,
    pub payload_digest: String,
    pub metadata: JsonValue,
}

impl AuditEvent {
    pub fn new(
        operation: AuditOperation,
        user_id: &str,
        resource: &str,
        result: AuditResult,
        payload: &JsonValue,
    ) -> Self {
        Self {
            event_id: time::new_event_id(),
            ts: time::now_monotonic_ms_z(),
            operation: operation.as_str().to_string(),
            user_id: user_id.to_string(),
            resource: resource.to_string(),
            result: result.as_str().to_string(),
            payload_digest: payload_digest(payload),
            metadata: JsonValue::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Digest of an event payload: sha256 over canonical JSON bytes.
pub fn payload_digest(payload: &JsonValue) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manifest::canonical_json_bytes(payload));
    hex::encode(hasher.finalize())
}

/// Insert one audit event row. Callers hold the write lock; the store
/// invokes this inside the same critical section as the data append.
pub fn insert_event(conn: &Connection, event: &AuditEvent) -> Result<i64, EngineError> {
    conn.execute(
        "INSERT INTO audit_events(event_id, ts, operation, user_id, resource, result, payload_digest, metadata)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.event_id,
            event.ts,
            event.operation,
            event.user_id,
            event.resource,
            event.result,
            event.payload_digest,
            serialize::encode_attr(&event.metadata),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Query filter for the audit log.
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub operation: Option<String>,
    pub user_id: Option<String>,
    /// Millisecond timestamps, `Z`-suffixed, inclusive bounds.
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
}

pub fn query_events(conn: &Connection, query: &AuditQuery) -> Result<Vec<AuditEvent>, EngineError> {
    let mut sql = String::from(
        "SELECT event_id, ts, operation, user_id, resource, result, payload_digest, metadata
         FROM audit_events WHERE 1=1",
    );
    let mut args: Vec<String> = Vec::new();
    if let Some(op) = &query.operation {
        sql.push_str(&format!(" AND operation = ?{}", args.len() + 1));
        args.push(op.clone());
    }
    if let Some(user) = &query.user_id {
        sql.push_str(&format!(" AND user_id = ?{}", args.len() + 1));
        args.push(user.clone());
    }
    if let Some(since) = &query.since {
        sql.push_str(&format!(" AND ts >= ?{}", args.len() + 1));
        args.push(since.clone());
    }
    if let Some(until) = &query.until {
        sql.push_str(&format!(" AND ts <= ?{}", args.len() + 1));
        args.push(until.clone());
    }
    sql.push_str(" ORDER BY seq ASC");
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
        let raw_meta: String = row.get(7)?;
        Ok(AuditEvent {
            event_id: row.get(0)?,
            ts: row.get(1)?,
            operation: row.get(2)?,
            user_id: row.get(3)?,
            resource: row.get(4)?,
            result: row.get(5)?,
            payload_digest: row.get(6)?,
            metadata: serialize::decode_attr(&raw_meta),
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Report produced by the retention sweep.
#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub compacted: usize,
    pub digests_written: usize,
    pub new_audit_len: i64,
}

/// Compact audit events older than `retention_days` into signed monthly
/// digest rows. Returns what was removed; the caller records the `compact`
/// baseline in the length log and emits AUDIT_COMPACTED.
pub fn sweep_expired(
    conn: &Connection,
    retention_days: u32,
    signing_key: &str,
) -> Result<SweepReport, EngineError> {
    let cutoff_ms = time::now_epoch_secs().saturating_sub(retention_days as u64 * 86_400) * 1_000;
    let cutoff = format!("{}Z", cutoff_ms);

    struct Aged {
        seq: i64,
        event_id: String,
        ts: String,
        line: String,
    }

    let mut stmt = conn.prepare(
        "SELECT seq, event_id, ts, operation, user_id, resource, result, payload_digest
         FROM audit_events WHERE ts < ?1 ORDER BY seq ASC",
    )?;
    let aged: Vec<Aged> = stmt
        .query_map(params![cutoff], |row| {
            let seq: i64 = row.get(0)?;
            let event_id: String = row.get(1)?;
            let ts: String = row.get(2)?;
            let operation: String = row.get(3)?;
            let user_id: String = row.get(4)?;
            let resource: String = row.get(5)?;
            let result: String = row.get(6)?;
            let payload_digest: String = row.get(7)?;
            Ok(Aged {
                seq,
                event_id: event_id.clone(),
                ts: ts.clone(),
                line: format!(
                    "{}|{}|{}|{}|{}|{}|{}",
                    event_id, ts, operation, user_id, resource, result, payload_digest
                ),
            })
        })?
        .collect::<Result<_, _>>()?;

    if aged.is_empty() {
        let len: i64 = conn.query_row("SELECT COUNT(*) FROM audit_events", [], |r| r.get(0))?;
        return Ok(SweepReport {
            compacted: 0,
            digests_written: 0,
            new_audit_len: len,
        });
    }

    // Group by calendar month of the event timestamp.
    let mut months: Vec<(String, Vec<&Aged>)> = Vec::new();
    for ev in &aged {
        let month = month_of_ts(&ev.ts);
        match months.last_mut() {
            Some((m, rows)) if *m == month => rows.push(ev),
            _ => months.push((month, vec![ev])),
        }
    }

    let mut digests_written = 0;
    for (month, rows) in &months {
        let mut hasher = Sha256::new();
        for row in rows {
            hasher.update(row.line.as_bytes());
            hasher.update(b"\n");
        }
        let aggregate = hex::encode(hasher.finalize());
        let first_seq = rows.first().map(|r| r.seq).unwrap_or(0);
        let last_seq = rows.last().map(|r| r.seq).unwrap_or(0);
        let digest_doc = serde_json::json!({
            "month": month,
            "event_count": rows.len(),
            "first_seq": first_seq,
            "last_seq": last_seq,
            "aggregate_sha256": aggregate,
        });
        let signature = manifest::sign_manifest(&digest_doc, signing_key)?;
        conn.execute(
            "INSERT INTO audit_digests(digest_id, month, event_count, first_seq, last_seq, aggregate_sha256, signature, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                time::new_event_id(),
                month,
                rows.len() as i64,
                first_seq,
                last_seq,
                aggregate,
                signature,
                time::now_monotonic_ms_z(),
            ],
        )?;
        digests_written += 1;
    }

    // The sole sanctioned removal: compacted rows leave the live group.
    for ev in &aged {
        conn.execute(
            "DELETE FROM audit_events WHERE seq = ?1 AND event_id = ?2",
            params![ev.seq, ev.event_id],
        )?;
    }

    let new_audit_len: i64 =
        conn.query_row("SELECT COUNT(*) FROM audit_events", [], |r| r.get(0))?;
    Ok(SweepReport {
        compacted: aged.len(),
        digests_written,
        new_audit_len,
    })
}

/// `YYYY-MM` of a `<ms>Z` timestamp. Civil-date conversion from days since
/// the Unix epoch.
pub fn month_of_ts(ts: &str) -> String {
    let ms: u64 = ts.trim_end_matches('Z').parse().unwrap_or(0);
    let days = (ms / 86_400_000) as i64;
    let (year, month) = civil_from_days(days);
    format!("{:04}-{:02}", year, month)
}

fn civil_from_days(z: i64) -> (i64, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_upper_snake() {
        for op in AuditOperation::CATALOG {
            let name = op.as_str();
            assert!(
                name.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "{} not UPPER_SNAKE_CASE",
                name
            );
        }
    }

    #[test]
    fn test_payload_digest_stable_under_key_order() {
        let a = serde_json::json!({"x": 1, "y": 2});
        let b = serde_json::json!({"y": 2, "x": 1});
        assert_eq!(payload_digest(&a), payload_digest(&b));
    }

    #[test]
    fn test_month_of_ts() {
        // 2024-03-15T00:00:00Z in ms
        assert_eq!(month_of_ts("1710460800000Z"), "2024-03");
        // Epoch start
        assert_eq!(month_of_ts("0Z"), "1970-01");
    }

    #[test]
    fn test_event_constructor_digests_payload_not_content() {
        let payload = serde_json::json!({"prompt": "contains phi"});
        let ev = AuditEvent::new(
            AuditOperation::INTERACTION_APPENDED,
            "alice",
            "interaction/abc",
            AuditResult::Success,
            &payload,
        );
        assert_eq!(ev.operation, "INTERACTION_APPENDED");
        assert_eq!(ev.payload_digest.len(), 64);
        assert!(!ev.payload_digest.contains("phi"));
    }
}
