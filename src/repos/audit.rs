//! Read access to the audit trail and its compacted digests.

use crate::core::audit::{AuditEvent, AuditQuery};
use crate::core::error::EngineError;
use crate::core::store::CorpusStore;
use rusqlite::params;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuditDigest {
    pub digest_id: String,
    pub month: String,
    pub event_count: i64,
    pub first_seq: i64,
    pub last_seq: i64,
    pub aggregate_sha256: String,
    pub signature: String,
    pub created_at: String,
}

pub struct AuditRepository<'a> {
    store: &'a CorpusStore,
}

impl<'a> AuditRepository<'a> {
    pub fn new(store: &'a CorpusStore) -> Self {
        Self { store }
    }

    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, EngineError> {
        self.store
            .with_read(|conn| crate::core::audit::query_events(conn, query))
    }

    pub fn list_digests(&self, month: Option<&str>) -> Result<Vec<AuditDigest>, EngineError> {
        self.store.with_read(|conn| {
            let (sql, args): (&str, Vec<String>) = match month {
                Some(m) => (
                    "SELECT digest_id, month, event_count, first_seq, last_seq, aggregate_sha256, signature, created_at
                     FROM audit_digests WHERE month = ?1 ORDER BY seq ASC",
                    vec![m.to_string()],
                ),
                None => (
                    "SELECT digest_id, month, event_count, first_seq, last_seq, aggregate_sha256, signature, created_at
                     FROM audit_digests ORDER BY seq ASC",
                    Vec::new(),
                ),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                    Ok(AuditDigest {
                        digest_id: row.get(0)?,
                        month: row.get(1)?,
                        event_count: row.get(2)?,
                        first_seq: row.get(3)?,
                        last_seq: row.get(4)?,
                        aggregate_sha256: row.get(5)?,
                        signature: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Count of events for an operation, handy for liveness checks.
    pub fn count_operation(&self, operation: &str) -> Result<i64, EngineError> {
        self.store.with_read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM audit_events WHERE operation = ?1",
                params![operation],
                |r| r.get(0),
            )?)
        })
    }
}
