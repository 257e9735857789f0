//! Export manifests and their soft-delete events.

use crate::core::audit::{AuditEvent, AuditOperation, AuditResult};
use crate::core::error::EngineError;
use crate::core::serialize;
use crate::core::store::CorpusStore;
use crate::core::time;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub export_id: String,
    pub created_at: String,
    pub selectors: JsonValue,
    pub manifest: JsonValue,
    pub signature: String,
    pub policy_version: String,
    pub deleted_at: Option<String>,
}

pub struct ExportRepository<'a> {
    store: &'a CorpusStore,
}

impl<'a> ExportRepository<'a> {
    pub fn new(store: &'a CorpusStore) -> Self {
        Self { store }
    }

    pub fn create(&self, user_id: &str, record: &ExportRecord) -> Result<(), EngineError> {
        let event = AuditEvent::new(
            AuditOperation::EXPORT_CREATED,
            user_id,
            &format!("export/{}", record.export_id),
            AuditResult::Success,
            &record.manifest,
        );
        let stored = record.clone();
        self.store.with_append("exports", event, move |conn| {
            conn.execute(
                "INSERT INTO exports(export_id, created_at, selectors, manifest, signature, policy_version)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    stored.export_id,
                    stored.created_at,
                    serialize::encode_attr(&stored.selectors),
                    serialize::encode_attr(&stored.manifest),
                    stored.signature,
                    stored.policy_version,
                ],
            )?;
            Ok(())
        })
    }

    pub fn read(&self, export_id: &str) -> Result<ExportRecord, EngineError> {
        let mut record = self.store.with_read(|conn| {
            conn.query_row(
                "SELECT export_id, created_at, selectors, manifest, signature, policy_version
                 FROM exports WHERE export_id = ?1",
                params![export_id],
                |row| {
                    let selectors: String = row.get(2)?;
                    let manifest: String = row.get(3)?;
                    Ok(ExportRecord {
                        export_id: row.get(0)?,
                        created_at: row.get(1)?,
                        selectors: serialize::decode_attr(&selectors),
                        manifest: serialize::decode_attr(&manifest),
                        signature: row.get(4)?,
                        policy_version: row.get(5)?,
                        deleted_at: None,
                    })
                },
            )
            .map_err(|_| EngineError::NotFound(format!("export '{}'", export_id)))
        })?;
        record.deleted_at = self.deleted_at(export_id)?;
        Ok(record)
    }

    pub fn list(&self) -> Result<Vec<ExportRecord>, EngineError> {
        let ids: Vec<String> = self.store.with_read(|conn| {
            let mut stmt = conn.prepare("SELECT export_id FROM exports ORDER BY seq ASC")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.read(&id)?);
        }
        Ok(out)
    }

    fn deleted_at(&self, export_id: &str) -> Result<Option<String>, EngineError> {
        self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ts FROM export_events WHERE export_id = ?1 AND event = 'deleted'
                 ORDER BY seq ASC LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![export_id], |row| row.get(0))?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
    }

    /// Soft delete: an event marks the export deleted; the manifest row and
    /// the artifact bytes stay where they are.
    pub fn append_delete_event(&self, user_id: &str, export_id: &str) -> Result<(), EngineError> {
        self.read(export_id)?;
        let event = AuditEvent::new(
            AuditOperation::EXPORT_DELETED,
            user_id,
            &format!("export/{}", export_id),
            AuditResult::Success,
            &serde_json::json!({}),
        );
        let eid = export_id.to_string();
        self.store.with_append("export_events", event, move |conn| {
            conn.execute(
                "INSERT INTO export_events(event_id, export_id, event, ts) VALUES(?1, ?2, 'deleted', ?3)",
                params![time::new_event_id(), eid, time::now_monotonic_ms_z()],
            )?;
            Ok(())
        })
    }
}
