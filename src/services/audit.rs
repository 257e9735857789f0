//! Audit service: queries, retention sweep, and the timeline render.
//!
//! The timeline is a read-only merged view over the audit trail, the job
//! lifecycle events, and the store's length log. It renders existing data
//! and highlights gaps; it never fabricates missing structure.

use crate::core::audit::{AuditQuery, SweepReport};
use crate::core::error::EngineError;
use crate::core::policy::PolicyDocument;
use crate::core::store::CorpusStore;
use crate::repos::audit::{AuditDigest, AuditRepository};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fs::File;
use std::io::{BufRead, BufReader};

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub source: String,
    pub ts: String,
    pub op: String,
    pub actor: Option<String>,
    pub resource: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Timeline {
    pub rendered_at: String,
    pub event_count: usize,
    pub sources: Vec<String>,
    pub events: Vec<TimelineEvent>,
    pub gaps: Vec<String>,
}

pub struct AuditService<'a> {
    store: &'a CorpusStore,
    policy: PolicyDocument,
}

impl<'a> AuditService<'a> {
    pub fn new(store: &'a CorpusStore, policy: PolicyDocument) -> Self {
        Self { store, policy }
    }

    pub fn query(&self, query: &AuditQuery) -> Result<Vec<crate::core::audit::AuditEvent>, EngineError> {
        AuditRepository::new(self.store).query(query)
    }

    pub fn digests(&self, month: Option<&str>) -> Result<Vec<AuditDigest>, EngineError> {
        AuditRepository::new(self.store).list_digests(month)
    }

    /// Daily retention sweep: compact events older than the policy window
    /// into signed monthly digests.
    pub fn sweep_retention(&self, user_id: &str) -> Result<SweepReport, EngineError> {
        self.store.sweep_audit(
            self.policy.retention_days,
            &self.store.config().export_signing_key,
            user_id,
        )
    }

    /// Merged chronological view across the audit trail, job events, and
    /// the length log.
    pub fn timeline(&self, limit: usize) -> Result<Timeline, EngineError> {
        let mut events = Vec::new();
        let mut sources = Vec::new();
        let mut gaps = Vec::new();

        sources.push("audit".to_string());
        for ev in self.query(&AuditQuery {
            limit: Some(limit),
            ..AuditQuery::default()
        })? {
            events.push(TimelineEvent {
                source: "audit".to_string(),
                ts: ev.ts,
                op: ev.operation,
                actor: Some(ev.user_id),
                resource: Some(ev.resource),
                status: Some(ev.result),
            });
        }

        sources.push("jobs".to_string());
        let job_events = self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id, status, ts FROM job_events ORDER BY seq ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        for (job_id, status, ts) in job_events {
            events.push(TimelineEvent {
                source: "jobs".to_string(),
                ts,
                op: format!("job.{}", status),
                actor: None,
                resource: Some(format!("job/{}", job_id)),
                status: Some(status),
            });
        }

        let lengths_path = self.store.config().lengths_log_path();
        if lengths_path.exists() {
            sources.push("lengths".to_string());
            let file = File::open(&lengths_path)?;
            for line in BufReader::new(file).lines().take(limit) {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonValue>(&line) {
                    Ok(entry) => events.push(TimelineEvent {
                        source: "lengths".to_string(),
                        ts: entry
                            .get("ts")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string(),
                        op: format!(
                            "length.{}",
                            entry.get("op").and_then(|v| v.as_str()).unwrap_or("?")
                        ),
                        actor: None,
                        resource: entry
                            .get("group")
                            .and_then(|v| v.as_str())
                            .map(|g| format!("group/{}", g)),
                        status: None,
                    }),
                    Err(_) => gaps.push("lengths: unparseable line".to_string()),
                }
            }
        } else {
            gaps.push("lengths: file not found".to_string());
        }

        events.sort_by(|a, b| a.ts.cmp(&b.ts));
        Ok(Timeline {
            rendered_at: crate::core::time::now_epoch_z(),
            event_count: events.len(),
            sources,
            events,
            gaps,
        })
    }
}

/// Text render for the CLI.
pub fn render_timeline_text(timeline: &Timeline) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Rendered: {}\nTotal Events: {}\nSources: {}\n\n",
        timeline.rendered_at,
        timeline.event_count,
        timeline.sources.join(", ")
    ));
    if !timeline.gaps.is_empty() {
        out.push_str("GAPS / MISSING DATA:\n");
        for gap in &timeline.gaps {
            out.push_str(&format!("  - {}\n", gap));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{:<18} {:<28} {:<12} {:<30}\n",
        "TIME", "OP", "SOURCE", "RESOURCE"
    ));
    for ev in &timeline.events {
        out.push_str(&format!(
            "{:<18} {:<28} {:<12} {:<30}\n",
            ev.ts,
            truncate(&ev.op, 28),
            ev.source,
            truncate(ev.resource.as_deref().unwrap_or("-"), 30),
        ));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        format!("{}...", &s[..max - 3])
    } else {
        s.to_string()
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "audit",
        "version": "0.1.0",
        "description": "Audit queries, retention compaction, timeline render",
        "operations": [
            { "name": "query", "parameters": ["operation?", "user_id?", "since?", "until?", "limit?"] },
            { "name": "digests", "parameters": ["month?"] },
            { "name": "sweep_retention", "parameters": [] },
            { "name": "timeline", "parameters": ["limit"] }
        ],
        "storage": ["audit_events", "audit_digests"]
    })
}
