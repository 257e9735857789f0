//! Job records and their append-only status events.
//!
//! A job row is immutable; its lifecycle is the fold of `job_events`. A job
//! with no events is `pending`. Retries are new job rows with `attempts + 1`
//! and never touch the prior record.

use crate::core::audit::{AuditEvent, AuditOperation, AuditResult};
use crate::core::error::EngineError;
use crate::core::store::CorpusStore;
use crate::core::time;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Transcribe,
    Diarize,
    Embed,
    Export,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Diarize => "diarize",
            Self::Embed => "embed",
            Self::Export => "export",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "transcribe" => Ok(Self::Transcribe),
            "diarize" => Ok(Self::Diarize),
            "embed" => Ok(Self::Embed),
            "export" => Ok(Self::Export),
            other => Err(EngineError::Validation(format!(
                "unknown job kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub kind: JobKind,
    pub input_ref: String,
    pub input_digest: String,
    pub attempts: i64,
    pub created_at: String,
    pub status: JobStatus,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub error_class: Option<String>,
    pub result_ref: Option<String>,
    pub cancel_requested: bool,
}

/// Deterministic job id: same kind, input, and attempt always produce the
/// same id, which is what makes enqueueing idempotent.
pub fn job_id_for(kind: JobKind, input_digest: &str, attempts: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(input_digest.as_bytes());
    hasher.update(b":");
    hasher.update(attempts.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("job-{}", &digest[..20])
}

pub struct JobRepository<'a> {
    store: &'a CorpusStore,
}

impl<'a> JobRepository<'a> {
    pub fn new(store: &'a CorpusStore) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        user_id: &str,
        kind: JobKind,
        input_ref: &str,
        input_digest: &str,
        attempts: i64,
    ) -> Result<Job, EngineError> {
        let job = Job {
            job_id: job_id_for(kind, input_digest, attempts),
            kind,
            input_ref: input_ref.to_string(),
            input_digest: input_digest.to_string(),
            attempts,
            created_at: time::now_monotonic_ms_z(),
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            error_class: None,
            result_ref: None,
            cancel_requested: false,
        };
        let event = AuditEvent::new(
            AuditOperation::JOB_ENQUEUED,
            user_id,
            &format!("job/{}", job.job_id),
            AuditResult::Success,
            &serde_json::json!({
                "kind": kind.as_str(),
                "input_digest": input_digest,
                "attempts": attempts,
            }),
        );
        let stored = job.clone();
        self.store.with_append("jobs", event, move |conn| {
            conn.execute(
                "INSERT INTO jobs(job_id, kind, input_ref, input_digest, attempts, created_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    stored.job_id,
                    stored.kind.as_str(),
                    stored.input_ref,
                    stored.input_digest,
                    stored.attempts,
                    stored.created_at,
                ],
            )?;
            Ok(())
        })?;
        Ok(job)
    }

    pub fn read(&self, job_id: &str) -> Result<Job, EngineError> {
        let base = self.store.with_read(|conn| {
            conn.query_row(
                "SELECT job_id, kind, input_ref, input_digest, attempts, created_at
                 FROM jobs WHERE job_id = ?1",
                params![job_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .map_err(|_| EngineError::NotFound(format!("job '{}'", job_id)))
        })?;
        let (job_id, kind, input_ref, input_digest, attempts, created_at) = base;
        let mut job = Job {
            job_id: job_id.clone(),
            kind: JobKind::parse(&kind)?,
            input_ref,
            input_digest,
            attempts,
            created_at,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            error_class: None,
            result_ref: None,
            cancel_requested: false,
        };
        self.fold_events(&mut job)?;
        Ok(job)
    }

    fn fold_events(&self, job: &mut Job) -> Result<(), EngineError> {
        let events = self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, ts, error_class, result_ref FROM job_events
                 WHERE job_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map(params![job.job_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        for (status, ts, error_class, result_ref) in events {
            match status.as_str() {
                "running" => {
                    job.status = JobStatus::Running;
                    job.started_at = Some(ts);
                }
                "succeeded" => {
                    job.status = JobStatus::Succeeded;
                    job.finished_at = Some(ts);
                    job.result_ref = result_ref;
                }
                "failed" => {
                    job.status = JobStatus::Failed;
                    job.finished_at = Some(ts);
                    job.error_class = error_class;
                }
                "cancel_requested" => {
                    job.cancel_requested = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Append a lifecycle event. Terminal states may carry an error class
    /// (never a raw provider message) or a result reference.
    pub fn append_status_event(
        &self,
        user_id: &str,
        job_id: &str,
        status: JobStatus,
        error_class: Option<&str>,
        result_ref: Option<&str>,
    ) -> Result<(), EngineError> {
        let op = match status {
            JobStatus::Running => AuditOperation::JOB_STARTED,
            JobStatus::Succeeded => AuditOperation::JOB_SUCCEEDED,
            JobStatus::Failed => AuditOperation::JOB_FAILED,
            JobStatus::Pending => {
                return Err(EngineError::InvalidTransition(
                    "jobs begin pending; no event returns them there".to_string(),
                ));
            }
        };
        let result = if status == JobStatus::Failed {
            AuditResult::Failure
        } else {
            AuditResult::Success
        };
        let event = AuditEvent::new(
            op,
            user_id,
            &format!("job/{}", job_id),
            result,
            &serde_json::json!({
                "status": status.as_str(),
                "error_class": error_class,
            }),
        );
        let jid = job_id.to_string();
        let err = error_class.map(|s| s.to_string());
        let res = result_ref.map(|s| s.to_string());
        self.store.with_append("job_events", event, move |conn| {
            conn.execute(
                "INSERT INTO job_events(event_id, job_id, status, ts, error_class, result_ref)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    time::new_event_id(),
                    jid,
                    status.as_str(),
                    time::now_monotonic_ms_z(),
                    err,
                    res,
                ],
            )?;
            Ok(())
        })
    }

    /// Record a cooperative cancellation request.
    pub fn request_cancel(&self, user_id: &str, job_id: &str) -> Result<(), EngineError> {
        self.read(job_id)?;
        let event = AuditEvent::new(
            AuditOperation::JOB_CANCEL_REQUESTED,
            user_id,
            &format!("job/{}", job_id),
            AuditResult::Success,
            &serde_json::json!({}),
        );
        let jid = job_id.to_string();
        self.store.with_append("job_events", event, move |conn| {
            conn.execute(
                "INSERT INTO job_events(event_id, job_id, status, ts, error_class, result_ref)
                 VALUES(?1, ?2, 'cancel_requested', ?3, NULL, NULL)",
                params![time::new_event_id(), jid, time::now_monotonic_ms_z()],
            )?;
            Ok(())
        })
    }

    /// Latest attempt for an input, if any.
    pub fn find_latest_by_input(
        &self,
        kind: JobKind,
        input_digest: &str,
    ) -> Result<Option<Job>, EngineError> {
        let job_id: Option<String> = self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id FROM jobs WHERE kind = ?1 AND input_digest = ?2
                 ORDER BY attempts DESC LIMIT 1",
            )?;
            let mut rows =
                stmt.query_map(params![kind.as_str(), input_digest], |row| row.get(0))?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })?;
        match job_id {
            Some(id) => Ok(Some(self.read(&id)?)),
            None => Ok(None),
        }
    }

    /// Jobs with no lifecycle events yet, oldest first: the work queue.
    pub fn list_pending(&self) -> Result<Vec<Job>, EngineError> {
        let ids: Vec<String> = self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT j.job_id FROM jobs j
                 WHERE NOT EXISTS (
                     SELECT 1 FROM job_events e
                     WHERE e.job_id = j.job_id AND e.status != 'cancel_requested'
                 )
                 ORDER BY j.seq ASC",
            )?;
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

    /// Depth of the pending queue, the back-pressure signal.
    pub fn queue_depth(&self) -> Result<usize, EngineError> {
        Ok(self.list_pending()?.len())
    }
}
