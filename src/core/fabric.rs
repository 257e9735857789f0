//! The job fabric: upload intake to persisted result.
//!
//! Two modes, probed at startup: native (an in-process pool of worker
//! threads with bounded concurrency) and distributed (jobs are enqueued for
//! external workers to drain; nothing in-process blocks on the broker).
//! Enqueueing is idempotent over the input digest, pending depth beyond the
//! configured limit is rejected with back-pressure, and failures retry with
//! exponential backoff and jitter up to the attempt ceiling.

use crate::core::audit::{AuditEvent, AuditOperation, AuditResult};
use crate::core::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::store::CorpusStore;
use crate::repos::job::{Job, JobKind, JobRepository, JobStatus};
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Seconds a caller should wait before retrying after back-pressure.
pub const RETRY_AFTER_SECS: u64 = 30;

const POLL_INTERVAL_MS: u64 = 100;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 30_000;
const JITTER_MAX_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Native,
    Distributed,
}

/// Startup environment probe: distributed only when configured with a
/// reachable broker target; native otherwise.
pub fn probe_mode(config: &EngineConfig) -> JobMode {
    if config.job_mode == "distributed" && config.broker_url.is_some() {
        JobMode::Distributed
    } else {
        JobMode::Native
    }
}

/// Enqueue a job, idempotently.
///
/// The same kind and input digest return the existing job while it is not
/// failed. A failed job spawns a successor with `attempts + 1`, up to the
/// configured ceiling. Depth beyond the limit is rejected before any record
/// is created.
pub fn enqueue(
    store: &CorpusStore,
    user_id: &str,
    kind: JobKind,
    input_ref: &str,
    input_digest: &str,
) -> Result<Job, EngineError> {
    let repo = JobRepository::new(store);

    if let Some(existing) = repo.find_latest_by_input(kind, input_digest)? {
        if existing.status != JobStatus::Failed {
            return Ok(existing);
        }
        let next_attempt = existing.attempts + 1;
        if next_attempt >= store.config().max_attempts as i64 {
            return Err(EngineError::Validation(format!(
                "retry budget exhausted for input {} (attempts: {})",
                input_digest, existing.attempts
            )));
        }
        return repo.create(user_id, kind, input_ref, input_digest, next_attempt);
    }

    let depth = repo.queue_depth()?;
    if depth >= store.config().queue_depth_limit {
        store.append_audit_only(AuditEvent::new(
            AuditOperation::BACKPRESSURE_REJECTED,
            user_id,
            &format!("queue/{}", kind.as_str()),
            AuditResult::Denied,
            &serde_json::json!({"depth": depth, "limit": store.config().queue_depth_limit}),
        ))?;
        return Err(EngineError::BackPressure(format!(
            "queue depth {} at limit; retry after {}s",
            depth, RETRY_AFTER_SECS
        )));
    }

    repo.create(user_id, kind, input_ref, input_digest, 0)
}

/// What a worker does with a claimed job. Implemented by the service layer;
/// returns a reference to the persisted result record.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, store: &CorpusStore, job: &Job) -> Result<String, EngineError>;
}

/// Bounded in-process worker pool for native mode.
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_concurrency` threads polling the pending queue. Each
    /// worker opens its own store handle; writes still serialize through
    /// the per-corpus writer lock.
    pub fn start(config: &EngineConfig, executor: Arc<dyn JobExecutor>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let claimed: Arc<Mutex<FxHashSet<String>>> = Arc::new(Mutex::new(FxHashSet::default()));
        let mut handles = Vec::new();
        for _ in 0..config.worker_concurrency {
            let config = config.clone();
            let shutdown = Arc::clone(&shutdown);
            let claimed = Arc::clone(&claimed);
            let executor = Arc::clone(&executor);
            handles.push(thread::spawn(move || {
                worker_loop(&config, &shutdown, &claimed, &executor);
            }));
        }
        Self { shutdown, handles }
    }

    /// Signal shutdown and join every worker.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    /// Block until the pending queue and claims drain, or the deadline
    /// passes. Test and CLI convenience.
    pub fn drain(&self, config: &EngineConfig, deadline: Duration) -> Result<(), EngineError> {
        let start = std::time::Instant::now();
        loop {
            let store = CorpusStore::open(config)?;
            let depth = JobRepository::new(&store).queue_depth()?;
            let running = store.with_read(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM jobs j WHERE (
                        SELECT e.status FROM job_events e
                        WHERE e.job_id = j.job_id AND e.status != 'cancel_requested'
                        ORDER BY e.seq DESC LIMIT 1
                    ) = 'running'",
                    [],
                    |r| r.get(0),
                )?;
                Ok(n)
            })?;
            if depth == 0 && running == 0 {
                return Ok(());
            }
            if start.elapsed() > deadline {
                return Err(EngineError::Internal(format!(
                    "drain deadline exceeded with {} pending, {} running",
                    depth, running
                )));
            }
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }
    }
}

fn worker_loop(
    config: &EngineConfig,
    shutdown: &AtomicBool,
    claimed: &Mutex<FxHashSet<String>>,
    executor: &Arc<dyn JobExecutor>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let job = match next_claim(config, claimed) {
            Ok(Some(job)) => job,
            Ok(None) => {
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
                continue;
            }
            Err(_) => {
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
                continue;
            }
        };
        let job_id = job.job_id.clone();
        let _ = run_one(config, executor, job);
        if let Ok(mut set) = claimed.lock() {
            set.remove(&job_id);
        }
    }
}

fn next_claim(
    config: &EngineConfig,
    claimed: &Mutex<FxHashSet<String>>,
) -> Result<Option<Job>, EngineError> {
    let store = CorpusStore::open(config)?;
    let pending = JobRepository::new(&store).list_pending()?;
    let mut set = claimed
        .lock()
        .map_err(|_| EngineError::Internal("claim set lock poisoned".to_string()))?;
    for job in pending {
        // Cancel-requested jobs are still claimed so run_one can finalize
        // them; they never reach the provider.
        if set.insert(job.job_id.clone()) {
            return Ok(Some(job));
        }
    }
    Ok(None)
}

/// Run one claimed job: append `running`, execute under the per-kind
/// timeout, then append the terminal event. Failures past the attempt
/// ceiling stay failed; otherwise a retry is enqueued after backoff.
pub fn run_one(
    config: &EngineConfig,
    executor: &Arc<dyn JobExecutor>,
    job: Job,
) -> Result<(), EngineError> {
    let store = CorpusStore::open(config)?;
    let repo = JobRepository::new(&store);

    // Cooperative cancellation, checked before work starts.
    let current = repo.read(&job.job_id)?;
    if current.cancel_requested {
        repo.append_status_event(
            "worker",
            &job.job_id,
            JobStatus::Failed,
            Some("cancelled"),
            None,
        )?;
        return Ok(());
    }

    repo.append_status_event("worker", &job.job_id, JobStatus::Running, None, None)?;

    let timeout = Duration::from_secs(config.timeout_for(job.kind.as_str()));
    let outcome = execute_with_timeout(config, executor, &job, timeout);

    match outcome {
        Ok(result_ref) => {
            repo.append_status_event(
                "worker",
                &job.job_id,
                JobStatus::Succeeded,
                None,
                Some(&result_ref),
            )?;
        }
        Err(err) => {
            // Error class only; provider text never reaches the record.
            let class = match &err {
                EngineError::Internal(m) if m == "timeout" => "timeout",
                other => other.class(),
            };
            repo.append_status_event("worker", &job.job_id, JobStatus::Failed, Some(class), None)?;
            let next_attempt = job.attempts + 1;
            if next_attempt < config.max_attempts as i64 {
                thread::sleep(backoff_delay(job.attempts as u32));
                let _ = JobRepository::new(&store).create(
                    "worker",
                    job.kind,
                    &job.input_ref,
                    &job.input_digest,
                    next_attempt,
                );
            }
        }
    }
    Ok(())
}

fn execute_with_timeout(
    config: &EngineConfig,
    executor: &Arc<dyn JobExecutor>,
    job: &Job,
    timeout: Duration,
) -> Result<String, EngineError> {
    // The executor runs on a scratch thread so the worker can give up at
    // the deadline; an overrun thread finishes into a dropped channel.
    let (tx, rx) = mpsc::channel();
    let config = config.clone();
    let job = job.clone();
    let executor = Arc::clone(executor);
    thread::spawn(move || {
        let result =
            CorpusStore::open(&config).and_then(|store| executor.execute(&store, &job));
        let _ = tx.send(result);
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(EngineError::Internal("timeout".to_string())),
    }
}

/// Exponential backoff with deterministic sub-tick jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(2u64.saturating_pow(attempt));
    let capped = base.min(BACKOFF_MAX_MS);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64)
        % JITTER_MAX_MS;
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_mode() {
        let mut config = EngineConfig::default();
        assert_eq!(probe_mode(&config), JobMode::Native);
        config.job_mode = "distributed".to_string();
        config.broker_url = Some("amqp://broker:5672".to_string());
        assert_eq!(probe_mode(&config), JobMode::Distributed);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let first = backoff_delay(0).as_millis() as u64;
        let third = backoff_delay(2).as_millis() as u64;
        assert!(first < BACKOFF_BASE_MS + JITTER_MAX_MS + 1);
        assert!(third >= BACKOFF_BASE_MS * 4);
        assert!(backoff_delay(30).as_millis() as u64 <= BACKOFF_MAX_MS + JITTER_MAX_MS);
    }
}
