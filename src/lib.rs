//! dictum: an immutable, event-sourced clinical-session corpus engine.
//!
//! Every interaction with the system — audio uploads, transcriptions,
//! diarization results, model calls, exports — is an append-only record in
//! a single local corpus. Integrity is proved, not assumed: a sidecar
//! length log shows every group only ever grew, content hashes pin artifact
//! bytes, and exports ship under HS256-signed manifests that verify
//! byte-exactly.
//!
//! # Core Principles
//!
//! - **Append-only**: no record is ever edited or removed; corrections are
//!   new records referencing prior ids
//! - **Local-first**: one SQLite corpus per owner, one writer at a time,
//!   unbounded readers
//! - **Audited**: every externally observable state change lands in the
//!   audit trail before its response is returned
//! - **Deterministic exports**: the same snapshot always produces the same
//!   bytes, hashes, and signature
//!
//! # Architecture
//!
//! - [`core`]: store, broker, policy, audit, fabric, router, export, guard
//! - [`repos`]: per-entity append/read access and the one symmetric codec
//!   for complex attributes
//! - [`services`]: validation, policy consultation, orchestration; the API
//!   surface transports adapt to
//!
//! The CLI defined here is a thin collaborator over the service layer; the
//! HTTP surface is another, out of tree. Both speak the same response
//! envelope.

pub mod core;
pub mod repos;
pub mod services;

use crate::core::audit::AuditQuery;
use crate::core::config::EngineConfig;
use crate::core::container::container;
use crate::core::error::EngineError;
use crate::core::export::Selector;
use crate::core::fabric::WorkerPool;
use crate::core::guard;
use crate::core::store::CorpusStore;
use crate::core::time;
use crate::repos::job::JobRepository;
use crate::services::audit::AuditService;
use crate::services::corpus::CorpusService;
use crate::services::diarization::DiarizationService;
use crate::services::export::ExportService;
use crate::services::session::SessionService;
use crate::services::transcription::TranscriptionService;
use crate::services::worker::EngineExecutor;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(
    name = "dictum",
    version = env!("CARGO_PKG_VERSION"),
    about = "Immutable clinical-session corpus engine: append-only records, signed exports, auditable jobs",
    disable_version_flag = true
)]
pub struct Cli {
    /// Storage root holding corpus.db, audio, and exports.
    #[clap(long, global = true, default_value = "storage")]
    pub storage: PathBuf,
    /// Acting user recorded on audit events.
    #[clap(long, global = true, default_value = "cli")]
    pub user: String,
    /// Output format: 'text' or 'json' (response envelope).
    #[clap(long, global = true, default_value = "text")]
    pub format: String,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a corpus for an owner.
    Init {
        #[clap(long)]
        owner: String,
        #[clap(long)]
        salt: String,
    },
    /// Store report: schema version, group lengths, salvage, latch state.
    Status,
    /// Verify an owner credential against the corpus identity.
    VerifyOwner {
        #[clap(long)]
        owner: String,
    },
    /// Session lifecycle.
    Session {
        #[clap(subcommand)]
        command: SessionCommand,
    },
    /// Interactions, corrections, embeddings, and search.
    Interaction {
        #[clap(subcommand)]
        command: InteractionCommand,
    },
    /// Audio upload intake (202: returns the job id).
    Upload {
        #[clap(subcommand)]
        command: UploadCommand,
    },
    /// Job status, cancellation, and the native worker pool.
    Job {
        #[clap(subcommand)]
        command: JobCommand,
    },
    /// Signed export bundles.
    Export {
        #[clap(subcommand)]
        command: ExportCommand,
    },
    /// Audit queries, retention sweep, and the timeline.
    Audit {
        #[clap(subcommand)]
        command: AuditCommand,
    },
    /// Run the source-tree gates (mutation symbols, router bypass).
    Guard {
        /// Source directory to scan.
        #[clap(long, default_value = "src")]
        path: PathBuf,
    },
    /// Print every service descriptor.
    Schema,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    Create {
        /// Session metadata as JSON.
        #[clap(long, default_value = "{}")]
        metadata: String,
    },
    Get {
        id: String,
    },
    List,
    Finalize {
        id: String,
    },
    Archive {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum InteractionCommand {
    Append {
        #[clap(long)]
        session: String,
        #[clap(long)]
        prompt: String,
        #[clap(long)]
        response: String,
        #[clap(long)]
        model: String,
        #[clap(long, default_value = "0")]
        tokens: i64,
        #[clap(long, default_value = "{}")]
        metadata: String,
    },
    /// Append a correction referencing a prior interaction.
    Correct {
        #[clap(long)]
        prior: String,
        #[clap(long)]
        prompt: String,
        #[clap(long)]
        response: String,
        #[clap(long)]
        model: String,
        #[clap(long, default_value = "0")]
        tokens: i64,
    },
    /// Route a prompt through the model router and record the exchange.
    Converse {
        #[clap(long)]
        session: String,
        #[clap(long)]
        prompt: String,
        #[clap(long)]
        model: Option<String>,
    },
    /// Embed an interaction for search.
    Embed {
        id: String,
        #[clap(long)]
        model: Option<String>,
    },
    /// Semantic search over embedded interactions.
    Search {
        #[clap(long)]
        query: String,
        #[clap(long)]
        model: Option<String>,
        #[clap(long, default_value = "5")]
        k: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum UploadCommand {
    Transcribe {
        #[clap(long)]
        session: String,
        #[clap(long)]
        file: PathBuf,
    },
    Diarize {
        #[clap(long)]
        session: String,
        #[clap(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    Status {
        id: String,
    },
    /// Request cooperative cancellation.
    Cancel {
        id: String,
    },
    /// Run pending jobs on the in-process pool until the queue drains.
    RunPending {
        #[clap(long, default_value = "60")]
        timeout_secs: u64,
    },
    /// Pending queue depth (the back-pressure signal).
    Depth,
}

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
    Create {
        /// Selectors as JSON, e.g. [{"session":{"session_id":"..."}}]
        #[clap(long)]
        selectors: String,
    },
    Get {
        id: String,
    },
    List,
    Verify {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    Query {
        #[clap(long)]
        operation: Option<String>,
        #[clap(long)]
        user_id: Option<String>,
        #[clap(long)]
        since: Option<String>,
        #[clap(long)]
        until: Option<String>,
        #[clap(long)]
        limit: Option<usize>,
    },
    Digests {
        #[clap(long)]
        month: Option<String>,
    },
    /// Compact events older than the retention window into signed digests.
    Sweep,
    Timeline {
        #[clap(long, default_value = "100")]
        limit: usize,
    },
}

/// Parse process arguments and dispatch. The binary's whole body.
pub fn run() -> Result<(), EngineError> {
    let cli = Cli::parse();
    dispatch(cli)
}

pub fn dispatch(cli: Cli) -> Result<(), EngineError> {
    let json = cli.format == "json";
    match cli.command {
        Command::Init { owner, salt } => {
            let config = EngineConfig::load(&cli.storage)?;
            let store = CorpusStore::init(&config, &owner, &salt)?;
            let meta = store.meta()?;
            emit(
                json,
                "ok",
                201,
                serde_json::to_value(&meta)?,
                &format!("corpus {} initialized", meta.corpus_id),
            );
            Ok(())
        }
        Command::Status => {
            let store = container().open_store(&cli.storage)?;
            let report = store.validate()?;
            let depth = JobRepository::new(&store).queue_depth()?;
            let mut data = serde_json::to_value(&report)?;
            if let Some(obj) = data.as_object_mut() {
                obj.insert("queue_depth".to_string(), JsonValue::from(depth));
            }
            emit(json, "ok", 200, data, "store validates");
            Ok(())
        }
        Command::VerifyOwner { owner } => {
            let store = container().open_store(&cli.storage)?;
            let verified = store.verify_ownership(&owner, &cli.user)?;
            let (status, code) = if verified { ("ok", 200) } else { ("denied", 403) };
            emit(
                json,
                status,
                code,
                serde_json::json!({"verified": verified}),
                if verified { "ownership verified" } else { "ownership denied" },
            );
            if verified {
                Ok(())
            } else {
                Err(EngineError::OwnershipDenied("credential mismatch".to_string()))
            }
        }
        Command::Session { command } => run_session(&cli.storage, &cli.user, json, command),
        Command::Interaction { command } => run_interaction(&cli.storage, &cli.user, json, command),
        Command::Upload { command } => run_upload(&cli.storage, &cli.user, json, command),
        Command::Job { command } => run_job(&cli.storage, &cli.user, json, command),
        Command::Export { command } => run_export(&cli.storage, &cli.user, json, command),
        Command::Audit { command } => run_audit(&cli.storage, &cli.user, json, command),
        Command::Guard { path } => {
            let report = guard::run_guard(&path)?;
            if report.passed {
                emit(
                    json,
                    "ok",
                    200,
                    serde_json::json!({"files_scanned": report.files_scanned}),
                    "guard gates passed",
                );
                Ok(())
            } else {
                for v in &report.violations {
                    eprintln!(
                        "{} {}:{} {}",
                        format!("[{}]", v.kind).red(),
                        v.path.display(),
                        v.line,
                        v.message
                    );
                }
                Err(EngineError::Validation(format!(
                    "guard gates failed with {} violations",
                    report.violations.len()
                )))
            }
        }
        Command::Schema => {
            let schemas = serde_json::json!({
                "services": [
                    services::session::schema(),
                    services::corpus::schema(),
                    services::transcription::schema(),
                    services::diarization::schema(),
                    services::export::schema(),
                    services::audit::schema(),
                ],
            });
            println!("{}", serde_json::to_string_pretty(&schemas)?);
            Ok(())
        }
    }
}

fn run_session(
    storage: &PathBuf,
    user: &str,
    json: bool,
    command: SessionCommand,
) -> Result<(), EngineError> {
    let store = container().open_store(storage)?;
    let policy = container().policy_for(storage)?;
    let service = SessionService::new(&store, policy);
    match command {
        SessionCommand::Create { metadata } => {
            let metadata: JsonValue = serde_json::from_str(&metadata)
                .map_err(|e| EngineError::Validation(format!("bad metadata: {}", e)))?;
            let session = service.create(user, metadata)?;
            emit(
                json,
                "ok",
                201,
                serde_json::to_value(&session)?,
                &format!("session {} created", session.session_id),
            );
        }
        SessionCommand::Get { id } => {
            let session = service.get(&id)?;
            emit(json, "ok", 200, serde_json::to_value(&session)?, "session");
        }
        SessionCommand::List => {
            let sessions = service.list(None)?;
            emit(
                json,
                "ok",
                200,
                serde_json::to_value(&sessions)?,
                &format!("{} sessions", sessions.len()),
            );
        }
        SessionCommand::Finalize { id } => {
            let session = service.finalize(user, &id)?;
            emit(json, "ok", 200, serde_json::to_value(&session)?, "finalized");
        }
        SessionCommand::Archive { id } => {
            let session = service.archive(user, &id)?;
            emit(json, "ok", 200, serde_json::to_value(&session)?, "archived");
        }
    }
    Ok(())
}

fn run_interaction(
    storage: &PathBuf,
    user: &str,
    json: bool,
    command: InteractionCommand,
) -> Result<(), EngineError> {
    let store = container().open_store(storage)?;
    let policy = container().policy_for(storage)?;
    let config = store.config().clone();
    let service = CorpusService::new(&store, policy);
    match command {
        InteractionCommand::Append {
            session,
            prompt,
            response,
            model,
            tokens,
            metadata,
        } => {
            let metadata: JsonValue = serde_json::from_str(&metadata)
                .map_err(|e| EngineError::Validation(format!("bad metadata: {}", e)))?;
            let interaction = service
                .append_interaction(user, &session, &prompt, &response, &model, tokens, metadata)?;
            emit(
                json,
                "ok",
                201,
                serde_json::to_value(&interaction)?,
                &format!("interaction {} appended", interaction.interaction_id),
            );
        }
        InteractionCommand::Correct {
            prior,
            prompt,
            response,
            model,
            tokens,
        } => {
            let interaction =
                service.append_correction(user, &prior, &prompt, &response, &model, tokens)?;
            emit(
                json,
                "ok",
                201,
                serde_json::to_value(&interaction)?,
                "correction appended",
            );
        }
        InteractionCommand::Converse {
            session,
            prompt,
            model,
        } => {
            let model = model.unwrap_or(config.llm_default_model);
            let interaction = service.converse(user, &session, &prompt, &model)?;
            emit(
                json,
                "ok",
                201,
                serde_json::to_value(&interaction)?,
                "exchange recorded",
            );
        }
        InteractionCommand::Embed { id, model } => {
            let model = model.unwrap_or(config.llm_default_model);
            let record = service.embed_interaction(user, &id, &model)?;
            emit(
                json,
                "ok",
                201,
                serde_json::json!({"interaction_id": record.interaction_id, "model": record.model}),
                "embedding appended",
            );
        }
        InteractionCommand::Search { query, model, k } => {
            let model = model.unwrap_or(config.llm_default_model);
            let hits = service.search(user, &query, &model, k)?;
            emit(
                json,
                "ok",
                200,
                serde_json::to_value(&hits)?,
                &format!("{} hits", hits.len()),
            );
        }
    }
    Ok(())
}

fn run_upload(
    storage: &PathBuf,
    user: &str,
    json: bool,
    command: UploadCommand,
) -> Result<(), EngineError> {
    let store = container().open_store(storage)?;
    let policy = container().policy_for(storage)?;
    let (job, kind) = match command {
        UploadCommand::Transcribe { session, file } => {
            let bytes = std::fs::read(&file)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let service = TranscriptionService::new(&store, policy);
            (service.upload(user, &session, &name, &bytes)?, "transcribe")
        }
        UploadCommand::Diarize { session, file } => {
            let bytes = std::fs::read(&file)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let service = DiarizationService::new(&store, policy);
            (service.upload(user, &session, &name, &bytes)?, "diarize")
        }
    };
    emit(
        json,
        "accepted",
        202,
        serde_json::to_value(&job)?,
        &format!("{} job {} accepted", kind, job.job_id),
    );
    Ok(())
}

fn run_job(
    storage: &PathBuf,
    user: &str,
    json: bool,
    command: JobCommand,
) -> Result<(), EngineError> {
    let store = container().open_store(storage)?;
    match command {
        JobCommand::Status { id } => {
            let job = JobRepository::new(&store).read(&id)?;
            emit(json, "ok", 200, serde_json::to_value(&job)?, "job");
        }
        JobCommand::Cancel { id } => {
            JobRepository::new(&store).request_cancel(user, &id)?;
            emit(
                json,
                "ok",
                200,
                serde_json::json!({"job_id": id}),
                "cancellation requested",
            );
        }
        JobCommand::RunPending { timeout_secs } => {
            let config = store.config().clone();
            drop(store);
            let pool = WorkerPool::start(&config, Arc::new(EngineExecutor));
            let drained = pool.drain(&config, Duration::from_secs(timeout_secs));
            pool.stop();
            drained?;
            emit(json, "ok", 200, serde_json::json!({}), "queue drained");
        }
        JobCommand::Depth => {
            let depth = JobRepository::new(&store).queue_depth()?;
            emit(
                json,
                "ok",
                200,
                serde_json::json!({"depth": depth}),
                &format!("{} pending", depth),
            );
        }
    }
    Ok(())
}

fn run_export(
    storage: &PathBuf,
    user: &str,
    json: bool,
    command: ExportCommand,
) -> Result<(), EngineError> {
    let store = container().open_store(storage)?;
    let policy = container().policy_for(storage)?;
    let service = ExportService::new(&store, policy);
    match command {
        ExportCommand::Create { selectors } => {
            let selectors: Vec<Selector> = ExportService::parse_selectors(&selectors)?;
            let record = service.create(user, &selectors)?;
            emit(
                json,
                "ok",
                201,
                serde_json::to_value(&record)?,
                &format!("export {} created", record.export_id),
            );
        }
        ExportCommand::Get { id } => {
            let record = service.get(&id)?;
            emit(json, "ok", 200, serde_json::to_value(&record)?, "export");
        }
        ExportCommand::List => {
            let records = service.list()?;
            emit(
                json,
                "ok",
                200,
                serde_json::to_value(&records)?,
                &format!("{} exports", records.len()),
            );
        }
        ExportCommand::Verify { id } => {
            let report = service.verify(&id)?;
            let ok = report.status == "ok";
            emit(
                json,
                if ok { "ok" } else { "mismatch" },
                200,
                serde_json::to_value(&report)?,
                &format!("verification: {}", report.status),
            );
        }
        ExportCommand::Delete { id } => {
            service.soft_delete(user, &id)?;
            emit(
                json,
                "ok",
                200,
                serde_json::json!({"export_id": id}),
                "export soft-deleted; artifacts retained",
            );
        }
    }
    Ok(())
}

fn run_audit(
    storage: &PathBuf,
    user: &str,
    json: bool,
    command: AuditCommand,
) -> Result<(), EngineError> {
    let store = container().open_store(storage)?;
    let policy = container().policy_for(storage)?;
    let service = AuditService::new(&store, policy);
    match command {
        AuditCommand::Query {
            operation,
            user_id,
            since,
            until,
            limit,
        } => {
            let events = service.query(&AuditQuery {
                operation,
                user_id,
                since,
                until,
                limit,
            })?;
            emit(
                json,
                "ok",
                200,
                serde_json::to_value(&events)?,
                &format!("{} events", events.len()),
            );
        }
        AuditCommand::Digests { month } => {
            let digests = service.digests(month.as_deref())?;
            emit(
                json,
                "ok",
                200,
                serde_json::to_value(&digests)?,
                &format!("{} digests", digests.len()),
            );
        }
        AuditCommand::Sweep => {
            let report = service.sweep_retention(user)?;
            emit(
                json,
                "ok",
                200,
                serde_json::to_value(&report)?,
                &format!("{} events compacted", report.compacted),
            );
        }
        AuditCommand::Timeline { limit } => {
            let timeline = service.timeline(limit)?;
            if json {
                emit(json, "ok", 200, serde_json::to_value(&timeline)?, "timeline");
            } else {
                println!("{}", services::audit::render_timeline_text(&timeline));
            }
        }
    }
    Ok(())
}

fn emit(json: bool, status: &str, code: u16, data: JsonValue, message: &str) {
    if json {
        let envelope = time::response_envelope(status, code, data, message);
        println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
    } else if status == "ok" || status == "accepted" {
        println!("{} {}", "✓".green(), message);
    } else {
        println!("{} {}", "✗".red(), message);
    }
}
