//! The engine's job executor: dispatches claimed jobs to their service.

use crate::core::error::EngineError;
use crate::core::export;
use crate::core::fabric::JobExecutor;
use crate::core::policy;
use crate::core::store::CorpusStore;
use crate::repos::job::{Job, JobKind};
use crate::services::corpus::CorpusService;
use crate::services::diarization::DiarizationService;
use crate::services::export::ExportService;
use crate::services::transcription::TranscriptionService;

pub struct EngineExecutor;

impl JobExecutor for EngineExecutor {
    fn execute(&self, store: &CorpusStore, job: &Job) -> Result<String, EngineError> {
        let policy = policy::cached_policy(&store.config().storage_root)?;
        match job.kind {
            JobKind::Transcribe => {
                TranscriptionService::new(store, policy).run_job(job)
            }
            JobKind::Diarize => DiarizationService::new(store, policy).run_job(job),
            JobKind::Embed => {
                // Worker threads may start before any caller touched the
                // container; make sure the configured providers exist.
                crate::core::router::register_default_providers(
                    &store.config().llm_providers,
                    store.config().embedding_dim,
                );
                let service = CorpusService::new(store, policy);
                let model = store.config().llm_default_model.clone();
                let record = service.embed_interaction("worker", &job.input_ref, &model)?;
                Ok(format!("embedding/{}", record.interaction_id))
            }
            JobKind::Export => {
                let selectors: Vec<export::Selector> = serde_json::from_str(&job.input_ref)
                    .map_err(|e| EngineError::Validation(format!("bad selectors: {}", e)))?;
                let service = ExportService::new(store, policy);
                let record = service.create("worker", &selectors)?;
                Ok(format!("export/{}", record.export_id))
            }
        }
    }
}
