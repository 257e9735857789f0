//! Transcription: upload intake and the speech-to-text job.
//!
//! The backend is an external collaborator behind the `SpeechProvider`
//! contract; a deterministic local implementation serves offline use and
//! tests. Upload returns `202 Accepted` semantics: the job id, not the
//! transcript.

use crate::core::error::EngineError;
use crate::core::fabric;
use crate::core::policy::PolicyDocument;
use crate::core::router;
use crate::core::store::CorpusStore;
use crate::repos::corpus::CorpusRepository;
use crate::repos::job::{Job, JobKind, JobRepository};
use crate::services::intake;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub text: String,
    pub language: Option<String>,
}

/// Abstract speech-to-text contract.
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;
    fn transcribe(&self, bytes: &[u8]) -> Result<Transcript, EngineError>;
}

/// Deterministic offline provider: stable digest-derived text per input.
pub struct LocalSpeechProvider;

impl SpeechProvider for LocalSpeechProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn transcribe(&self, bytes: &[u8]) -> Result<Transcript, EngineError> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hex::encode(hasher.finalize());
        Ok(Transcript {
            text: format!("[transcript {} bytes {}]", bytes.len(), &digest[..12]),
            language: None,
        })
    }
}

fn speech_provider_cell() -> &'static Mutex<Arc<dyn SpeechProvider>> {
    static PROVIDER: OnceLock<Mutex<Arc<dyn SpeechProvider>>> = OnceLock::new();
    PROVIDER.get_or_init(|| Mutex::new(Arc::new(LocalSpeechProvider)))
}

fn speech_provider() -> Arc<dyn SpeechProvider> {
    speech_provider_cell()
        .lock()
        .map(|p| Arc::clone(&p))
        .unwrap_or_else(|_| Arc::new(LocalSpeechProvider))
}

/// Swap the speech backend (startup wiring).
pub fn register_speech_provider(provider: Arc<dyn SpeechProvider>) {
    if let Ok(mut cell) = speech_provider_cell().lock() {
        *cell = provider;
    }
}

pub struct TranscriptionService<'a> {
    store: &'a CorpusStore,
    policy: PolicyDocument,
}

impl<'a> TranscriptionService<'a> {
    pub fn new(store: &'a CorpusStore, policy: PolicyDocument) -> Self {
        Self { store, policy }
    }

    /// Upload intake: validate, store content-addressed, record the
    /// artifact, enqueue the job. Returns the job for `202` semantics.
    pub fn upload(
        &self,
        user_id: &str,
        session_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Job, EngineError> {
        self.policy.check_write("append_artifact")?;
        let artifact = intake::store_upload(self.store, user_id, session_id, file_name, bytes)?;
        fabric::enqueue(
            self.store,
            user_id,
            JobKind::Transcribe,
            &artifact.artifact_id,
            &artifact.sha256,
        )
    }

    pub fn job_status(&self, job_id: &str) -> Result<Job, EngineError> {
        JobRepository::new(self.store).read(job_id)
    }

    /// Worker entry: run the provider and append the transcript as a
    /// derived interaction. Returns the result reference.
    pub fn run_job(&self, job: &Job) -> Result<String, EngineError> {
        let repo = CorpusRepository::new(self.store);
        let artifact = repo.read_artifact(&job.input_ref)?;
        let bytes = intake::load_artifact_bytes(self.store, &artifact)?;
        let provider = speech_provider();
        let transcript = provider.transcribe(&bytes)?;
        let model = format!("stt.{}", provider.name());
        let tokens = router::estimate_tokens(&transcript.text);
        let interaction = repo.append_interaction(
            "worker",
            &artifact.session_id,
            &format!("audio/{}", artifact.artifact_id),
            &transcript.text,
            &model,
            tokens,
            serde_json::json!({
                "kind": "transcript",
                "artifact_id": artifact.artifact_id,
                "language": transcript.language,
            }),
        )?;
        Ok(format!("interaction/{}", interaction.interaction_id))
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "transcription",
        "version": "0.1.0",
        "description": "Audio upload intake and speech-to-text jobs",
        "operations": [
            { "name": "upload", "parameters": ["session_id", "file_name", "bytes"], "returns": "job_id (202)" },
            { "name": "job_status", "parameters": ["job_id"] }
        ],
        "storage": ["audio_artifacts", "jobs", "job_events", "interactions"]
    })
}
