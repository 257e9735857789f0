//! Diarization: upload intake and the speaker-segmentation job.

use crate::core::error::EngineError;
use crate::core::fabric;
use crate::core::policy::PolicyDocument;
use crate::core::store::CorpusStore;
use crate::repos::corpus::CorpusRepository;
use crate::repos::job::{Job, JobKind, JobRepository};
use crate::services::intake;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub speaker: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Abstract speaker-diarization contract.
pub trait SpeakerProvider: Send + Sync {
    fn name(&self) -> &str;
    fn diarize(&self, bytes: &[u8]) -> Result<Vec<SpeakerSegment>, EngineError>;
}

/// Deterministic offline provider: alternating speakers over fixed-size
/// spans of the input.
pub struct LocalSpeakerProvider;

const SPAN_BYTES: usize = 16 * 1024;
const SPAN_MS: i64 = 5_000;

impl SpeakerProvider for LocalSpeakerProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn diarize(&self, bytes: &[u8]) -> Result<Vec<SpeakerSegment>, EngineError> {
        let spans = bytes.len().div_ceil(SPAN_BYTES).max(1);
        let mut segments = Vec::with_capacity(spans);
        for i in 0..spans {
            segments.push(SpeakerSegment {
                speaker: format!("S{}", (i % 2) + 1),
                start_ms: i as i64 * SPAN_MS,
                end_ms: (i as i64 + 1) * SPAN_MS,
            });
        }
        Ok(segments)
    }
}

fn speaker_provider_cell() -> &'static Mutex<Arc<dyn SpeakerProvider>> {
    static PROVIDER: OnceLock<Mutex<Arc<dyn SpeakerProvider>>> = OnceLock::new();
    PROVIDER.get_or_init(|| Mutex::new(Arc::new(LocalSpeakerProvider)))
}

fn speaker_provider() -> Arc<dyn SpeakerProvider> {
    speaker_provider_cell()
        .lock()
        .map(|p| Arc::clone(&p))
        .unwrap_or_else(|_| Arc::new(LocalSpeakerProvider))
}

/// Swap the diarization backend (startup wiring).
pub fn register_speaker_provider(provider: Arc<dyn SpeakerProvider>) {
    if let Ok(mut cell) = speaker_provider_cell().lock() {
        *cell = provider;
    }
}

pub struct DiarizationService<'a> {
    store: &'a CorpusStore,
    policy: PolicyDocument,
}

impl<'a> DiarizationService<'a> {
    pub fn new(store: &'a CorpusStore, policy: PolicyDocument) -> Self {
        Self { store, policy }
    }

    /// Upload intake, identical contract to transcription: `202` with the
    /// job id. Re-uploading the same bytes returns the same job.
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
            JobKind::Diarize,
            &artifact.artifact_id,
            &artifact.sha256,
        )
    }

    pub fn job_status(&self, job_id: &str) -> Result<Job, EngineError> {
        JobRepository::new(self.store).read(job_id)
    }

    /// Worker entry: run the provider and append the segments as a derived
    /// interaction.
    pub fn run_job(&self, job: &Job) -> Result<String, EngineError> {
        let repo = CorpusRepository::new(self.store);
        let artifact = repo.read_artifact(&job.input_ref)?;
        let bytes = intake::load_artifact_bytes(self.store, &artifact)?;
        let provider = speaker_provider();
        let segments = provider.diarize(&bytes)?;
        let model = format!("diarize.{}", provider.name());
        let interaction = repo.append_interaction(
            "worker",
            &artifact.session_id,
            &format!("audio/{}", artifact.artifact_id),
            &format!("{} speaker segments", segments.len()),
            &model,
            0,
            serde_json::json!({
                "kind": "diarization",
                "artifact_id": artifact.artifact_id,
                "segments": segments,
            }),
        )?;
        Ok(format!("interaction/{}", interaction.interaction_id))
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "diarization",
        "version": "0.1.0",
        "description": "Audio upload intake and speaker-diarization jobs",
        "operations": [
            { "name": "upload", "parameters": ["session_id", "file_name", "bytes"], "returns": "job_id (202)" },
            { "name": "job_status", "parameters": ["job_id"] }
        ],
        "storage": ["audio_artifacts", "jobs", "job_events", "interactions"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_provider_alternates_speakers() {
        let provider = LocalSpeakerProvider;
        let segments = provider.diarize(&vec![0u8; SPAN_BYTES * 3]).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].speaker, "S1");
        assert_eq!(segments[1].speaker, "S2");
        assert_eq!(segments[2].speaker, "S1");
        assert_eq!(segments[1].start_ms, SPAN_MS);
    }

    #[test]
    fn test_tiny_input_yields_one_segment() {
        let provider = LocalSpeakerProvider;
        assert_eq!(provider.diarize(b"x").unwrap().len(), 1);
    }
}
