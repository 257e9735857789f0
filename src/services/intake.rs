//! Upload intake shared by the transcription and diarization services.
//!
//! Validates the artifact (extension, size, content type), stores the bytes
//! content-addressed under the audio directory, and appends the artifact
//! record. Bytes are never overwritten: the same content lands at the same
//! path and is reused.

use crate::core::error::EngineError;
use crate::core::store::CorpusStore;
use crate::core::time;
use crate::repos::corpus::{AudioArtifact, CorpusRepository};
use sha2::{Digest, Sha256};
use std::fs;

/// Mime type for an accepted extension.
pub fn mime_for_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "m4a" => Some("audio/mp4"),
        "flac" => Some("audio/flac"),
        _ => None,
    }
}

/// Validate an upload and persist it content-addressed. Returns the
/// artifact record (existing one if the same bytes were stored before).
pub fn store_upload(
    store: &CorpusStore,
    user_id: &str,
    session_id: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<AudioArtifact, EngineError> {
    let config = store.config();

    let ext = file_name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !config.allowed_audio_ext.iter().any(|a| *a == ext) {
        return Err(EngineError::Validation(format!(
            "extension '{}' not accepted (allowed: {})",
            ext,
            config.allowed_audio_ext.join(", ")
        )));
    }
    let mime = mime_for_ext(&ext)
        .ok_or_else(|| EngineError::Validation(format!("no media type for '{}'", ext)))?;
    if bytes.is_empty() {
        return Err(EngineError::Validation("empty upload".to_string()));
    }
    if bytes.len() as u64 > config.max_upload_bytes {
        return Err(EngineError::Validation(format!(
            "upload of {} bytes exceeds limit {}",
            bytes.len(),
            config.max_upload_bytes
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let sha256 = hex::encode(hasher.finalize());

    let repo = CorpusRepository::new(store);
    if let Some(existing) = repo.find_artifact_by_sha256(&sha256)? {
        return Ok(existing);
    }

    let audio_dir = config.audio_path();
    fs::create_dir_all(&audio_dir)?;
    let file_path = audio_dir.join(format!("{}.{}", sha256, ext));
    if !file_path.exists() {
        fs::write(&file_path, bytes)?;
    }

    let artifact = AudioArtifact {
        artifact_id: time::new_event_id(),
        session_id: session_id.to_string(),
        bytes_ref: file_path.to_string_lossy().to_string(),
        sha256,
        mime: mime.to_string(),
        duration_ms: None,
        uploaded_at: time::now_monotonic_ms_z(),
    };
    repo.append_artifact(user_id, &artifact)?;
    Ok(artifact)
}

/// Read an artifact's bytes back and confirm they still match the recorded
/// content hash.
pub fn load_artifact_bytes(
    store: &CorpusStore,
    artifact: &AudioArtifact,
) -> Result<Vec<u8>, EngineError> {
    let bytes = fs::read(&artifact.bytes_ref)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let actual = hex::encode(hasher.finalize());
    if actual != artifact.sha256 {
        return Err(EngineError::Integrity(format!(
            "artifact '{}' bytes diverge from recorded hash",
            artifact.artifact_id
        )));
    }
    Ok(bytes)
}
