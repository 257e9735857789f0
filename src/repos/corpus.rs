//! Interactions, embeddings, and audio artifacts.

use crate::core::audit::{AuditEvent, AuditOperation, AuditResult};
use crate::core::embedding;
use crate::core::error::EngineError;
use crate::core::serialize;
use crate::core::store::CorpusStore;
use crate::core::time;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub interaction_id: String,
    pub session_id: String,
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub tokens: i64,
    pub ts: String,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub interaction_id: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub artifact_id: String,
    pub session_id: String,
    pub bytes_ref: String,
    pub sha256: String,
    pub mime: String,
    pub duration_ms: Option<i64>,
    pub uploaded_at: String,
}

pub struct CorpusRepository<'a> {
    store: &'a CorpusStore,
}

impl<'a> CorpusRepository<'a> {
    pub fn new(store: &'a CorpusStore) -> Self {
        Self { store }
    }

    /// Append an interaction. A correction is just another interaction whose
    /// `metadata.correction_of` names the prior id.
    pub fn append_interaction(
        &self,
        user_id: &str,
        session_id: &str,
        prompt: &str,
        response: &str,
        model: &str,
        tokens: i64,
        metadata: JsonValue,
    ) -> Result<Interaction, EngineError> {
        let record = Interaction {
            interaction_id: time::new_event_id(),
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            model: model.to_string(),
            tokens,
            ts: time::now_monotonic_ms_z(),
            metadata,
        };
        let event = AuditEvent::new(
            AuditOperation::INTERACTION_APPENDED,
            user_id,
            &format!("interaction/{}", record.interaction_id),
            AuditResult::Success,
            &serde_json::json!({
                "session_id": session_id,
                "model": model,
                "tokens": tokens,
            }),
        );
        let stored = record.clone();
        self.store.with_append("interactions", event, move |conn| {
            conn.execute(
                "INSERT INTO interactions(interaction_id, session_id, prompt, response, model, tokens, ts, metadata)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    stored.interaction_id,
                    stored.session_id,
                    stored.prompt,
                    stored.response,
                    stored.model,
                    stored.tokens,
                    stored.ts,
                    serialize::encode_attr(&stored.metadata),
                ],
            )?;
            Ok(())
        })?;
        Ok(record)
    }

    pub fn read_interaction(&self, interaction_id: &str) -> Result<Interaction, EngineError> {
        self.store.with_read(|conn| {
            conn.query_row(
                "SELECT interaction_id, session_id, prompt, response, model, tokens, ts, metadata
                 FROM interactions WHERE interaction_id = ?1",
                params![interaction_id],
                |row| {
                    let raw_meta: String = row.get(7)?;
                    Ok(Interaction {
                        interaction_id: row.get(0)?,
                        session_id: row.get(1)?,
                        prompt: row.get(2)?,
                        response: row.get(3)?,
                        model: row.get(4)?,
                        tokens: row.get(5)?,
                        ts: row.get(6)?,
                        metadata: serialize::decode_attr(&raw_meta),
                    })
                },
            )
            .map_err(|_| EngineError::NotFound(format!("interaction '{}'", interaction_id)))
        })
    }

    /// Interactions of a session in append order, with corrections folded:
    /// a record superseded by a later `correction_of` reference is dropped.
    pub fn list_session_interactions(
        &self,
        session_id: &str,
    ) -> Result<Vec<Interaction>, EngineError> {
        let all = self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT interaction_id, session_id, prompt, response, model, tokens, ts, metadata
                 FROM interactions WHERE session_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    let raw_meta: String = row.get(7)?;
                    Ok(Interaction {
                        interaction_id: row.get(0)?,
                        session_id: row.get(1)?,
                        prompt: row.get(2)?,
                        response: row.get(3)?,
                        model: row.get(4)?,
                        tokens: row.get(5)?,
                        ts: row.get(6)?,
                        metadata: serialize::decode_attr(&raw_meta),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let corrected: rustc_hash::FxHashSet<String> = all
            .iter()
            .filter_map(|i| {
                i.metadata
                    .get("correction_of")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
            .collect();
        Ok(all
            .into_iter()
            .filter(|i| !corrected.contains(&i.interaction_id))
            .collect())
    }

    /// Append an embedding for an interaction. The vector is normalized to
    /// the configured width before storage; the referenced interaction must
    /// exist (each embedding resolves to exactly one interaction).
    pub fn append_embedding(
        &self,
        user_id: &str,
        interaction_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<EmbeddingRecord, EngineError> {
        self.read_interaction(interaction_id)?;
        let dim = self.store.config().embedding_dim;
        let normalized = embedding::normalize_vector(vector, dim)?;
        let record = EmbeddingRecord {
            interaction_id: interaction_id.to_string(),
            vector: normalized,
            model: model.to_string(),
            ts: time::now_monotonic_ms_z(),
        };
        let event = AuditEvent::new(
            AuditOperation::EMBEDDING_APPENDED,
            user_id,
            &format!("interaction/{}", interaction_id),
            AuditResult::Success,
            &serde_json::json!({"model": model, "dim": dim}),
        );
        let blob = embedding::vector_to_blob(&record.vector);
        let stored = record.clone();
        self.store.with_append("embeddings", event, move |conn| {
            conn.execute(
                "INSERT INTO embeddings(interaction_id, vector, model, ts) VALUES(?1, ?2, ?3, ?4)",
                params![stored.interaction_id, blob, stored.model, stored.ts],
            )?;
            Ok(())
        })?;
        Ok(record)
    }

    /// All embeddings with their interaction ids, for the similarity scan.
    pub fn list_embeddings(&self) -> Result<Vec<EmbeddingRecord>, EngineError> {
        self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT interaction_id, vector, model, ts FROM embeddings ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let blob: Vec<u8> = row.get(1)?;
                    Ok(EmbeddingRecord {
                        interaction_id: row.get(0)?,
                        vector: embedding::blob_to_vector(&blob),
                        model: row.get(2)?,
                        ts: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Record a stored audio artifact (bytes already content-addressed on
    /// disk by the caller).
    pub fn append_artifact(
        &self,
        user_id: &str,
        artifact: &AudioArtifact,
    ) -> Result<(), EngineError> {
        let event = AuditEvent::new(
            AuditOperation::ARTIFACT_STORED,
            user_id,
            &format!("artifact/{}", artifact.artifact_id),
            AuditResult::Success,
            &serde_json::json!({
                "session_id": artifact.session_id,
                "sha256": artifact.sha256,
                "mime": artifact.mime,
            }),
        );
        let stored = artifact.clone();
        self.store.with_append("audio_artifacts", event, move |conn| {
            conn.execute(
                "INSERT INTO audio_artifacts(artifact_id, session_id, bytes_ref, sha256, mime, duration_ms, uploaded_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    stored.artifact_id,
                    stored.session_id,
                    stored.bytes_ref,
                    stored.sha256,
                    stored.mime,
                    stored.duration_ms,
                    stored.uploaded_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn read_artifact(&self, artifact_id: &str) -> Result<AudioArtifact, EngineError> {
        self.store.with_read(|conn| {
            conn.query_row(
                "SELECT artifact_id, session_id, bytes_ref, sha256, mime, duration_ms, uploaded_at
                 FROM audio_artifacts WHERE artifact_id = ?1",
                params![artifact_id],
                |row| {
                    Ok(AudioArtifact {
                        artifact_id: row.get(0)?,
                        session_id: row.get(1)?,
                        bytes_ref: row.get(2)?,
                        sha256: row.get(3)?,
                        mime: row.get(4)?,
                        duration_ms: row.get(5)?,
                        uploaded_at: row.get(6)?,
                    })
                },
            )
            .map_err(|_| EngineError::NotFound(format!("artifact '{}'", artifact_id)))
        })
    }

    /// Artifact lookup by content hash, used for idempotent uploads.
    pub fn find_artifact_by_sha256(
        &self,
        sha256: &str,
    ) -> Result<Option<AudioArtifact>, EngineError> {
        self.store.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT artifact_id, session_id, bytes_ref, sha256, mime, duration_ms, uploaded_at
                 FROM audio_artifacts WHERE sha256 = ?1 ORDER BY seq ASC LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![sha256], |row| {
                Ok(AudioArtifact {
                    artifact_id: row.get(0)?,
                    session_id: row.get(1)?,
                    bytes_ref: row.get(2)?,
                    sha256: row.get(3)?,
                    mime: row.get(4)?,
                    duration_ms: row.get(5)?,
                    uploaded_at: row.get(6)?,
                })
            })?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
    }
}
