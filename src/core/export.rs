//! Deterministic export bundles.
//!
//! An export resolves selectors against a snapshot of the corpus (the
//! consistency marker is each involved group's current monotonic length),
//! optionally filters PII per policy, serializes every artifact to
//! canonical JSON, hashes each one, and signs the manifest with HS256.
//! Given the same snapshot the bytes, the hashes, and the signature are
//! identical between runs: the bundle timestamp is the snapshot's newest
//! record, not the wall clock.

use crate::core::error::EngineError;
use crate::core::manifest;
use crate::core::pii;
use crate::core::policy::PolicyDocument;
use crate::core::store::CorpusStore;
use crate::repos::corpus::CorpusRepository;
use crate::repos::export::{ExportRecord, ExportRepository};
use crate::repos::session::SessionRepository;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Session { session_id: String },
    Interaction { interaction_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct VerifyMismatch {
    pub artifact: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub export_id: String,
    pub status: String,
    pub signature_valid: bool,
    pub artifacts: Vec<VerifyMismatch>,
}

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "manifest.sig";

/// Resolve, filter, serialize, hash, and sign. Returns the stored record.
pub fn create_export(
    store: &CorpusStore,
    user_id: &str,
    selectors: &[Selector],
    policy: &PolicyDocument,
) -> Result<ExportRecord, EngineError> {
    if selectors.is_empty() {
        return Err(EngineError::Validation("export needs selectors".to_string()));
    }
    policy.check_egress("local")?;

    // Consistency marker: lengths of every group the snapshot reads.
    let marker = serde_json::json!({
        "sessions": store.group_len("sessions")?,
        "session_events": store.group_len("session_events")?,
        "interactions": store.group_len("interactions")?,
    });

    let mut artifacts: Vec<(String, Vec<u8>)> = Vec::new();
    let mut snapshot_ts: u64 = 0;
    for selector in selectors {
        let (path, mut value, newest) = resolve_selector(store, selector)?;
        snapshot_ts = snapshot_ts.max(newest);
        if policy.pii.filter_on_export {
            filter_value(&mut value, &policy.pii.patterns);
        }
        artifacts.push((path, manifest::canonical_json_bytes(&value)));
    }
    artifacts.sort_by(|a, b| a.0.cmp(&b.0));

    let entries: Vec<ArtifactEntry> = artifacts
        .iter()
        .map(|(path, bytes)| ArtifactEntry {
            path: path.clone(),
            sha256: sha256_hex(bytes),
            size: bytes.len() as u64,
        })
        .collect();

    let mut content_hasher = Sha256::new();
    for entry in &entries {
        content_hasher.update(entry.sha256.as_bytes());
    }
    let content_digest = hex::encode(content_hasher.finalize());
    let export_id = format!("{}-{}", snapshot_ts, &content_digest[..12]);

    // Same snapshot, same id: creating again returns the existing record.
    if let Ok(existing) = ExportRepository::new(store).read(&export_id) {
        return Ok(existing);
    }

    let meta = store.meta()?;
    let manifest_doc = serde_json::json!({
        "export_id": export_id,
        "created_at": format!("{}Z", snapshot_ts),
        "corpus_id": meta.corpus_id,
        "selectors": selectors,
        "consistency_marker": marker,
        "artifacts": entries,
        "policy_version": policy.version(),
    });
    let manifest_bytes = manifest::canonical_json_bytes(&manifest_doc);
    let signature = manifest::hs256_sign(&manifest_bytes, &store.config().export_signing_key)?;

    let bundle_dir = store.config().exports_path().join(&export_id);
    let artifact_dir = bundle_dir.join("artifacts");
    fs::create_dir_all(&artifact_dir)?;
    for (path, bytes) in &artifacts {
        let full = artifact_dir.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, bytes)?;
    }
    fs::write(bundle_dir.join(MANIFEST_FILE), &manifest_bytes)?;
    fs::write(bundle_dir.join(SIGNATURE_FILE), signature.as_bytes())?;

    let record = ExportRecord {
        export_id: export_id.clone(),
        created_at: format!("{}Z", snapshot_ts),
        selectors: serde_json::to_value(selectors)?,
        manifest: manifest_doc,
        signature,
        policy_version: policy.version(),
        deleted_at: None,
    };
    ExportRepository::new(store).create(user_id, &record)?;
    Ok(record)
}

fn resolve_selector(
    store: &CorpusStore,
    selector: &Selector,
) -> Result<(String, JsonValue, u64), EngineError> {
    match selector {
        Selector::Session { session_id } => {
            let session = SessionRepository::new(store).read(session_id)?;
            let interactions =
                CorpusRepository::new(store).list_session_interactions(session_id)?;
            let newest = interactions
                .iter()
                .map(|i| ts_ms(&i.ts))
                .chain(std::iter::once(ts_ms(&session.created_at)))
                .max()
                .unwrap_or(0);
            let value = serde_json::json!({
                "session": session,
                "interactions": interactions,
            });
            Ok((format!("sessions/{}.json", session_id), value, newest))
        }
        Selector::Interaction { interaction_id } => {
            let interaction = CorpusRepository::new(store).read_interaction(interaction_id)?;
            let newest = ts_ms(&interaction.ts);
            let value = serde_json::to_value(&interaction)?;
            Ok((format!("interactions/{}.json", interaction_id), value, newest))
        }
    }
}

fn ts_ms(ts: &str) -> u64 {
    ts.trim_end_matches('Z').parse().unwrap_or(0)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Redact PII in every string of a JSON tree.
fn filter_value(value: &mut JsonValue, patterns: &[String]) {
    match value {
        JsonValue::String(s) => {
            let filtered = pii::filter_text(s, patterns);
            if filtered != *s {
                *s = filtered;
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                filter_value(item, patterns);
            }
        }
        JsonValue::Object(map) => {
            for (_, v) in map.iter_mut() {
                filter_value(v, patterns);
            }
        }
        _ => {}
    }
}

/// Re-hash every artifact on disk, compare against the manifest, and check
/// the signature over the manifest bytes as stored.
pub fn verify_export(store: &CorpusStore, export_id: &str) -> Result<VerifyReport, EngineError> {
    let record = ExportRepository::new(store).read(export_id)?;
    let bundle_dir = store.config().exports_path().join(export_id);
    let manifest_bytes = fs::read(bundle_dir.join(MANIFEST_FILE))?;
    let signature = fs::read_to_string(bundle_dir.join(SIGNATURE_FILE))?;
    let signature_valid = manifest::hs256_verify(
        &manifest_bytes,
        signature.trim(),
        &store.config().export_signing_key,
    )?;

    let manifest_doc: JsonValue = serde_json::from_slice(&manifest_bytes)?;
    let entries: Vec<ArtifactEntry> =
        serde_json::from_value(manifest_doc["artifacts"].clone())
            .map_err(|_| EngineError::Integrity("manifest artifacts malformed".to_string()))?;

    let artifact_dir = bundle_dir.join("artifacts");
    let mismatches: Vec<VerifyMismatch> = entries
        .par_iter()
        .filter_map(|entry| {
            let actual = match fs::read(artifact_dir.join(&entry.path)) {
                Ok(bytes) => sha256_hex(&bytes),
                Err(_) => "missing".to_string(),
            };
            if actual != entry.sha256 {
                Some(VerifyMismatch {
                    artifact: entry.path.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                })
            } else {
                None
            }
        })
        .collect();

    let status = if !signature_valid {
        "signature_invalid"
    } else if mismatches.is_empty() {
        "ok"
    } else {
        "mismatch"
    };

    store.append_audit_only(crate::core::audit::AuditEvent::new(
        crate::core::audit::AuditOperation::EXPORT_VERIFIED,
        "system",
        &format!("export/{}", record.export_id),
        if status == "ok" {
            crate::core::audit::AuditResult::Success
        } else {
            crate::core::audit::AuditResult::Failure
        },
        &serde_json::json!({"status": status, "mismatches": mismatches.len()}),
    ))?;

    Ok(VerifyReport {
        export_id: export_id.to_string(),
        status: status.to_string(),
        signature_valid,
        artifacts: mismatches,
    })
}

/// The artifact directory of a bundle, for callers that inspect or ship it.
pub fn bundle_path(store: &CorpusStore, export_id: &str) -> PathBuf {
    store.config().exports_path().join(export_id)
}

/// Soft delete: the record gains a deletion event and the audit trail keeps
/// everything; bytes stay on disk.
pub fn soft_delete(store: &CorpusStore, user_id: &str, export_id: &str) -> Result<(), EngineError> {
    ExportRepository::new(store).append_delete_event(user_id, export_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_value_walks_nested_strings() {
        let mut v = serde_json::json!({
            "note": "mail alice@example.org",
            "nested": {"list": ["ok", "ssn 123-45-6789"]}
        });
        filter_value(
            &mut v,
            &["email".to_string(), "ssn".to_string()],
        );
        assert!(!v["note"].as_str().unwrap().contains("alice@"));
        assert!(!v["nested"]["list"][1].as_str().unwrap().contains("123-45"));
    }

    #[test]
    fn test_ts_ms_parses_suffixed() {
        assert_eq!(ts_ms("1700000000000Z"), 1_700_000_000_000);
        assert_eq!(ts_ms("bogus"), 0);
    }
}
