//! Declarative policy engine.
//!
//! The policy document declares what the engine may do: append-only rules,
//! retention, PII filtering on export, and allowed egress destinations. It
//! is loaded once per storage root behind a memoized thread-safe accessor
//! and consulted by every service-level write before any store mutation.

use crate::core::error::EngineError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

pub const POLICY_FILE_NAME: &str = "policy.toml";

/// Embedded default policy, used when a storage root carries no override.
pub const DEFAULT_POLICY_TOML: &str = include_str!("../../assets/policy.default.toml");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyDocument {
    pub append_only: bool,
    pub retention_days: u32,
    pub ownership_required: bool,
    pub pii: PiiPolicy,
    pub egress: EgressPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PiiPolicy {
    pub filter_on_export: bool,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EgressPolicy {
    pub allowed_destinations: Vec<String>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        toml::from_str(DEFAULT_POLICY_TOML)
            .unwrap_or_else(|_| PolicyDocument::fallback())
    }
}

impl Default for PiiPolicy {
    fn default() -> Self {
        Self {
            filter_on_export: true,
            patterns: vec![
                "email".to_string(),
                "phone".to_string(),
                "ssn".to_string(),
                "url".to_string(),
            ],
        }
    }
}

impl Default for EgressPolicy {
    fn default() -> Self {
        Self {
            allowed_destinations: vec!["local".to_string()],
        }
    }
}

impl PolicyDocument {
    fn fallback() -> Self {
        Self {
            append_only: true,
            retention_days: 90,
            ownership_required: true,
            pii: PiiPolicy::default(),
            egress: EgressPolicy::default(),
        }
    }

    /// Canonical bytes of the policy (sorted-key JSON) and their hash.
    /// The hash is the `policy_version` recorded in export manifests so a
    /// verifier can reproduce the filtering that was applied.
    pub fn version(&self) -> String {
        let canonical = crate::core::manifest::canonical_json_bytes(
            &serde_json::to_value(self).unwrap_or_default(),
        );
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    /// Reject a write that the declarative rules forbid. Checked by every
    /// service before it touches the store.
    pub fn check_write(&self, operation: &str) -> Result<(), EngineError> {
        if !self.append_only {
            return Ok(());
        }
        let forbidden = ["update", "delete", "truncate", "overwrite"];
        let lowered = operation.to_lowercase();
        for verb in forbidden {
            if lowered.starts_with(verb) {
                return Err(EngineError::PolicyDenied(format!(
                    "operation '{}' violates append_only policy",
                    operation
                )));
            }
        }
        Ok(())
    }

    /// Reject an export destination outside the allowed egress set.
    pub fn check_egress(&self, destination: &str) -> Result<(), EngineError> {
        if self
            .egress
            .allowed_destinations
            .iter()
            .any(|d| d == destination)
        {
            Ok(())
        } else {
            Err(EngineError::PolicyDenied(format!(
                "egress destination '{}' not allowed",
                destination
            )))
        }
    }
}

/// Load the policy for a storage root: on-disk override or embedded default.
pub fn load_policy(storage_root: &Path) -> Result<PolicyDocument, EngineError> {
    let path = storage_root.join(POLICY_FILE_NAME);
    if path.exists() {
        let content = fs::read_to_string(&path).map_err(EngineError::Io)?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Validation(format!("bad {}: {}", POLICY_FILE_NAME, e)))
    } else {
        Ok(PolicyDocument::default())
    }
}

fn policy_cell() -> &'static Mutex<Option<(std::path::PathBuf, PolicyDocument)>> {
    static POLICY: OnceLock<Mutex<Option<(std::path::PathBuf, PolicyDocument)>>> = OnceLock::new();
    POLICY.get_or_init(|| Mutex::new(None))
}

/// Memoized policy accessor. First call for a root loads and caches; later
/// calls return the cached document. A different root reloads (tests use
/// fresh tempdirs per case).
pub fn cached_policy(storage_root: &Path) -> Result<PolicyDocument, EngineError> {
    let cell = policy_cell();
    {
        let guard = cell
            .lock()
            .map_err(|_| EngineError::Internal("policy cache lock poisoned".to_string()))?;
        if let Some((root, doc)) = guard.as_ref() {
            if root == storage_root {
                return Ok(doc.clone());
            }
        }
    }
    let doc = load_policy(storage_root)?;
    let mut guard = cell
        .lock()
        .map_err(|_| EngineError::Internal("policy cache lock poisoned".to_string()))?;
    *guard = Some((storage_root.to_path_buf(), doc.clone()));
    Ok(doc)
}

/// Test hook: drop the cached policy so the next access reloads.
pub fn reset_policy_cache() {
    if let Ok(mut guard) = policy_cell().lock() {
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_parses() {
        let doc = PolicyDocument::default();
        assert!(doc.append_only);
        assert_eq!(doc.retention_days, 90);
        assert!(doc.pii.filter_on_export);
        assert_eq!(doc.egress.allowed_destinations, vec!["local"]);
    }

    #[test]
    fn test_append_only_check() {
        let doc = PolicyDocument::default();
        assert!(doc.check_write("append_interaction").is_ok());
        assert!(doc.check_write("update_session").is_err());
        assert!(doc.check_write("delete_export").is_err());
    }

    #[test]
    fn test_egress_check() {
        let doc = PolicyDocument::default();
        assert!(doc.check_egress("local").is_ok());
        assert!(doc.check_egress("s3").is_err());
    }

    #[test]
    fn test_policy_version_is_stable() {
        let doc = PolicyDocument::default();
        assert_eq!(doc.version(), doc.version());
        let mut other = doc.clone();
        other.retention_days = 30;
        assert_ne!(doc.version(), other.version());
    }

    #[test]
    fn test_override_file_wins() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(POLICY_FILE_NAME),
            "append_only = true\nretention_days = 7\n",
        )
        .unwrap();
        let doc = load_policy(tmp.path()).unwrap();
        assert_eq!(doc.retention_days, 7);
    }
}
