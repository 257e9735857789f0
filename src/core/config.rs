//! Engine configuration.
//!
//! Resolution order: built-in defaults, then `dictum.toml` beside the
//! storage root, then `DICTUM_*` environment overrides. Every tunable the
//! engine honors is enumerated here; nothing reads configuration from
//! anywhere else.

use crate::core::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "dictum.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding corpus.db, the length log, audio, and exports.
    pub storage_root: PathBuf,
    /// Path of the corpus database, relative to `storage_root` if not absolute.
    pub corpus_path: PathBuf,
    /// Content-addressed audio bytes directory.
    pub audio_dir: PathBuf,
    /// Export bundle directory.
    pub exports_dir: PathBuf,
    /// Audit events older than this are compacted into signed digests.
    pub retention_days: u32,
    /// Upload intake ceiling in bytes.
    pub max_upload_bytes: u64,
    /// Accepted audio file extensions.
    pub allowed_audio_ext: Vec<String>,
    /// "native" runs the in-process pool; "distributed" enqueues for
    /// external workers reachable through `broker_url`.
    pub job_mode: String,
    pub broker_url: Option<String>,
    /// Native-mode worker thread count.
    pub worker_concurrency: usize,
    /// Pending jobs beyond this depth are rejected with back-pressure.
    pub queue_depth_limit: usize,
    /// Retry ceiling for failed jobs.
    pub max_attempts: u32,
    /// Per-kind job timeout in seconds (kind -> secs).
    pub job_timeout_secs: BTreeMap<String, u64>,
    /// Fixed embedding width; shorter model outputs are zero-padded.
    pub embedding_dim: usize,
    pub llm_default_model: String,
    /// Provider names the router may register at startup.
    pub llm_providers: Vec<String>,
    /// HS256 key for export manifests and audit digests.
    pub export_signing_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut job_timeout_secs = BTreeMap::new();
        job_timeout_secs.insert("transcribe".to_string(), 600);
        job_timeout_secs.insert("diarize".to_string(), 600);
        job_timeout_secs.insert("embed".to_string(), 120);
        job_timeout_secs.insert("export".to_string(), 300);
        Self {
            storage_root: PathBuf::from("storage"),
            corpus_path: PathBuf::from("corpus.db"),
            audio_dir: PathBuf::from("audio"),
            exports_dir: PathBuf::from("exports"),
            retention_days: 90,
            max_upload_bytes: 100 * 1024 * 1024,
            allowed_audio_ext: vec![
                "wav".to_string(),
                "mp3".to_string(),
                "m4a".to_string(),
                "flac".to_string(),
            ],
            job_mode: "native".to_string(),
            broker_url: None,
            worker_concurrency: 2,
            queue_depth_limit: 64,
            max_attempts: 3,
            job_timeout_secs,
            embedding_dim: 768,
            llm_default_model: "claude".to_string(),
            llm_providers: vec!["claude".to_string(), "ollama".to_string()],
            export_signing_key: "dictum-dev-signing-key".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration for a storage root: defaults, then the TOML file
    /// beside the root if present, then environment overrides.
    pub fn load(storage_root: &Path) -> Result<Self, EngineError> {
        let mut config = Self::default();
        config.storage_root = storage_root.to_path_buf();

        let config_path = storage_root.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(EngineError::Io)?;
            config = toml::from_str(&content)
                .map_err(|e| EngineError::Validation(format!("bad {}: {}", CONFIG_FILE_NAME, e)))?;
            config.storage_root = storage_root.to_path_buf();
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("DICTUM_RETENTION_DAYS") {
            if let Ok(days) = v.parse() {
                self.retention_days = days;
            }
        }
        if let Ok(v) = env::var("DICTUM_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = v.parse() {
                self.max_upload_bytes = bytes;
            }
        }
        if let Ok(v) = env::var("DICTUM_JOB_MODE") {
            self.job_mode = v;
        }
        if let Ok(v) = env::var("DICTUM_BROKER_URL") {
            self.broker_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = env::var("DICTUM_WORKER_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.worker_concurrency = n;
            }
        }
        if let Ok(v) = env::var("DICTUM_QUEUE_DEPTH_LIMIT") {
            if let Ok(n) = v.parse() {
                self.queue_depth_limit = n;
            }
        }
        if let Ok(v) = env::var("DICTUM_EMBEDDING_DIM") {
            if let Ok(n) = v.parse() {
                self.embedding_dim = n;
            }
        }
        if let Ok(v) = env::var("DICTUM_LLM_DEFAULT_MODEL") {
            self.llm_default_model = v;
        }
        if let Ok(v) = env::var("DICTUM_EXPORT_SIGNING_KEY") {
            self.export_signing_key = v;
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        match self.job_mode.as_str() {
            "native" | "distributed" => {}
            other => {
                return Err(EngineError::Validation(format!(
                    "unknown job_mode '{}' (expected 'native' or 'distributed')",
                    other
                )));
            }
        }
        if self.job_mode == "distributed" && self.broker_url.is_none() {
            return Err(EngineError::Validation(
                "job_mode 'distributed' requires broker_url".to_string(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(EngineError::Validation(
                "embedding_dim must be positive".to_string(),
            ));
        }
        if self.worker_concurrency == 0 {
            return Err(EngineError::Validation(
                "worker_concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn corpus_db_path(&self) -> PathBuf {
        if self.corpus_path.is_absolute() {
            self.corpus_path.clone()
        } else {
            self.storage_root.join(&self.corpus_path)
        }
    }

    pub fn lengths_log_path(&self) -> PathBuf {
        self.storage_root
            .join(crate::core::schemas::LENGTHS_LOG_NAME)
    }

    pub fn audio_path(&self) -> PathBuf {
        if self.audio_dir.is_absolute() {
            self.audio_dir.clone()
        } else {
            self.storage_root.join(&self.audio_dir)
        }
    }

    pub fn exports_path(&self) -> PathBuf {
        if self.exports_dir.is_absolute() {
            self.exports_dir.clone()
        } else {
            self.storage_root.join(&self.exports_dir)
        }
    }

    pub fn timeout_for(&self, kind: &str) -> u64 {
        self.job_timeout_secs.get(kind).copied().unwrap_or(300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retention_days, 90);
        assert_eq!(config.embedding_dim, 768);
        assert_eq!(config.job_mode, "native");
        assert!(config.allowed_audio_ext.contains(&"flac".to_string()));
    }

    #[test]
    fn test_load_from_toml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "retention_days = 30\nworker_concurrency = 4\n",
        )
        .unwrap();
        let config = EngineConfig::load(tmp.path()).unwrap();
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.worker_concurrency, 4);
        // Untouched keys keep defaults.
        assert_eq!(config.embedding_dim, 768);
    }

    #[test]
    fn test_distributed_requires_broker_url() {
        let mut config = EngineConfig::default();
        config.job_mode = "distributed".to_string();
        assert!(config.validate().is_err());
        config.broker_url = Some("amqp://localhost".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_job_mode_rejected() {
        let mut config = EngineConfig::default();
        config.job_mode = "celery".to_string();
        assert!(config.validate().is_err());
    }
}
