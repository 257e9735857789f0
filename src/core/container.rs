//! Process-wide dependency container.
//!
//! Lazy singletons behind a memoized accessor: configuration, the policy
//! document, and the provider registry are initialized on first use and
//! shared for the life of the process. `reset` exists for tests only; it
//! returns every singleton to its uninitialized state so cases start cold.

use crate::core::config::EngineConfig;
use crate::core::embedding;
use crate::core::error::EngineError;
use crate::core::policy::{self, PolicyDocument};
use crate::core::router;
use crate::core::store::CorpusStore;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

pub struct Container {
    config: Mutex<Option<(PathBuf, EngineConfig)>>,
}

impl Container {
    fn new() -> Self {
        Self {
            config: Mutex::new(None),
        }
    }

    /// Configuration for a storage root, loaded once and memoized. First
    /// use also registers the configured providers with the router.
    pub fn config_for(&self, storage_root: &Path) -> Result<EngineConfig, EngineError> {
        {
            let guard = self
                .config
                .lock()
                .map_err(|_| EngineError::Internal("container config lock poisoned".to_string()))?;
            if let Some((root, config)) = guard.as_ref() {
                if root == storage_root {
                    return Ok(config.clone());
                }
            }
        }
        let config = EngineConfig::load(storage_root)?;
        router::register_default_providers(&config.llm_providers, config.embedding_dim);
        let mut guard = self
            .config
            .lock()
            .map_err(|_| EngineError::Internal("container config lock poisoned".to_string()))?;
        *guard = Some((storage_root.to_path_buf(), config.clone()));
        Ok(config)
    }

    pub fn policy_for(&self, storage_root: &Path) -> Result<PolicyDocument, EngineError> {
        policy::cached_policy(storage_root)
    }

    /// Open a store handle for one request. Handles are per-request by
    /// design; the only long-lived writer state is the lock held inside a
    /// critical section.
    pub fn open_store(&self, storage_root: &Path) -> Result<CorpusStore, EngineError> {
        let config = self.config_for(storage_root)?;
        CorpusStore::open(&config)
    }

    /// Test hook: return every process-wide singleton to cold state.
    pub fn reset(&self) {
        if let Ok(mut guard) = self.config.lock() {
            *guard = None;
        }
        policy::reset_policy_cache();
        router::reset_registry();
        embedding::reset_embedding_cache();
    }
}

/// The process container. First call initializes under the `OnceLock`
/// guard; later calls observe the same instance.
pub fn container() -> &'static Container {
    static CONTAINER: OnceLock<Container> = OnceLock::new();
    CONTAINER.get_or_init(Container::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_memoized_per_root() {
        let tmp = tempfile::tempdir().unwrap();
        let c = Container::new();
        let a = c.config_for(tmp.path()).unwrap();
        let b = c.config_for(tmp.path()).unwrap();
        assert_eq!(a.storage_root, b.storage_root);
    }

    #[test]
    fn test_reset_clears_memo() {
        let tmp = tempfile::tempdir().unwrap();
        let c = Container::new();
        c.config_for(tmp.path()).unwrap();
        c.reset();
        let guard = c.config.lock().unwrap();
        assert!(guard.is_none());
    }
}
