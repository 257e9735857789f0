//! The model router: the sole choke-point for LLM and embedding calls.
//!
//! Providers register by name; the router picks by model, normalizes
//! provider failures into the engine taxonomy, scrubs credentials from
//! anything it logs, and persists an audit event before any response is
//! returned to the caller. This module is the only place provider SDK
//! surface may appear; the guard validator enforces that for the rest of
//! the tree.

use crate::core::audit::{AuditEvent, AuditOperation, AuditResult};
use crate::core::embedding;
use crate::core::error::EngineError;
use crate::core::store::CorpusStore;
use regex::Regex;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, OnceLock};
use tiktoken_rs::{CoreBPE, cl100k_base};

/// What a provider returns for a completion.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    /// Token usage when the backend reports it; estimated otherwise.
    pub tokens: Option<i64>,
}

/// Failure classes a provider may surface. The router maps these onto the
/// engine taxonomy; raw messages never leave this module unscrubbed.
#[derive(Debug)]
pub enum ProviderError {
    Unavailable(String),
    RateLimited(String),
    InvalidRequest(String),
}

/// Abstract provider contract. Backends are external collaborators; the
/// engine ships deterministic local implementations for offline use and
/// tests.
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, prompt: &str) -> Result<ProviderResponse, ProviderError>;
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Deterministic local provider. Completions echo a digest of the prompt;
/// embeddings hash the text into a small stable vector. Stands in for any
/// configured backend when none is wired up.
pub struct LocalProvider {
    name: String,
    embed_width: usize,
}

impl LocalProvider {
    pub fn new(name: &str, embed_width: usize) -> Self {
        Self {
            name: name.to_string(),
            embed_width,
        }
    }
}

impl ModelProvider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        if prompt.is_empty() {
            return Err(ProviderError::InvalidRequest("empty prompt".to_string()));
        }
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(prompt.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Ok(ProviderResponse {
            text: format!("[{}:{}]", self.name, &digest[..12]),
            tokens: None,
        })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.is_empty() {
            return Err(ProviderError::InvalidRequest("empty text".to_string()));
        }
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let mut vector = Vec::with_capacity(self.embed_width);
        for i in 0..self.embed_width {
            let byte = digest[i % digest.len()];
            vector.push((byte as f32 / 255.0) * 2.0 - 1.0);
        }
        Ok(vector)
    }
}

fn registry() -> &'static Mutex<FxHashMap<String, Arc<dyn ModelProvider>>> {
    static REGISTRY: OnceLock<Mutex<FxHashMap<String, Arc<dyn ModelProvider>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(FxHashMap::default()))
}

/// Register a provider under a model name. Called at startup by each
/// provider module; adding one requires no router change.
pub fn register(name: &str, provider: Arc<dyn ModelProvider>) {
    if let Ok(mut map) = registry().lock() {
        map.insert(name.to_string(), provider);
    }
}

/// Register deterministic local providers for every configured model name.
/// Names already claimed by a real backend are left alone.
pub fn register_default_providers(model_names: &[String], embed_width: usize) {
    if let Ok(mut map) = registry().lock() {
        for name in model_names {
            map.entry(name.clone()).or_insert_with(|| {
                Arc::new(LocalProvider::new(name, embed_width.min(64))) as Arc<dyn ModelProvider>
            });
        }
    }
}

/// Test hook: empty the registry.
pub fn reset_registry() {
    if let Ok(mut map) = registry().lock() {
        *map = FxHashMap::default();
    }
}

fn provider_for(model: &str) -> Result<Arc<dyn ModelProvider>, EngineError> {
    registry()
        .lock()
        .map_err(|_| EngineError::Internal("provider registry lock poisoned".to_string()))?
        .get(model)
        .cloned()
        .ok_or_else(|| EngineError::Validation(format!("unknown model '{}'", model)))
}

/// Strip anything credential-shaped from a provider message before it can
/// reach a log or an audit row.
pub fn scrub_message(message: &str) -> String {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r#"(?i)bearer\s+[A-Za-z0-9_\-\.]+"#,
            r#"(?i)(api[_-]?key|secret[_-]?key|token)['"]?\s*[:=]\s*['"]?[A-Za-z0-9_\-]{8,}['"]?"#,
            r#"sk-[A-Za-z0-9_\-]{10,}"#,
            r#"(?i)(postgres|mysql|redis|amqp)://[^\s'"]+:[^\s'"]+@[^\s'"]+"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });
    let mut out = message.to_string();
    for re in patterns {
        out = re.replace_all(&out, "[SCRUBBED]").to_string();
    }
    out
}

fn normalize_provider_error(err: ProviderError) -> EngineError {
    match err {
        ProviderError::Unavailable(m) => EngineError::ProviderUnavailable(scrub_message(&m)),
        ProviderError::RateLimited(m) => EngineError::ProviderRateLimited(scrub_message(&m)),
        ProviderError::InvalidRequest(m) => EngineError::ProviderInvalidRequest(scrub_message(&m)),
    }
}

fn bpe() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
    BPE.get_or_init(|| cl100k_base().ok()).as_ref()
}

/// Token count for accounting when the provider reports none.
pub fn estimate_tokens(text: &str) -> i64 {
    match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as i64,
        // Rough fallback: one token per four bytes.
        None => (text.len() / 4) as i64,
    }
}

/// A routed completion, ready to append as an interaction.
#[derive(Debug, Clone)]
pub struct Routed {
    pub response: String,
    pub model: String,
    pub tokens: i64,
}

/// Route a completion. The audit event is persisted before the response is
/// handed back; a failure is audited the same way and then surfaced as the
/// normalized taxonomy error.
pub fn route(
    store: &CorpusStore,
    prompt: &str,
    model: &str,
    user_id: &str,
) -> Result<Routed, EngineError> {
    let provider = provider_for(model)?;
    match provider.complete(prompt) {
        Ok(response) => {
            let tokens = response
                .tokens
                .unwrap_or_else(|| estimate_tokens(prompt) + estimate_tokens(&response.text));
            let payload = serde_json::json!({"model": model, "tokens": tokens});
            store.append_audit_only(
                AuditEvent::new(
                    AuditOperation::LLM_CALL_ROUTED,
                    user_id,
                    &format!("model/{}", model),
                    AuditResult::Success,
                    &payload,
                )
                .with_metadata(payload.clone()),
            )?;
            Ok(Routed {
                response: response.text,
                model: model.to_string(),
                tokens,
            })
        }
        Err(err) => {
            let normalized = normalize_provider_error(err);
            let payload = serde_json::json!({"model": model, "error_class": normalized.class()});
            store.append_audit_only(
                AuditEvent::new(
                    AuditOperation::LLM_CALL_FAILED,
                    user_id,
                    &format!("model/{}", model),
                    AuditResult::Failure,
                    &payload,
                )
                .with_metadata(payload.clone()),
            )?;
            Err(normalized)
        }
    }
}

/// Embed text through the bounded LRU cache. A cache hit skips the provider
/// but is still audited (with the hit flagged) so the trail stays complete.
pub fn embed_text(
    store: &CorpusStore,
    text: &str,
    model: &str,
    user_id: &str,
) -> Result<Vec<f32>, EngineError> {
    if let Some(vector) = embedding::cache_get(model, text) {
        let payload = serde_json::json!({"model": model, "embedding": true, "cache_hit": true});
        store.append_audit_only(
            AuditEvent::new(
                AuditOperation::LLM_CALL_ROUTED,
                user_id,
                &format!("model/{}", model),
                AuditResult::Success,
                &payload,
            )
            .with_metadata(payload.clone()),
        )?;
        return Ok(vector);
    }
    let provider = provider_for(model)?;
    match provider.embed(text) {
        Ok(vector) => {
            let payload = serde_json::json!({"model": model, "embedding": true, "cache_hit": false});
            store.append_audit_only(
                AuditEvent::new(
                    AuditOperation::LLM_CALL_ROUTED,
                    user_id,
                    &format!("model/{}", model),
                    AuditResult::Success,
                    &payload,
                )
                .with_metadata(payload.clone()),
            )?;
            embedding::cache_put(model, text, vector.clone());
            Ok(vector)
        }
        Err(err) => {
            let normalized = normalize_provider_error(err);
            let payload = serde_json::json!({"model": model, "embedding": true, "error_class": normalized.class()});
            store.append_audit_only(
                AuditEvent::new(
                    AuditOperation::LLM_CALL_FAILED,
                    user_id,
                    &format!("model/{}", model),
                    AuditResult::Failure,
                    &payload,
                )
                .with_metadata(payload.clone()),
            )?;
            Err(normalized)
        }
    }
}
