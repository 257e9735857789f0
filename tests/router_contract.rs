use dictum::core::config::EngineConfig;
use dictum::core::error::EngineError;
use dictum::core::router::{self, ModelProvider, ProviderError, ProviderResponse};
use dictum::core::store::CorpusStore;
use dictum::repos::audit::AuditRepository;
use std::path::Path;
use std::sync::Arc;

fn test_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage_root = root.to_path_buf();
    config
}

struct FailingProvider;

impl ModelProvider for FailingProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    fn complete(&self, _prompt: &str) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Unavailable(
            "upstream 502; api_key=sk-secretsecret1234 leaked in message".to_string(),
        ))
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::RateLimited("429 with Bearer tok123456".to_string()))
    }
}

#[test]
fn test_route_persists_audit_before_response() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    router::register_default_providers(&config.llm_providers, config.embedding_dim);

    let routed = router::route(&store, "summarize the visit", "claude", "alice").unwrap();
    assert!(!routed.response.is_empty());
    assert!(routed.tokens > 0);

    let audit = AuditRepository::new(&store);
    assert!(audit.count_operation("LLM_CALL_ROUTED").unwrap() >= 1);
}

#[test]
fn test_failed_call_audited_and_scrubbed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    router::register("flaky", Arc::new(FailingProvider));

    let err = router::route(&store, "hello", "flaky", "alice").unwrap_err();
    assert!(matches!(err, EngineError::ProviderUnavailable(_)));
    // Credentials scrubbed from the normalized message.
    let text = err.to_string();
    assert!(!text.contains("sk-secretsecret1234"));

    let audit = AuditRepository::new(&store);
    assert!(audit.count_operation("LLM_CALL_FAILED").unwrap() >= 1);

    // The embed path normalizes rate limiting the same way.
    let err = router::embed_text(&store, "text", "flaky", "alice").unwrap_err();
    assert!(matches!(err, EngineError::ProviderRateLimited(_)));
    assert!(!err.to_string().contains("tok123456"));
}

#[test]
fn test_unknown_model_is_validation_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();

    let err = router::route(&store, "hi", "no-such-model", "alice").unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn test_embedding_cache_short_circuits_second_call() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    router::register_default_providers(&config.llm_providers, config.embedding_dim);
    dictum::core::embedding::reset_embedding_cache();

    let text = "unique text for cache probe";
    let first = router::embed_text(&store, text, "ollama", "alice").unwrap();
    let second = router::embed_text(&store, text, "ollama", "alice").unwrap();
    assert_eq!(first, second);

    // Both calls audited; the second one carries the cache-hit flag.
    let events = AuditRepository::new(&store)
        .query(&dictum::core::audit::AuditQuery {
            operation: Some("LLM_CALL_ROUTED".to_string()),
            ..Default::default()
        })
        .unwrap();
    let flags: Vec<bool> = events
        .iter()
        .filter(|e| e.metadata["embedding"] == serde_json::json!(true))
        .map(|e| e.metadata["cache_hit"] == serde_json::json!(true))
        .collect();
    assert_eq!(flags, vec![false, true]);
}
