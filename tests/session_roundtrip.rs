use dictum::core::config::EngineConfig;
use dictum::core::error::EngineError;
use dictum::core::policy::PolicyDocument;
use dictum::core::store::CorpusStore;
use dictum::services::session::SessionService;
use std::path::Path;

fn test_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage_root = root.to_path_buf();
    config
}

#[test]
fn test_nested_metadata_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let service = SessionService::new(&store, PolicyDocument::default());

    let metadata = serde_json::json!({
        "transcription_sources": {
            "final": ["a", "b"],
            "raw": "x"
        }
    });
    let session = service.create("alice", metadata.clone()).unwrap();
    let read_back = service.get(&session.session_id).unwrap();

    // Equal as a nested mapping, not a JSON string.
    assert_eq!(read_back.metadata, metadata);
    assert!(read_back.metadata["transcription_sources"].is_object());
    assert_eq!(
        read_back.metadata["transcription_sources"]["final"],
        serde_json::json!(["a", "b"])
    );
}

#[test]
fn test_forward_only_state_machine() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let service = SessionService::new(&store, PolicyDocument::default());

    let session = service.create("alice", serde_json::json!({})).unwrap();
    let id = session.session_id;

    // open -> archived skips a state.
    let err = service.archive("alice", &id).unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));

    let finalized = service.finalize("alice", &id).unwrap();
    assert_eq!(finalized.state.as_str(), "finalized");

    // finalized -> finalized is backward for mutation purposes.
    let err = service.finalize("alice", &id).unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));

    let archived = service.archive("alice", &id).unwrap();
    assert_eq!(archived.state.as_str(), "archived");

    // Terminal: nothing moves out of archived.
    assert!(service.finalize("alice", &id).is_err());
    assert!(service.archive("alice", &id).is_err());

    // The fold agrees after re-read.
    assert_eq!(service.get(&id).unwrap().state.as_str(), "archived");
}

#[test]
fn test_records_may_still_reference_finalized_session() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let policy = PolicyDocument::default();
    let sessions = SessionService::new(&store, policy.clone());

    let session = sessions.create("alice", serde_json::json!({})).unwrap();
    sessions.finalize("alice", &session.session_id).unwrap();

    // Appends referencing the session stay legal after finalization.
    let corpus = dictum::services::corpus::CorpusService::new(&store, policy);
    let appended = corpus.append_interaction(
        "alice",
        &session.session_id,
        "late note",
        "recorded",
        "m",
        1,
        serde_json::json!({}),
    );
    assert!(appended.is_ok());
}

#[test]
fn test_create_rejects_non_mapping_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let service = SessionService::new(&store, PolicyDocument::default());

    let err = service
        .create("alice", serde_json::json!(["not", "a", "mapping"]))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = service.create("", serde_json::json!({})).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn test_unknown_session_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let service = SessionService::new(&store, PolicyDocument::default());
    let err = service.get("missing").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    let err = service.finalize("alice", "missing").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
