use dictum::core::config::EngineConfig;
use dictum::core::error::EngineError;
use dictum::core::policy::PolicyDocument;
use dictum::core::store::{self, CorpusStore};
use dictum::services::corpus::CorpusService;
use dictum::services::session::SessionService;
use std::path::Path;

fn test_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage_root = root.to_path_buf();
    config
}

fn seed_one_interaction(config: &EngineConfig) -> CorpusStore {
    let store = CorpusStore::init(config, "alice", "s1").unwrap();
    let policy = PolicyDocument::default();
    let session = SessionService::new(&store, policy.clone())
        .create("alice", serde_json::json!({}))
        .unwrap();
    CorpusService::new(&store, policy)
        .append_interaction(
            "alice",
            &session.session_id,
            "hi",
            "hello",
            "m",
            2,
            serde_json::json!({}),
        )
        .unwrap();
    assert_eq!(store.group_len("interactions").unwrap(), 1);
    store
}

#[test]
fn test_external_truncation_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = seed_one_interaction(&config);
    let db_path = store.db_path().to_path_buf();
    drop(store);

    // Out-of-band truncation of the dataset, exactly what the length log
    // exists to catch.
    {
        let conn = store::raw_connection(&db_path).unwrap();
        conn.execute("DELETE FROM interactions", []).unwrap();
    }

    let err = CorpusStore::open(&config).unwrap_err();
    assert!(matches!(err, EngineError::MutationDetected(_)));

    // The latch holds for the rest of the process.
    assert!(store::read_only_reason(&db_path).is_some());

    // The violation was audited.
    {
        let conn = store::raw_connection(&db_path).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audit_events WHERE operation = 'INTEGRITY_VIOLATION'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(count >= 1);
    }

    // Subsequent opens stay fatal: the violation marker is persistent.
    let err = CorpusStore::open(&config).unwrap_err();
    assert!(matches!(err, EngineError::MutationDetected(_)));

    store::reset_read_only_latch(&db_path);
}

#[test]
fn test_crash_tail_is_quarantined_not_truncated() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = seed_one_interaction(&config);
    let db_path = store.db_path().to_path_buf();
    drop(store);

    // Simulate a crash tail: a row committed after the last recorded
    // length (the length-log write never landed).
    {
        let conn = store::raw_connection(&db_path).unwrap();
        conn.execute(
            "INSERT INTO interactions(interaction_id, session_id, prompt, response, model, tokens, ts, metadata)
             VALUES('orphan', 's', 'p', 'r', 'm', 0, '0Z', '{}')",
            [],
        )
        .unwrap();
    }

    let store = CorpusStore::open(&config).unwrap();
    // Tail moved aside, recorded length restored.
    assert_eq!(store.group_len("interactions").unwrap(), 1);
    let report = store.validate().unwrap();
    let group = report
        .groups
        .iter()
        .find(|g| g.group == "interactions")
        .unwrap();
    assert_eq!(group.salvaged, 1);

    // The quarantined row is preserved verbatim for the operator.
    store
        .with_read(|conn| {
            let row_json: String = conn.query_row(
                "SELECT row_json FROM interactions_salvage",
                [],
                |r| r.get(0),
            )?;
            assert!(row_json.contains("orphan"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_writes_refused_after_latch() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = seed_one_interaction(&config);
    let db_path = store.db_path().to_path_buf();

    store::latch_read_only(&db_path, "operator hold");
    let policy = PolicyDocument::default();
    let result = SessionService::new(&store, policy).create("alice", serde_json::json!({}));
    assert!(matches!(result, Err(EngineError::MutationDetected(_))));

    store::reset_read_only_latch(&db_path);
}
