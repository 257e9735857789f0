use dictum::core::audit::{AuditEvent, AuditOperation, AuditQuery, AuditResult};
use dictum::core::config::EngineConfig;
use dictum::core::manifest;
use dictum::core::policy::PolicyDocument;
use dictum::core::store::CorpusStore;
use dictum::repos::audit::AuditRepository;
use dictum::services::audit::AuditService;
use std::path::Path;

fn test_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage_root = root.to_path_buf();
    config
}

fn backdated_event(ts_ms: u64) -> AuditEvent {
    let mut event = AuditEvent::new(
        AuditOperation::INTERACTION_APPENDED,
        "alice",
        "interaction/old",
        AuditResult::Success,
        &serde_json::json!({"aged": true}),
    );
    event.ts = format!("{}Z", ts_ms);
    event
}

#[test]
fn test_sweep_compacts_aged_events_into_signed_digest() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();

    // Three events from September 2020, one from October 2020.
    for ts in [1_600_000_000_000_u64, 1_600_100_000_000, 1_600_200_000_000] {
        store.append_audit_only(backdated_event(ts)).unwrap();
    }
    store
        .append_audit_only(backdated_event(1_601_600_000_000))
        .unwrap();
    let before = store.group_len("audit_events").unwrap();

    let service = AuditService::new(&store, PolicyDocument::default());
    let report = service.sweep_retention("system").unwrap();
    assert_eq!(report.compacted, 4);
    assert_eq!(report.digests_written, 2);

    // Raw rows removed; fresh rows (init + AUDIT_COMPACTED) remain.
    let after = store.group_len("audit_events").unwrap();
    assert!(after < before);
    let repo = AuditRepository::new(&store);
    assert!(repo.count_operation("AUDIT_COMPACTED").unwrap() >= 1);
    assert_eq!(repo.count_operation("INTERACTION_APPENDED").unwrap(), 0);

    // Monthly digests carry a verifiable signature over their canonical form.
    let digests = repo.list_digests(None).unwrap();
    assert_eq!(digests.len(), 2);
    assert_eq!(digests[0].month, "2020-09");
    assert_eq!(digests[0].event_count, 3);
    assert_eq!(digests[1].month, "2020-10");
    for digest in &digests {
        let doc = serde_json::json!({
            "month": digest.month,
            "event_count": digest.event_count,
            "first_seq": digest.first_seq,
            "last_seq": digest.last_seq,
            "aggregate_sha256": digest.aggregate_sha256,
        });
        let bytes = manifest::canonical_json_bytes(&doc);
        assert!(
            manifest::hs256_verify(&bytes, &digest.signature, &config.export_signing_key).unwrap()
        );
    }

    // Compaction is the sanctioned shrink: the store still validates and
    // accepts appends.
    let report = store.validate().unwrap();
    assert!(report.read_only.is_none());
    store
        .append_audit_only(backdated_event(1_600_000_000_001))
        .unwrap();
}

#[test]
fn test_sweep_is_noop_inside_retention_window() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    store.verify_ownership("alice", "alice").unwrap();
    let before = store.group_len("audit_events").unwrap();

    let service = AuditService::new(&store, PolicyDocument::default());
    let report = service.sweep_retention("system").unwrap();
    assert_eq!(report.compacted, 0);
    assert_eq!(report.digests_written, 0);
    assert_eq!(store.group_len("audit_events").unwrap(), before);
}

#[test]
fn test_query_filters_by_operation_user_and_window() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    store.verify_ownership("alice", "alice").unwrap();
    store.verify_ownership("bob", "bob").unwrap();

    let service = AuditService::new(&store, PolicyDocument::default());
    let verified = service
        .query(&AuditQuery {
            operation: Some("OWNERSHIP_VERIFIED".to_string()),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].user_id, "alice");

    let by_bob = service
        .query(&AuditQuery {
            user_id: Some("bob".to_string()),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(by_bob.len(), 1);
    assert_eq!(by_bob[0].operation, "OWNERSHIP_DENIED");

    // Window bounds: nothing is newer than the far future, everything is
    // newer than epoch.
    let windowed = service
        .query(&AuditQuery {
            since: Some("1000000000000Z".to_string()),
            until: Some("9999999999999Z".to_string()),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(windowed.len(), 3);
}

#[test]
fn test_timeline_merges_sources_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    store.verify_ownership("alice", "alice").unwrap();

    let service = AuditService::new(&store, PolicyDocument::default());
    let timeline = service.timeline(200).unwrap();
    assert!(timeline.sources.contains(&"audit".to_string()));
    assert!(timeline.sources.contains(&"lengths".to_string()));
    assert!(timeline.event_count > 0);
    let mut prev = String::new();
    for ev in &timeline.events {
        assert!(ev.ts >= prev);
        prev = ev.ts.clone();
    }

    let text = dictum::services::audit::render_timeline_text(&timeline);
    assert!(text.contains("CORPUS_INITIALIZED"));
    assert!(text.contains("length.init"));
}
