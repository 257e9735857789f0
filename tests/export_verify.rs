use dictum::core::config::EngineConfig;
use dictum::core::export::Selector;
use dictum::core::policy::PolicyDocument;
use dictum::core::store::CorpusStore;
use dictum::repos::audit::AuditRepository;
use dictum::services::corpus::CorpusService;
use dictum::services::export::ExportService;
use dictum::services::session::SessionService;
use std::fs;
use std::path::Path;

fn test_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage_root = root.to_path_buf();
    config
}

fn seed_session(store: &CorpusStore) -> String {
    let policy = PolicyDocument::default();
    let session = SessionService::new(store, policy.clone())
        .create("alice", serde_json::json!({"clinic": "north"}))
        .unwrap();
    CorpusService::new(store, policy)
        .append_interaction(
            "alice",
            &session.session_id,
            "patient reports mild headache",
            "noted; advised hydration",
            "m",
            8,
            serde_json::json!({}),
        )
        .unwrap();
    session.session_id
}

#[test]
fn test_export_verify_round_trip_then_flip_detected() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let session_id = seed_session(&store);

    let service = ExportService::new(&store, PolicyDocument::default());
    let selectors = vec![Selector::Session {
        session_id: session_id.clone(),
    }];
    let record = service.create("alice", &selectors).unwrap();

    // Fresh bundle verifies clean.
    let report = service.verify(&record.export_id).unwrap();
    assert_eq!(report.status, "ok");
    assert!(report.signature_valid);
    assert!(report.artifacts.is_empty());

    // Flip one byte of one artifact.
    let artifact_path = config
        .exports_path()
        .join(&record.export_id)
        .join("artifacts")
        .join(format!("sessions/{}.json", session_id));
    let mut bytes = fs::read(&artifact_path).unwrap();
    bytes[0] ^= 0x01;
    fs::write(&artifact_path, &bytes).unwrap();

    let report = service.verify(&record.export_id).unwrap();
    assert_eq!(report.status, "mismatch");
    assert_eq!(report.artifacts.len(), 1);
    let mismatch = &report.artifacts[0];
    assert_eq!(mismatch.artifact, format!("sessions/{}.json", session_id));
    assert_ne!(mismatch.expected, mismatch.actual);

    let audit = AuditRepository::new(&store);
    assert!(audit.count_operation("EXPORT_CREATED").unwrap() >= 1);
    assert!(audit.count_operation("EXPORT_VERIFIED").unwrap() >= 2);
}

#[test]
fn test_export_is_deterministic_for_same_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let session_id = seed_session(&store);

    let service = ExportService::new(&store, PolicyDocument::default());
    let selectors = vec![Selector::Session {
        session_id: session_id.clone(),
    }];
    let first = service.create("alice", &selectors).unwrap();

    // Same snapshot, second run: identical id, manifest, and signature.
    let artifact_rel = format!("sessions/{}.json", session_id);
    let first_bytes = fs::read(
        config
            .exports_path()
            .join(&first.export_id)
            .join("artifacts")
            .join(&artifact_rel),
    )
    .unwrap();

    let second = service.create("alice", &selectors).unwrap();
    assert_eq!(second.export_id, first.export_id);
    assert_eq!(second.signature, first.signature);
    let second_bytes = fs::read(
        config
            .exports_path()
            .join(&first.export_id)
            .join("artifacts")
            .join(&artifact_rel),
    )
    .unwrap();
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn test_pii_filtered_from_artifacts_per_policy() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let policy = PolicyDocument::default();

    let session = SessionService::new(&store, policy.clone())
        .create("alice", serde_json::json!({}))
        .unwrap();
    CorpusService::new(&store, policy.clone())
        .append_interaction(
            "alice",
            &session.session_id,
            "patient email is pat@example.org, ssn 123-45-6789",
            "recorded",
            "m",
            10,
            serde_json::json!({}),
        )
        .unwrap();

    let service = ExportService::new(&store, policy);
    let record = service
        .create(
            "alice",
            &[Selector::Session {
                session_id: session.session_id.clone(),
            }],
        )
        .unwrap();

    let artifact_bytes = fs::read(
        config
            .exports_path()
            .join(&record.export_id)
            .join("artifacts")
            .join(format!("sessions/{}.json", session.session_id)),
    )
    .unwrap();
    let text = String::from_utf8(artifact_bytes).unwrap();
    assert!(!text.contains("pat@example.org"));
    assert!(!text.contains("123-45-6789"));
    assert!(text.contains("[REDACTED]"));
}

#[test]
fn test_soft_delete_keeps_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let session_id = seed_session(&store);

    let service = ExportService::new(&store, PolicyDocument::default());
    let record = service
        .create("alice", &[Selector::Session { session_id }])
        .unwrap();

    service.soft_delete("alice", &record.export_id).unwrap();
    let read_back = service.get(&record.export_id).unwrap();
    assert!(read_back.deleted_at.is_some());

    // Bytes stay on disk; the audit trail records the deletion.
    assert!(
        config
            .exports_path()
            .join(&record.export_id)
            .join("manifest.json")
            .exists()
    );
    assert!(
        AuditRepository::new(&store)
            .count_operation("EXPORT_DELETED")
            .unwrap()
            >= 1
    );
}

#[test]
fn test_manifest_signature_rejects_wrong_key() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    let store = CorpusStore::init(&config, "alice", "s1").unwrap();
    let session_id = seed_session(&store);

    let service = ExportService::new(&store, PolicyDocument::default());
    let record = service
        .create("alice", &[Selector::Session { session_id }])
        .unwrap();
    drop(store);

    // Reopen under a different signing key: the signature no longer holds.
    config.export_signing_key = "rotated-key".to_string();
    let store = CorpusStore::open(&config).unwrap();
    let service = ExportService::new(&store, PolicyDocument::default());
    let report = service.verify(&record.export_id).unwrap();
    assert!(!report.signature_valid);
    assert_eq!(report.status, "signature_invalid");
}
