use dictum::core::guard::{self, ViolationKind};
use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_clean_tree_passes() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "core/store.rs",
        "pub fn append_record() {}\npub fn read_record() {}\n",
    );
    let report = guard::run_guard(tmp.path()).unwrap();
    assert!(report.passed);
    assert_eq!(report.files_scanned, 1);
}

#[test]
fn test_mutation_symbols_fail_with_file_and_line() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "core/store.rs",
        "pub fn append_record() {}\n\npub fn update_record() {}\n",
    );
    let report = guard::run_guard(tmp.path()).unwrap();
    assert!(!report.passed);
    assert_eq!(report.violations.len(), 1);
    let v = &report.violations[0];
    assert_eq!(v.kind, ViolationKind::MutationSymbol);
    assert_eq!(v.path, std::path::PathBuf::from("core/store.rs"));
    assert_eq!(v.line, 3);
}

#[test]
fn test_each_forbidden_prefix_fails() {
    for symbol in [
        "update_x", "delete_x", "remove_x", "modify_x", "edit_x", "change_x", "overwrite_x",
        "truncate_x", "drop_x", "clear_x", "reset_x", "set_x",
    ] {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "m.rs", &format!("fn {}() {{}}\n", symbol));
        let report = guard::run_guard(tmp.path()).unwrap();
        assert!(!report.passed, "symbol '{}' slipped through", symbol);
    }
}

#[test]
fn test_let_bindings_are_checked_too() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "m.rs", "fn f() { let delete_queue = 1; }\n");
    let report = guard::run_guard(tmp.path()).unwrap();
    assert!(!report.passed);
}

#[test]
fn test_vendor_sdk_outside_router_fails_with_location() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "services/notes.rs",
        "use foo_ai::Client;\n\nfn summarize() {}\n",
    );
    let report = guard::run_guard(tmp.path()).unwrap();
    assert!(!report.passed);
    let v = &report.violations[0];
    assert_eq!(v.kind, ViolationKind::RouterBypass);
    assert_eq!(v.path, std::path::PathBuf::from("services/notes.rs"));
    assert_eq!(v.line, 1);
}

#[test]
fn test_router_module_may_hold_vendor_surface() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "core/router.rs", "use foo_ai::Client;\n");
    write(tmp.path(), "core/other.rs", "pub fn append_x() {}\n");
    let report = guard::run_guard(tmp.path()).unwrap();
    assert!(report.passed, "{:?}", report.violations);
}

#[test]
fn test_engine_source_tree_passes_its_own_gates() {
    // The gates run over this crate's real source in CI.
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let report = guard::run_guard(&src).unwrap();
    assert!(
        report.passed,
        "engine tree violates its own gates: {:?}",
        report.violations
    );
    assert!(report.files_scanned > 20);
}
