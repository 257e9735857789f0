//! Source-tree guard gates.
//!
//! Two architectural validators run over the source tree (CI and
//! pre-commit, via `dictum guard`):
//!
//! - The mutation guard flags any symbol whose identifier carries a
//!   mutation prefix (`update_`, `delete_`, ...). The store is append-only;
//!   code that names a mutation is code that wants one.
//! - The router guard flags vendor SDK imports or invocations anywhere
//!   outside the router module, which is the single sanctioned home for
//!   provider surface.
//!
//! These are gates over the tree, not runtime checks.

use crate::core::error::EngineError;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Identifier prefixes the mutation guard rejects.
pub const FORBIDDEN_PREFIXES: &[&str] = &[
    "update_",
    "delete_",
    "remove_",
    "modify_",
    "edit_",
    "change_",
    "overwrite_",
    "truncate_",
    "drop_",
    "clear_",
    "reset_",
    "set_",
];

/// Symbols exempt from the prefix rule: the test-only reset hooks on
/// process-wide singletons.
pub const ALLOWED_SYMBOLS: &[&str] = &[
    "reset_policy_cache",
    "reset_registry",
    "reset_embedding_cache",
    "reset_read_only_latch",
];

/// Module allowed to carry provider SDK surface.
pub const ROUTER_MODULE: &str = "core/router.rs";

/// This module: its pattern tables and fixtures must spell out exactly what
/// the gates reject, so it is exempt from its own scan.
pub const GUARD_MODULE: &str = "core/guard.rs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    MutationSymbol,
    RouterBypass,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MutationSymbol => write!(f, "Mutation symbol"),
            Self::RouterBypass => write!(f, "Router bypass"),
        }
    }
}

#[derive(Debug)]
pub struct Violation {
    pub kind: ViolationKind,
    pub path: PathBuf,
    pub line: usize,
    pub message: String,
}

#[derive(Debug)]
pub struct GuardReport {
    pub passed: bool,
    pub files_scanned: usize,
    pub violations: Vec<Violation>,
}

fn symbol_pattern() -> Regex {
    // fn/let/const/static definitions; the identifier is the capture.
    Regex::new(r"\b(?:fn|let(?:\s+mut)?|const|static)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("symbol pattern compiles")
}

fn vendor_patterns() -> Vec<Regex> {
    [
        r"\buse\s+(?:anthropic|async_openai|openai|openai_api|ollama_rs|genai|llm_chain|foo_ai)\b",
        r"\b(?:anthropic|async_openai|openai|ollama_rs|genai|foo_ai)::",
        r#"extern\s+crate\s+(?:anthropic|openai|ollama_rs|foo_ai)\b"#,
        r#"api\.anthropic\.com|api\.openai\.com"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

/// Scan a source tree. `src_root` is the directory holding the `.rs` files
/// (typically `src/`).
pub fn run_guard(src_root: &Path) -> Result<GuardReport, EngineError> {
    let mut files = Vec::new();
    collect_rust_files(src_root, &mut files)?;

    let symbol_re = symbol_pattern();
    let vendor_res = vendor_patterns();
    let mut violations = Vec::new();

    for path in &files {
        let rel = path
            .strip_prefix(src_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if rel == GUARD_MODULE {
            continue;
        }
        let is_router = rel == ROUTER_MODULE;

        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") {
                continue;
            }

            for cap in symbol_re.captures_iter(line) {
                let ident = &cap[1];
                if ALLOWED_SYMBOLS.contains(&ident) {
                    continue;
                }
                if FORBIDDEN_PREFIXES.iter().any(|p| ident.starts_with(p)) {
                    violations.push(Violation {
                        kind: ViolationKind::MutationSymbol,
                        path: PathBuf::from(&rel),
                        line: line_num + 1,
                        message: format!("symbol '{}' names a mutation", ident),
                    });
                }
            }

            if !is_router {
                for re in &vendor_res {
                    if re.is_match(line) {
                        violations.push(Violation {
                            kind: ViolationKind::RouterBypass,
                            path: PathBuf::from(&rel),
                            line: line_num + 1,
                            message: "provider SDK surface outside the router".to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }

    Ok(GuardReport {
        passed: violations.is_empty(),
        files_scanned: files.len(),
        violations,
    })
}

fn collect_rust_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), EngineError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            out.push(path);
        }
    }
    out.sort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_mutation_symbol_flagged_with_location() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("bad.rs"),
            "fn helper() {}\nfn update_record(id: &str) {}\n",
        )
        .unwrap();
        let report = run_guard(tmp.path()).unwrap();
        assert!(!report.passed);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].line, 2);
        assert_eq!(report.violations[0].kind, ViolationKind::MutationSymbol);
    }

    #[test]
    fn test_every_forbidden_prefix_trips() {
        let tmp = tempfile::tempdir().unwrap();
        for prefix in FORBIDDEN_PREFIXES {
            fs::write(
                tmp.path().join("bad.rs"),
                format!("fn {}thing() {{}}\n", prefix),
            )
            .unwrap();
            let report = run_guard(tmp.path()).unwrap();
            assert!(!report.passed, "prefix '{}' not flagged", prefix);
        }
    }

    #[test]
    fn test_allowed_reset_hooks_pass() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("ok.rs"),
            "pub fn reset_policy_cache() {}\npub fn reset_registry() {}\n",
        )
        .unwrap();
        let report = run_guard(tmp.path()).unwrap();
        assert!(report.passed, "{:?}", report.violations);
    }

    #[test]
    fn test_vendor_import_outside_router_flagged() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("sneaky.rs"),
            "use foo_ai::Client;\nfn call() { foo_ai::complete(\"hi\"); }\n",
        )
        .unwrap();
        let report = run_guard(tmp.path()).unwrap();
        assert!(!report.passed);
        assert!(
            report
                .violations
                .iter()
                .all(|v| v.kind == ViolationKind::RouterBypass)
        );
        assert_eq!(report.violations[0].line, 1);
    }

    #[test]
    fn test_vendor_import_inside_router_allowed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("core")).unwrap();
        fs::write(
            tmp.path().join("core/router.rs"),
            "use foo_ai::Client;\n",
        )
        .unwrap();
        let report = run_guard(tmp.path()).unwrap();
        assert!(report.passed, "{:?}", report.violations);
    }

    #[test]
    fn test_comments_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("doc.rs"),
            "// fn update_record would be rejected\nfn fine() {}\n",
        )
        .unwrap();
        let report = run_guard(tmp.path()).unwrap();
        assert!(report.passed);
    }
}
