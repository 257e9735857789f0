//! PII detection and redaction for exports.
//!
//! Regex families for the policy-named pattern classes. Filtering is
//! policy-gated: a debug export may disable it, and the effective policy's
//! version hash rides in the manifest so a verifier can reproduce exactly
//! what was filtered.

use regex::Regex;
use std::sync::OnceLock;

pub const REDACTION_MARK: &str = "[REDACTED]";

struct PiiFamily {
    name: &'static str,
    pattern: &'static str,
}

const FAMILIES: &[PiiFamily] = &[
    PiiFamily {
        name: "email",
        pattern: r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
    },
    PiiFamily {
        name: "phone",
        pattern: r"(?:\+?\d{1,3}[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b",
    },
    PiiFamily {
        name: "ssn",
        pattern: r"\b\d{3}-\d{2}-\d{4}\b",
    },
    PiiFamily {
        name: "url",
        pattern: r#"https?://[^\s'"<>]+"#,
    },
];

fn compiled_families() -> &'static Vec<(&'static str, Regex)> {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        FAMILIES
            .iter()
            .filter_map(|f| Regex::new(f.pattern).ok().map(|re| (f.name, re)))
            .collect()
    })
}

/// Redact every match of the enabled pattern families.
pub fn filter_text(text: &str, enabled_patterns: &[String]) -> String {
    let mut out = text.to_string();
    for (name, re) in compiled_families() {
        if enabled_patterns.iter().any(|p| p == name) {
            out = re.replace_all(&out, REDACTION_MARK).to_string();
        }
    }
    out
}

/// Names of families that match the text, for diagnostics.
pub fn detect(text: &str) -> Vec<&'static str> {
    compiled_families()
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_patterns() -> Vec<String> {
        vec![
            "email".to_string(),
            "phone".to_string(),
            "ssn".to_string(),
            "url".to_string(),
        ]
    }

    #[test]
    fn test_email_redacted() {
        let out = filter_text("contact alice@example.org today", &all_patterns());
        assert!(!out.contains("alice@example.org"));
        assert!(out.contains(REDACTION_MARK));
    }

    #[test]
    fn test_ssn_redacted() {
        let out = filter_text("ssn 123-45-6789 on file", &all_patterns());
        assert!(!out.contains("123-45-6789"));
    }

    #[test]
    fn test_phone_redacted() {
        let out = filter_text("call 555-123-4567", &all_patterns());
        assert!(!out.contains("555-123-4567"));
    }

    #[test]
    fn test_url_redacted() {
        let out = filter_text("see https://example.org/record?id=4", &all_patterns());
        assert!(!out.contains("https://"));
    }

    #[test]
    fn test_disabled_family_passes_through() {
        let out = filter_text("contact alice@example.org", &["ssn".to_string()]);
        assert!(out.contains("alice@example.org"));
    }

    #[test]
    fn test_detect_names_families() {
        let found = detect("mail bob@x.io or visit https://x.io");
        assert!(found.contains(&"email"));
        assert!(found.contains(&"url"));
        assert!(!found.contains(&"ssn"));
    }
}
