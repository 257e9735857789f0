//! Ownership identity for a corpus.
//!
//! The identity is `sha256(owner_credential || salt)`, written once at init
//! and never changed. Verification recomputes the hash and compares in
//! constant time so a mismatched credential leaks nothing through timing.

use sha2::{Digest, Sha256};

/// Compute the owner identity hash recorded in `corpus_meta`.
pub fn owner_identity(owner_credential: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_credential.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic corpus id derived from the owner and salt.
///
/// Distinct from the identity hash so the id can appear in manifests and
/// logs without revealing the verifier value.
pub fn corpus_id(owner_credential: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"corpus-id:");
    hasher.update(owner_credential.as_bytes());
    hasher.update(b":");
    hasher.update(salt.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("corpus-{}", &digest[..16])
}

/// Constant-time equality over hex digests.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Recompute and compare the identity for a presented credential.
pub fn verify_identity(stored_identity: &str, owner_credential: &str, salt: &str) -> bool {
    constant_time_eq(stored_identity, &owner_identity(owner_credential, salt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_deterministic() {
        assert_eq!(owner_identity("alice", "s1"), owner_identity("alice", "s1"));
        assert_ne!(owner_identity("alice", "s1"), owner_identity("bob", "s1"));
        assert_ne!(owner_identity("alice", "s1"), owner_identity("alice", "s2"));
    }

    #[test]
    fn test_verify_identity() {
        let stored = owner_identity("alice", "s1");
        assert!(verify_identity(&stored, "alice", "s1"));
        assert!(!verify_identity(&stored, "bob", "s1"));
    }

    #[test]
    fn test_corpus_id_shape() {
        let id = corpus_id("alice", "s1");
        assert!(id.starts_with("corpus-"));
        assert_eq!(id.len(), "corpus-".len() + 16);
        assert_eq!(id, corpus_id("alice", "s1"));
    }

    #[test]
    fn test_constant_time_eq_length_mismatch() {
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("abc", "abc"));
    }
}
