//! Fixed-width embedding vectors and the similarity kernel.
//!
//! Every stored vector has the configured width; shorter model outputs are
//! zero-padded by the single normalization function so one cosine kernel
//! serves all of search. Vectors are stored as little-endian f32 blobs.

use crate::core::error::EngineError;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

/// Zero-pad a vector to `dim`. Wider inputs are rejected rather than
/// truncated; truncation would silently destroy signal.
pub fn normalize_vector(vector: &[f32], dim: usize) -> Result<Vec<f32>, EngineError> {
    if vector.is_empty() {
        return Err(EngineError::Validation("empty embedding vector".to_string()));
    }
    if vector.len() > dim {
        return Err(EngineError::Validation(format!(
            "embedding has {} dims, store width is {}",
            vector.len(),
            dim
        )));
    }
    let mut out = vector.to_vec();
    out.resize(dim, 0.0);
    Ok(out)
}

pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity. Zero-padded tails contribute nothing to the dot
/// product, so mixed-source vectors compare fairly.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Cache key: model plus content hash of the text.
pub fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{}:{}", model, hex::encode(hasher.finalize()))
}

const EMBEDDING_CACHE_CAPACITY: usize = 1024;

fn embedding_cache() -> &'static Mutex<LruCache<String, Vec<f32>>> {
    static CACHE: OnceLock<Mutex<LruCache<String, Vec<f32>>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(EMBEDDING_CACHE_CAPACITY).expect("nonzero capacity"),
        ))
    })
}

pub fn cache_get(model: &str, text: &str) -> Option<Vec<f32>> {
    let key = cache_key(model, text);
    embedding_cache().lock().ok()?.get(&key).cloned()
}

pub fn cache_put(model: &str, text: &str, vector: Vec<f32>) {
    let key = cache_key(model, text);
    if let Ok(mut cache) = embedding_cache().lock() {
        cache.put(key, vector);
    }
}

/// Test hook: empty the cache so cases observe cold-path behavior.
pub fn reset_embedding_cache() {
    if let Ok(mut cache) = embedding_cache().lock() {
        while cache.pop_lru().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pads_short_vectors() {
        let v = normalize_vector(&[1.0, 2.0], 4).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_rejects_wide_vectors() {
        assert!(normalize_vector(&[1.0; 10], 4).is_err());
        assert!(normalize_vector(&[], 4).is_err());
    }

    #[test]
    fn test_blob_round_trip() {
        let v = vec![0.5_f32, -1.25, 3.0];
        assert_eq!(blob_to_vector(&vector_to_blob(&v)), v);
    }

    #[test]
    fn test_cosine_padding_is_neutral() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cache_round_trip() {
        reset_embedding_cache();
        assert!(cache_get("m", "hello").is_none());
        cache_put("m", "hello", vec![1.0, 2.0]);
        assert_eq!(cache_get("m", "hello").unwrap(), vec![1.0, 2.0]);
        // Different model, same text: distinct key.
        assert!(cache_get("other", "hello").is_none());
    }
}
