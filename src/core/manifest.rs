//! Canonical JSON and HS256 signatures.
//!
//! Export manifests and audit digests are signed over their canonical byte
//! form: object keys sorted, compact separators, UTF-8, no trailing newline.
//! The signature is HMAC-SHA256 encoded base64url without padding.

use crate::core::error::EngineError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Render a value to canonical JSON bytes: keys sorted recursively, compact
/// form, no trailing newline. Two structurally equal values always produce
/// identical bytes.
pub fn canonical_json_bytes(value: &JsonValue) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut Vec<u8>) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(
                    serde_json::to_string(key).unwrap_or_default().as_bytes(),
                );
                out.push(b':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push(b'}');
        }
        JsonValue::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        other => {
            out.extend_from_slice(
                serde_json::to_string(other).unwrap_or_default().as_bytes(),
            );
        }
    }
}

/// HS256 over arbitrary bytes, base64url without padding.
pub fn hs256_sign(bytes: &[u8], key: &str) -> Result<String, EngineError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| EngineError::Internal("signing key rejected by HMAC".to_string()))?;
    mac.update(bytes);
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Verify an HS256 signature produced by [`hs256_sign`].
pub fn hs256_verify(bytes: &[u8], signature: &str, key: &str) -> Result<bool, EngineError> {
    let expected = hs256_sign(bytes, key)?;
    Ok(crate::core::identity::constant_time_eq(&expected, signature))
}

/// Sign a JSON value over its canonical bytes.
pub fn sign_manifest(manifest: &JsonValue, key: &str) -> Result<String, EngineError> {
    hs256_sign(&canonical_json_bytes(manifest), key)
}
