//! Shared timestamp/event helpers for deterministic envelopes.

use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

/// Returns unix-epoch milliseconds with `Z` suffix, strictly increasing
/// within this process. Ties against the wall clock advance by 1 ms so
/// audit order always equals append order.
pub fn now_monotonic_ms_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    static LAST_MS: AtomicU64 = AtomicU64::new(0);
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let mut prev = LAST_MS.load(Ordering::Relaxed);
    loop {
        let next = wall.max(prev + 1);
        match LAST_MS.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return format!("{}Z", next),
            Err(observed) => prev = observed,
        }
    }
}

/// Unix-epoch seconds as a number, for retention arithmetic.
pub fn now_epoch_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard response envelope shape shared by every caller-facing surface.
///
/// `{status, code, data, message, timestamp, request_id}` — transports render
/// this verbatim; the CLI prints it under `--format json`.
pub fn response_envelope(status: &str, code: u16, data: JsonValue, message: &str) -> JsonValue {
    serde_json::json!({
        "status": status,
        "code": code,
        "data": data,
        "message": message,
        "timestamp": now_epoch_z(),
        "request_id": new_event_id(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_epoch_z_format() {
        let result = now_epoch_z();
        assert!(result.ends_with('Z'));
        let numeric_part = result.trim_end_matches('Z');
        assert!(numeric_part.parse::<u64>().is_ok());
    }

    #[test]
    fn test_monotonic_ms_strictly_increases() {
        let mut prev = 0u64;
        for _ in 0..64 {
            let ts = now_monotonic_ms_z();
            let ms: u64 = ts.trim_end_matches('Z').parse().unwrap();
            assert!(ms > prev);
            prev = ms;
        }
    }

    #[test]
    fn test_new_event_id_is_valid_ulid() {
        let id = new_event_id();
        assert!(ulid::Ulid::from_string(&id).is_ok());
    }

    #[test]
    fn test_response_envelope_shape() {
        let env = response_envelope("ok", 200, serde_json::json!({"k": 1}), "done");
        assert_eq!(env["status"], "ok");
        assert_eq!(env["code"], 200);
        assert_eq!(env["data"]["k"], 1);
        assert!(env["timestamp"].is_string());
        assert!(env["request_id"].is_string());
    }
}
