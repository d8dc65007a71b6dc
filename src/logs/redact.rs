//! Metadata redaction
//!
//! Applied before an entry is stored, so nothing sensitive ever reaches the
//! ring, a subscriber, or an export.

use super::entry::Metadata;

/// Replacement value for masked fields
pub const REDACTED: &str = "***REDACTED***";

/// Key fragments that mark a metadata field as sensitive (matched against the lowercased key)
pub const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "apikey",
    "authorization",
    "cookie",
    "set-cookie",
];

/// Whether a metadata key names a sensitive value
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|s| lowered.contains(s))
}

/// Return a copy of `metadata` with every sensitive key's value masked
///
/// # Example
/// ```
/// use opslog::logs::redact::{redact_metadata, REDACTED};
///
/// let mut meta = serde_json::Map::new();
/// meta.insert("auth_token_v2".into(), "abc".into());
/// meta.insert("route".into(), "/api".into());
///
/// let redacted = redact_metadata(Some(&meta)).unwrap();
/// assert_eq!(redacted["auth_token_v2"], REDACTED);
/// assert_eq!(redacted["route"], "/api");
/// ```
pub fn redact_metadata(metadata: Option<&Metadata>) -> Option<Metadata> {
    metadata.map(|meta| {
        meta.iter()
            .map(|(k, v)| {
                let value = if is_sensitive_key(k) {
                    serde_json::Value::String(REDACTED.to_string())
                } else {
                    v.clone()
                };
                (k.clone(), value)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_none_passes_through() {
        assert!(redact_metadata(None).is_none());
    }

    #[test]
    fn test_sensitive_keys_are_masked() {
        let input = meta(json!({
            "token": "secret",
            "safe": "ok",
            "Password": "hunter2",
            "Set-Cookie": "sid=1",
            "x-api_key": 42,
        }));

        let out = redact_metadata(Some(&input)).unwrap();
        assert_eq!(out["token"], REDACTED);
        assert_eq!(out["Password"], REDACTED);
        assert_eq!(out["Set-Cookie"], REDACTED);
        assert_eq!(out["x-api_key"], REDACTED);
        assert_eq!(out["safe"], "ok");
    }

    #[test]
    fn test_matching_ignores_case_and_position() {
        for key in ["Token", "TOKEN", "x-token", "auth_token_v2", "ClientSecretId"] {
            assert!(is_sensitive_key(key), "{} should be sensitive", key);
        }
        assert!(!is_sensitive_key("user"));
        assert!(!is_sensitive_key("path"));
    }

    #[test]
    fn test_nested_values_are_kept_for_safe_keys() {
        let input = meta(json!({ "request": { "path": "/x", "status": 200 } }));
        let out = redact_metadata(Some(&input)).unwrap();
        assert_eq!(out["request"]["status"], 200);
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let input = meta(json!({ "apikey": "k", "n": 1, "cookie": REDACTED }));
        let once = redact_metadata(Some(&input)).unwrap();
        let twice = redact_metadata(Some(&once)).unwrap();
        assert_eq!(once, twice);
    }
}
