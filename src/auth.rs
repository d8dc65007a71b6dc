use axum::http::HeaderMap;

/// Header carrying the ingest shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Pull the ingest credential from the request headers.
/// `x-api-key` wins over `Authorization: Bearer <key>`.
pub fn extract_credential(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key);
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
}

/// Extract Bearer token from Authorization header (scheme is case-insensitive)
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    const BEARER_PREFIX: &str = "bearer ";

    let prefix = auth_header.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }

    let token = auth_header[BEARER_PREFIX.len()..].trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token_success() {
        assert_eq!(extract_bearer_token("Bearer sk-test-key-123"), Some("sk-test-key-123"));
        assert_eq!(extract_bearer_token("bearer  padded "), Some("padded"));
    }

    #[test]
    fn test_extract_bearer_token_missing_prefix() {
        assert_eq!(extract_bearer_token("sk-test-key-123"), None);
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }

    #[test]
    fn test_extract_bearer_token_empty() {
        assert_eq!(extract_bearer_token("Bearer "), None);
    }

    #[test]
    fn test_api_key_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("from-header"));
        headers.insert("authorization", HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(extract_credential(&headers), Some("from-header"));
    }

    #[test]
    fn test_falls_back_to_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(extract_credential(&headers), Some("from-bearer"));
        assert_eq!(extract_credential(&HeaderMap::new()), None);
    }
}
