use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::error::SummarizerError;
use crate::model::CallerIdentity;

const CALLER_ID_LEN: usize = 16;

/// Set of accepted API keys, held as SHA-256 digests.
#[derive(Debug, Clone)]
pub struct KeyStore {
    digests: HashSet<String>,
}

fn digest_hex(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

impl KeyStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests = keys
            .into_iter()
            .map(|key| key.as_ref().trim().to_string())
            .filter(|key| !key.is_empty())
            .map(|key| digest_hex(&key))
            .collect();
        Self { digests }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Resolves a presented credential to the caller it belongs to.
    pub fn authenticate(&self, credential: Option<&str>) -> Result<CallerIdentity, SummarizerError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(SummarizerError::Unauthorized)?;

        let digest = digest_hex(credential);
        if self.digests.contains(&digest) {
            Ok(CallerIdentity::new(&digest[..CALLER_ID_LEN]))
        } else {
            Err(SummarizerError::Unauthorized)
        }
    }
}

/// Extracts the credential from `Authorization: Bearer` or `X-API-Key`.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let mut parts = value.trim().splitn(2, ' ');
        if let (Some(scheme), Some(token)) = (parts.next(), parts.next()) {
            if scheme.eq_ignore_ascii_case("bearer") {
                return Some(token.trim().to_string());
            }
        }
    }

    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_valid_key_yields_stable_opaque_identity() {
        let store = KeyStore::new(["secret-key-123", "other-key-456"]);
        let first = store.authenticate(Some("secret-key-123")).unwrap();
        let again = store.authenticate(Some("secret-key-123")).unwrap();
        let other = store.authenticate(Some("other-key-456")).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(first.as_str().len(), CALLER_ID_LEN);
        assert!(!first.as_str().contains("secret"));
    }

    #[test]
    fn test_missing_or_unknown_key_is_unauthorized() {
        let store = KeyStore::new(vec!["secret-key-123".to_string()]);
        assert!(matches!(
            store.authenticate(None),
            Err(SummarizerError::Unauthorized)
        ));
        assert!(matches!(
            store.authenticate(Some("  ")),
            Err(SummarizerError::Unauthorized)
        ));
        assert!(matches!(
            store.authenticate(Some("wrong-key-000")),
            Err(SummarizerError::Unauthorized)
        ));
    }

    #[test]
    fn test_extract_bearer_and_api_key_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer  abc-123 "),
        );
        assert_eq!(extract_credential(&headers).as_deref(), Some("abc-123"));

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("xyz-789"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("xyz-789"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(extract_credential(&headers), None);
    }
}
