//! Result cache keyed by a digest of the logical request.
//!
//! The cache is an optimization only: a store failure on lookup is a miss
//! and a store failure on write is logged and dropped. Entries assume the
//! provider answers identical requests interchangeably; a non-deterministic
//! provider makes a hit a plausible answer, not the answer.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::error::SummarizerError;
use crate::model::{SummarizeRequest, SummaryResult};
use crate::store::CounterStore;

const KEY_PREFIX: &str = "summarizer:summary";
const ENCODING_VERSION: &str = "v1";

/// Hex SHA-256 digest of the canonical request encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &SummarizeRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_encoding(request).as_bytes());
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapses whitespace runs to one space. Case and punctuation carry
/// meaning and are kept.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length-prefixed so no choice of text can collide with the trailing fields.
pub fn canonical_encoding(request: &SummarizeRequest) -> String {
    let text = normalize_text(&request.text);
    format!(
        "{}|{}:{}|{}|{}|{}",
        ENCODING_VERSION,
        text.len(),
        text,
        request.lang.code(),
        request.max_tokens,
        request.tone.as_str()
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(SummaryResult),
    Miss,
}

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CounterStore>,
    ttl_secs: u64,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CounterStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("{}:{}", KEY_PREFIX, fingerprint.as_str())
    }

    pub async fn lookup(&self, fingerprint: &Fingerprint) -> CacheLookup {
        let raw = match self.store.get(&Self::key(fingerprint)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheLookup::Miss,
            Err(err) => {
                let degraded = SummarizerError::from(err);
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    category = degraded.category().as_str(),
                    error = %degraded,
                    "Cache lookup failed, treating as miss"
                );
                return CacheLookup::Miss;
            }
        };

        match serde_json::from_str::<SummaryResult>(&raw) {
            Ok(result) => CacheLookup::Hit(result),
            Err(err) => {
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    error = %err,
                    "Discarding undecodable cache entry"
                );
                CacheLookup::Miss
            }
        }
    }

    /// Best-effort write; returns whether the entry was stored.
    pub async fn store(&self, fingerprint: &Fingerprint, result: &SummaryResult) -> bool {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode summary for cache");
                return false;
            }
        };

        match self
            .store
            .set_with_ttl(&Self::key(fingerprint), &payload, self.ttl_secs)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    fingerprint = fingerprint.short(),
                    ttl_secs = self.ttl_secs,
                    "Cached summary"
                );
                true
            }
            Err(err) => {
                let degraded = SummarizerError::from(err);
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    category = degraded.category().as_str(),
                    error = %degraded,
                    "Cache write failed, continuing without cache"
                );
                false
            }
        }
    }
}
