//! Shared key-value store used by the rate limiter and the result cache.
//!
//! The store is the only mutable state shared across requests. Callers never
//! read-modify-write through it; coordination relies on the atomic
//! increment-with-expiry primitive each backend provides.

use async_trait::async_trait;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0}ms")]
    Timeout(u64),

    #[error("store command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Counter value and remaining lifetime, read in the same atomic step
/// that incremented it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub ttl_secs: u64,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Backend name for logging and health output.
    fn backend(&self) -> &'static str;

    /// Atomically increments `key`, setting its expiry to `window_secs` when
    /// the increment created it.
    async fn increment_with_expiry(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<WindowCount, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
