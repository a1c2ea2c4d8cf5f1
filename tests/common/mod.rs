#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use summarizer::auth::KeyStore;
use summarizer::cache::ResultCache;
use summarizer::model::TokenUsage;
use summarizer::pipeline::retry::RetryPolicy;
use summarizer::pipeline::Orchestrator;
use summarizer::provider::{Generation, GenerationProvider, GenerationRequest, ProviderError};
use summarizer::store::MemoryStore;

pub const API_KEY: &str = "integration-key-0001";
pub const PRIMARY_MODEL: &str = "scripted-model-1";

/// Provider double that fails a fixed number of times, then succeeds.
pub struct ScriptedProvider {
    failures: u32,
    delay: Duration,
    healthy: bool,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn succeeding() -> Self {
        Self::failing_times(0)
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            failures,
            delay: Duration::ZERO,
            healthy: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self {
            healthy: false,
            ..Self::failing_times(u32::MAX)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        PRIMARY_MODEL
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call < self.failures {
            return Err(ProviderError::Api {
                status: 503,
                message: "model overloaded".to_string(),
            });
        }
        Ok(Generation {
            summary: format!("Summary of {} characters.", request.text.chars().count()),
            usage: TokenUsage::new(20, 5),
            model: PRIMARY_MODEL.to_string(),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.healthy {
            Ok(())
        } else {
            Err(ProviderError::Http("connection refused".to_string()))
        }
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new()
        .max_attempts(3)
        .base_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(20))
        .jitter(Duration::ZERO)
}

/// Pipeline over an in-memory store with quick retries and no rate limit.
pub fn pipeline(provider: Arc<ScriptedProvider>, store: Arc<MemoryStore>) -> Orchestrator {
    Orchestrator::new(
        KeyStore::new([API_KEY]),
        ResultCache::new(store, 600),
        provider,
    )
    .with_retry_policy(fast_retry())
}
