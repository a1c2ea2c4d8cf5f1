use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub primary_generations: u64,
    pub fallback_generations: u64,
    pub provider_retries: u64,
    pub rate_limited: u64,
    pub unauthorized: u64,
    pub failed_requests: u64,
    pub started_at: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    primary_generations: AtomicU64,
    fallback_generations: AtomicU64,
    provider_retries: AtomicU64,
    rate_limited: AtomicU64,
    unauthorized: AtomicU64,
    failed_requests: AtomicU64,
}

/// Process-wide pipeline counters. Cloning shares the same counters.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    counters: Arc<Counters>,
    started_at: u64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn record_request(&self) {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_primary(&self) {
        self.counters.primary_generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.counters.fallback_generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retries(&self, retries: u32) {
        if retries > 0 {
            self.counters
                .provider_retries
                .fetch_add(u64::from(retries), Ordering::Relaxed);
        }
    }

    pub fn record_rate_limited(&self) {
        self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.counters.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            total_requests: c.total_requests.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            primary_generations: c.primary_generations.load(Ordering::Relaxed),
            fallback_generations: c.fallback_generations.load(Ordering::Relaxed),
            provider_retries: c.provider_retries.load(Ordering::Relaxed),
            rate_limited: c.rate_limited.load(Ordering::Relaxed),
            unauthorized: c.unauthorized.load(Ordering::Relaxed),
            failed_requests: c.failed_requests.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }
}
