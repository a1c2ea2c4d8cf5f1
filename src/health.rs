use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::evaluation::QualityEvaluator;
use crate::provider::GenerationProvider;
use crate::store::CounterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub llm_provider: ServiceStatus,
    pub cache_store: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<ServiceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: HealthState,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl ServiceStatus {
    fn healthy(elapsed: Duration) -> Self {
        Self {
            status: HealthState::Healthy,
            response_time_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    fn unhealthy(elapsed: Duration, error: String) -> Self {
        Self {
            status: HealthState::Unhealthy,
            response_time_ms: elapsed.as_millis() as u64,
            error: Some(error),
        }
    }
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

/// Runs a dependency probe under `timeout`, timing it.
async fn probe<F, E>(timeout: Duration, check: F) -> ServiceStatus
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    let start = Instant::now();
    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(())) => ServiceStatus::healthy(start.elapsed()),
        Ok(Err(err)) => ServiceStatus::unhealthy(start.elapsed(), err.to_string()),
        Err(_) => ServiceStatus::unhealthy(
            start.elapsed(),
            format!("health check timed out after {}ms", timeout.as_millis()),
        ),
    }
}

/// The provider is critical; the store and the evaluator are not.
pub fn aggregate(dependencies: &DependencyStatus) -> HealthState {
    if dependencies.llm_provider.status == HealthState::Unhealthy {
        return HealthState::Unhealthy;
    }

    let non_critical_down = dependencies.cache_store.status != HealthState::Healthy
        || dependencies
            .evaluator
            .as_ref()
            .is_some_and(|e| e.status != HealthState::Healthy);

    if non_critical_down || dependencies.llm_provider.status == HealthState::Degraded {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

pub struct HealthAggregator {
    provider: Arc<dyn GenerationProvider>,
    store: Arc<dyn CounterStore>,
    evaluator: Option<Arc<QualityEvaluator>>,
    check_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn CounterStore>,
        evaluator: Option<Arc<QualityEvaluator>>,
        check_timeout: Duration,
    ) -> Self {
        // Pin the uptime origin to service construction.
        let _ = *START_TIME;
        Self {
            provider,
            store,
            evaluator,
            check_timeout,
        }
    }

    /// Probes every dependency concurrently.
    pub async fn check(&self) -> HealthStatus {
        let evaluator_check = async {
            match &self.evaluator {
                Some(evaluator) => Some(probe(self.check_timeout, evaluator.health_check()).await),
                None => None,
            }
        };

        let (llm_provider, cache_store, evaluator) = tokio::join!(
            probe(self.check_timeout, self.provider.health_check()),
            probe(self.check_timeout, self.store.ping()),
            evaluator_check,
        );

        let dependencies = DependencyStatus {
            llm_provider,
            cache_store,
            evaluator,
        };
        let status = aggregate(&dependencies);
        if status != HealthState::Healthy {
            tracing::warn!(status = ?status, dependencies = ?dependencies, "Service health is not healthy");
        }

        let now = SystemTime::now();
        HealthStatus {
            status,
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: now.duration_since(*START_TIME).unwrap_or_default().as_secs(),
            dependencies,
        }
    }
}
