//! The summarization request pipeline.
//!
//! One call to [`Orchestrator::summarize`] walks the stages in a fixed
//! order: authenticate, rate check, cache lookup, generation with retry
//! (or the extractive fallback), optional evaluation, cache write. Cache
//! and evaluation failures are absorbed here; only authentication, rate
//! limiting, validation and a provider failure with fallback disabled
//! reach the caller.

pub mod retry;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::auth::KeyStore;
use crate::cache::{CacheLookup, Fingerprint, ResultCache};
use crate::error::SummarizerError;
use crate::evaluation::QualityEvaluator;
use crate::fallback::FallbackSummarizer;
use crate::metrics::MetricsCollector;
use crate::model::{CallerIdentity, EvaluationMetrics, SummarizeRequest, SummaryResult};
use crate::provider::{Generation, GenerationProvider, GenerationRequest};
use crate::rate_limiter::{Quota, RateLimiter};

use self::retry::{RetryOutcome, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    RateChecked,
    CacheChecked,
    Generating,
    GeneratingFallback,
    Evaluating,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::RateChecked => "rate_checked",
            Stage::CacheChecked => "cache_checked",
            Stage::Generating => "generating",
            Stage::GeneratingFallback => "generating_fallback",
            Stage::Evaluating => "evaluating",
            Stage::Completed => "completed",
        }
    }
}

/// Result of the generation stage.
#[derive(Debug, Clone)]
pub enum ProviderOutcome {
    Primary {
        generation: Generation,
        attempts: u32,
    },
    FallbackUsed {
        generation: Generation,
        attempts: u32,
        cause: String,
    },
    Failed {
        error: SummarizerError,
        attempts: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimeouts {
    /// Overall deadline of one request.
    pub request: Duration,
    /// Upper bound of a single provider attempt.
    pub provider: Duration,
    /// Slice of `request` kept free for fallback and evaluation.
    pub fallback_headroom: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            provider: Duration::from_secs(8),
            fallback_headroom: Duration::from_secs(1),
        }
    }
}

impl PipelineTimeouts {
    fn generation_budget(&self) -> Duration {
        self.request.saturating_sub(self.fallback_headroom)
    }
}

/// What a successful pass through the pipeline hands back.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub result: SummaryResult,
    /// Budget left for the caller, when it was counted against one.
    pub quota: Option<Quota>,
    pub caller: CallerIdentity,
    /// Provider attempts made; 0 for a cache hit.
    pub attempts: u32,
}

pub struct Orchestrator {
    keys: KeyStore,
    rate_limiter: Option<RateLimiter>,
    cache: ResultCache,
    provider: Arc<dyn GenerationProvider>,
    fallback: FallbackSummarizer,
    fallback_enabled: bool,
    evaluator: Option<Arc<QualityEvaluator>>,
    retry: RetryPolicy,
    timeouts: PipelineTimeouts,
    metrics: MetricsCollector,
}

impl Orchestrator {
    /// Pipeline without rate limiting or evaluation, fallback enabled.
    pub fn new(keys: KeyStore, cache: ResultCache, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            keys,
            rate_limiter: None,
            cache,
            provider,
            fallback: FallbackSummarizer::new(),
            fallback_enabled: true,
            evaluator: None,
            retry: RetryPolicy::default(),
            timeouts: PipelineTimeouts::default(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<QualityEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub async fn summarize(
        &self,
        credential: Option<&str>,
        request: SummarizeRequest,
    ) -> Result<PipelineOutput, SummarizerError> {
        let started = Instant::now();
        self.metrics.record_request();

        let output = self.run(started, credential, &request).await;
        if let Err(err) = &output {
            match err {
                SummarizerError::Unauthorized => self.metrics.record_unauthorized(),
                SummarizerError::RateLimited { .. } => self.metrics.record_rate_limited(),
                _ => self.metrics.record_failure(),
            }
        }
        output
    }

    async fn run(
        &self,
        started: Instant,
        credential: Option<&str>,
        request: &SummarizeRequest,
    ) -> Result<PipelineOutput, SummarizerError> {
        let caller = match self.keys.authenticate(credential) {
            Ok(caller) => caller,
            Err(err) => {
                info!(stage = Stage::Received.as_str(), "Rejected request with invalid credential");
                return Err(err);
            }
        };

        let quota = match &self.rate_limiter {
            Some(limiter) => {
                let decision = limiter.admit(&caller).await;
                match decision.into_result(limiter.window_secs()) {
                    Ok(quota) => quota,
                    Err(err) => {
                        info!(
                            caller = %caller,
                            retry_after_secs = err.retry_after().unwrap_or_default(),
                            "Caller exceeded rate limit"
                        );
                        return Err(err);
                    }
                }
            }
            None => None,
        };
        debug!(caller = %caller, stage = Stage::RateChecked.as_str(), "Request admitted");

        let fingerprint = Fingerprint::of(request);
        if let CacheLookup::Hit(stored) = self.cache.lookup(&fingerprint).await {
            self.metrics.record_cache_hit();
            let result = SummaryResult::from_cache(stored, elapsed_ms(started));
            info!(
                caller = %caller,
                fingerprint = fingerprint.short(),
                stage = Stage::Completed.as_str(),
                model = %result.model,
                latency_ms = result.latency_ms,
                "Served summary from cache"
            );
            return Ok(PipelineOutput {
                result,
                quota,
                caller,
                attempts: 0,
            });
        }
        debug!(
            fingerprint = fingerprint.short(),
            stage = Stage::CacheChecked.as_str(),
            "Cache miss"
        );

        let generation_deadline = started + self.timeouts.generation_budget();
        let (generation, attempts) = match self.generate(request, generation_deadline).await {
            ProviderOutcome::Primary {
                generation,
                attempts,
            } => {
                self.metrics.record_primary();
                (generation, attempts)
            }
            ProviderOutcome::FallbackUsed {
                generation,
                attempts,
                ..
            } => {
                self.metrics.record_fallback();
                (generation, attempts)
            }
            ProviderOutcome::Failed { error, attempts } => {
                self.metrics.record_retries(attempts.saturating_sub(1));
                return Err(error);
            }
        };
        self.metrics.record_retries(attempts.saturating_sub(1));

        let evaluation = self
            .evaluate(request, &generation.summary, started + self.timeouts.request)
            .await;

        let result = SummaryResult::generated(
            generation.summary,
            generation.usage,
            generation.model,
            elapsed_ms(started),
            evaluation,
        );

        // Best effort; the store bounds each call with its own timeout.
        self.cache.store(&fingerprint, &result).await;

        info!(
            caller = %caller,
            fingerprint = fingerprint.short(),
            stage = Stage::Completed.as_str(),
            model = %result.model,
            attempts,
            latency_ms = result.latency_ms,
            fallback = result.is_fallback(),
            "Summary generated"
        );

        Ok(PipelineOutput {
            result,
            quota,
            caller,
            attempts,
        })
    }

    /// Calls the provider under the retry policy, switching to the
    /// extractive fallback when it cannot produce a summary.
    pub async fn generate(&self, request: &SummarizeRequest, deadline: Instant) -> ProviderOutcome {
        let generation_request = GenerationRequest::from(request);
        let provider = self.provider.as_ref();
        let input = &generation_request;

        let outcome = self
            .retry
            .execute(deadline, self.timeouts.provider, move |attempt| async move {
                debug!(
                    attempt = attempt + 1,
                    stage = Stage::Generating.as_str(),
                    provider = provider.name(),
                    model = provider.model(),
                    "Calling generation provider"
                );
                provider.generate(input).await
            })
            .await;

        let attempts = outcome.attempts();
        let cause = match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                return ProviderOutcome::Primary {
                    generation: value,
                    attempts,
                }
            }
            RetryOutcome::Rejected { error, attempts } if error.is_caller_fault() => {
                return ProviderOutcome::Failed {
                    error: SummarizerError::Validation(error.to_string()),
                    attempts,
                }
            }
            RetryOutcome::Rejected { error, .. } => error.to_string(),
            RetryOutcome::Exhausted { last_error, .. } => last_error.to_string(),
            RetryOutcome::DeadlineElapsed { last_error, .. } => last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "generation deadline elapsed".to_string()),
        };

        if !self.fallback_enabled {
            warn!(attempts, error = %cause, "Primary provider unavailable and fallback is disabled");
            return ProviderOutcome::Failed {
                error: SummarizerError::ProviderUnavailable(cause),
                attempts,
            };
        }

        warn!(
            attempts,
            error = %cause,
            stage = Stage::GeneratingFallback.as_str(),
            "Primary provider unavailable, using extractive fallback"
        );
        let fallback = self.fallback;
        let owned = request.clone();
        match tokio::task::spawn_blocking(move || fallback.summarize_request(&owned)).await {
            Ok(generation) => ProviderOutcome::FallbackUsed {
                generation,
                attempts,
                cause,
            },
            Err(err) => {
                error!(attempts, error = %err, "Extractive fallback aborted");
                ProviderOutcome::Failed {
                    error: SummarizerError::Internal(format!("extractive fallback aborted: {}", err)),
                    attempts,
                }
            }
        }
    }

    async fn evaluate(
        &self,
        request: &SummarizeRequest,
        summary: &str,
        request_deadline: Instant,
    ) -> Option<EvaluationMetrics> {
        let evaluator = self.evaluator.as_ref()?;

        let left = request_deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            warn!(stage = Stage::Evaluating.as_str(), "No time left for evaluation, skipping");
            return None;
        }

        match tokio::time::timeout(left, evaluator.evaluate(&request.text, summary)).await {
            Ok(Ok(metrics)) => {
                debug!(
                    stage = Stage::Evaluating.as_str(),
                    quality_score = metrics.quality_score,
                    "Summary evaluated"
                );
                Some(metrics)
            }
            Ok(Err(err)) => {
                let degraded = SummarizerError::from(err);
                warn!(
                    stage = Stage::Evaluating.as_str(),
                    category = degraded.category().as_str(),
                    error = %degraded,
                    "Evaluation failed, omitting metrics"
                );
                None
            }
            Err(_) => {
                warn!(
                    stage = Stage::Evaluating.as_str(),
                    "Evaluation ran past the request deadline, omitting metrics"
                );
                None
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Language, Tone};
    use crate::provider::ProviderError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct Refusing;

    #[async_trait]
    impl GenerationProvider for Refusing {
        fn name(&self) -> &str {
            "refusing"
        }

        fn model(&self) -> &str {
            "refusing-1"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, ProviderError> {
            Err(ProviderError::InvalidInput("prompt too long".into()))
        }

        async fn health_check(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn orchestrator(provider: Arc<dyn GenerationProvider>) -> Orchestrator {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()), 600);
        Orchestrator::new(KeyStore::new(["test-key-123"]), cache, provider)
            .with_retry_policy(RetryPolicy::disabled())
    }

    fn request() -> SummarizeRequest {
        SummarizeRequest::new(
            "The river flooded the lower town. Residents moved to higher ground.",
            Language::Auto,
            50,
            Tone::Neutral,
        )
    }

    #[test]
    fn test_generation_budget_leaves_headroom() {
        let timeouts = PipelineTimeouts::default();
        assert_eq!(timeouts.generation_budget(), Duration::from_secs(9));

        let tight = PipelineTimeouts {
            request: Duration::from_millis(500),
            provider: Duration::from_millis(400),
            fallback_headroom: Duration::from_secs(1),
        };
        assert_eq!(tight.generation_budget(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_provider_input_rejection_is_a_validation_failure() {
        let pipeline = orchestrator(Arc::new(Refusing));
        let err = pipeline
            .summarize(Some("test-key-123"), request())
            .await
            .unwrap_err();

        assert!(matches!(err, SummarizerError::Validation(_)));
        assert_eq!(pipeline.metrics().snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_missing_credential_stops_before_generation() {
        let pipeline = orchestrator(Arc::new(Refusing));
        let err = pipeline.summarize(None, request()).await.unwrap_err();

        assert!(matches!(err, SummarizerError::Unauthorized));
        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.unauthorized, 1);
        assert_eq!(snapshot.failed_requests, 0);
    }

    #[tokio::test]
    async fn test_zero_budget_goes_straight_to_fallback() {
        let pipeline = orchestrator(Arc::new(Refusing));
        let deadline = Instant::now();

        match pipeline.generate(&request(), deadline).await {
            ProviderOutcome::FallbackUsed {
                generation,
                attempts,
                ..
            } => {
                assert_eq!(attempts, 0);
                assert!(generation.model.starts_with("fallback/"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }
}
