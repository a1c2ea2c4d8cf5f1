//! Bounded retry with exponential backoff for provider calls.
//!
//! The loop is explicit: it carries the attempt number, checks the
//! generation deadline before each attempt and each sleep, and reports a
//! tagged outcome instead of an error chain.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::provider::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. 1 disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform random delay added to each backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// `base * 2^attempt` capped at `max_delay`, without jitter. `attempt`
    /// is 0-indexed: the delay after the first failure is `base`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Backoff plus jitter, or the provider's retry hint when it gave one.
    /// Either way the delay never exceeds `max_delay` plus jitter.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.delay_for_attempt(attempt) + jitter
    }

    /// Runs `op` until it succeeds, fails permanently, runs out of attempts
    /// or the deadline passes. Each attempt is bounded by
    /// `min(attempt_timeout, time left)`.
    pub async fn execute<T, F, Fut>(
        &self,
        deadline: Instant,
        attempt_timeout: Duration,
        mut op: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return RetryOutcome::DeadlineElapsed {
                    last_error,
                    attempts: attempt,
                };
            }

            let budget = attempt_timeout.min(left);
            let result = match tokio::time::timeout(budget, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(budget)),
            };

            let err = match result {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt + 1,
                    }
                }
                Err(err) if !err.is_retryable() => {
                    return RetryOutcome::Rejected {
                        error: err,
                        attempts: attempt + 1,
                    }
                }
                Err(err) => err,
            };

            if attempt + 1 < self.max_attempts {
                let retry_after = match &err {
                    ProviderError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                let delay = self.backoff(attempt, retry_after);
                if Instant::now() + delay >= deadline {
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Backoff would pass the generation deadline, giving up"
                    );
                    return RetryOutcome::DeadlineElapsed {
                        last_error: Some(err),
                        attempts: attempt + 1,
                    };
                }
                warn!(
                    attempt = attempt + 1,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient provider error"
                );
                tokio::time::sleep(delay).await;
            }
            last_error = Some(err);
        }

        RetryOutcome::Exhausted {
            last_error: last_error.unwrap_or(ProviderError::EmptyResponse),
            attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed with a retryable error.
    Exhausted { last_error: ProviderError, attempts: u32 },
    /// A non-retryable error ended the loop early.
    Rejected { error: ProviderError, attempts: u32 },
    DeadlineElapsed {
        last_error: Option<ProviderError>,
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Rejected { attempts, .. }
            | RetryOutcome::DeadlineElapsed { attempts, .. } => *attempts,
        }
    }
}
