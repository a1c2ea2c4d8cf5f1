use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SummarizerError;
use crate::model::CallerIdentity;
use crate::store::CounterStore;

const KEY_PREFIX: &str = "summarizer:rate";

/// Behaviour of the limiter when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutagePolicy {
    /// Admit the request and log a warning.
    FailOpen,
    /// Reject the request as if the budget were exhausted.
    FailClosed,
}

impl StoreOutagePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOutagePolicy::FailOpen => "fail-open",
            StoreOutagePolicy::FailClosed => "fail-closed",
        }
    }
}

impl fmt::Display for StoreOutagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreOutagePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Ok(StoreOutagePolicy::FailOpen),
            "fail-closed" | "fail_closed" | "closed" => Ok(StoreOutagePolicy::FailClosed),
            other => Err(format!(
                "invalid store outage policy '{}', expected 'fail-open' or 'fail-closed'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// `remaining` is `None` when the store was unreachable and the
    /// request was admitted under the fail-open policy.
    Allowed { limit: u64, remaining: Option<u64> },
    Rejected { limit: u64, retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }

    pub fn into_result(self, window_secs: u64) -> Result<Option<Quota>, SummarizerError> {
        match self {
            RateDecision::Allowed {
                limit,
                remaining: Some(remaining),
            } => Ok(Some(Quota { limit, remaining })),
            RateDecision::Allowed { remaining: None, .. } => Ok(None),
            RateDecision::Rejected {
                limit,
                retry_after_secs,
            } => Err(SummarizerError::RateLimited {
                limit,
                window_secs,
                retry_after_secs,
            }),
        }
    }
}

/// Budget information reported back to an admitted caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
}

/// Fixed-window counter per caller on the shared store.
///
/// Each check increments the caller's counter for the current bucket; the
/// counter expires with the window, so nothing is ever cleaned up here.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limit: u64,
    window_secs: u64,
    outage_policy: StoreOutagePolicy,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        limit: u64,
        window_secs: u64,
        outage_policy: StoreOutagePolicy,
    ) -> Self {
        Self {
            store,
            limit,
            window_secs: window_secs.max(1),
            outage_policy,
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn bucket_key(&self, caller: &CallerIdentity, unix_secs: u64) -> String {
        format!(
            "{}:{}:{}",
            KEY_PREFIX,
            caller.as_str(),
            unix_secs / self.window_secs
        )
    }

    pub async fn admit(&self, caller: &CallerIdentity) -> RateDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.admit_at(caller, now).await
    }

    /// Counts a call made at `unix_secs` against the caller's bucket.
    pub async fn admit_at(&self, caller: &CallerIdentity, unix_secs: u64) -> RateDecision {
        let key = self.bucket_key(caller, unix_secs);

        match self
            .store
            .increment_with_expiry(&key, self.window_secs)
            .await
        {
            Ok(window) if window.count > self.limit => {
                let retry_after_secs = window.ttl_secs.clamp(1, self.window_secs);
                tracing::info!(
                    caller = %caller,
                    count = window.count,
                    limit = self.limit,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                RateDecision::Rejected {
                    limit: self.limit,
                    retry_after_secs,
                }
            }
            Ok(window) => RateDecision::Allowed {
                limit: self.limit,
                remaining: Some(self.limit - window.count),
            },
            Err(err) => {
                let degraded = SummarizerError::from(err);
                match self.outage_policy {
                    StoreOutagePolicy::FailOpen => {
                        tracing::warn!(
                            caller = %caller,
                            backend = self.store.backend(),
                            category = degraded.category().as_str(),
                            error = %degraded,
                            "Rate limit store unavailable, admitting request"
                        );
                        RateDecision::Allowed {
                            limit: self.limit,
                            remaining: None,
                        }
                    }
                    StoreOutagePolicy::FailClosed => {
                        tracing::warn!(
                            caller = %caller,
                            backend = self.store.backend(),
                            category = degraded.category().as_str(),
                            error = %degraded,
                            "Rate limit store unavailable, rejecting request"
                        );
                        RateDecision::Rejected {
                            limit: self.limit,
                            retry_after_secs: self.window_secs,
                        }
                    }
                }
            }
        }
    }
}
