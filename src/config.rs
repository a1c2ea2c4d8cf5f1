use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::pipeline::retry::RetryPolicy;
use crate::rate_limiter::StoreOutagePolicy;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:8000")]
    pub bind_addr: SocketAddr,

    /// Comma-separated list of accepted API keys
    #[envconfig(from = "API_KEYS")]
    pub api_keys: String,

    /// Credential for the Gemini generation API
    #[envconfig(from = "GEMINI_API_KEY")]
    pub gemini_api_key: String,

    #[envconfig(from = "GEMINI_MODEL", default = "gemini-1.5-flash")]
    pub gemini_model: String,

    #[envconfig(
        from = "GEMINI_BASE_URL",
        default = "https://generativelanguage.googleapis.com"
    )]
    pub gemini_base_url: String,

    /// Redis connection URL; empty selects the in-process store
    #[envconfig(from = "REDIS_URL", default = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Timeout for a single shared store operation
    #[envconfig(from = "STORE_TIMEOUT_MS", default = "250")]
    pub store_timeout_ms: u64,

    #[envconfig(from = "ENABLE_RATE_LIMIT", default = "true")]
    pub enable_rate_limit: bool,

    #[envconfig(from = "RATE_LIMIT_PER_WINDOW", default = "100")]
    pub rate_limit_per_window: u64,

    #[envconfig(from = "RATE_LIMIT_WINDOW_SECS", default = "60")]
    pub rate_limit_window_secs: u64,

    /// What the rate limiter does when the store is unreachable.
    /// Deliberately has no default.
    #[envconfig(from = "RATE_LIMIT_STORE_POLICY")]
    pub rate_limit_store_policy: StoreOutagePolicy,

    #[envconfig(from = "CACHE_TTL_SECONDS", default = "3600")]
    pub cache_ttl_seconds: u64,

    /// Overall deadline of one summarization request
    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "10000")]
    pub request_timeout_ms: u64,

    /// Timeout of a single generation attempt
    #[envconfig(from = "LLM_TIMEOUT_MS", default = "8000")]
    pub llm_timeout_ms: u64,

    /// Part of the request deadline reserved for fallback and evaluation
    #[envconfig(from = "FALLBACK_HEADROOM_MS", default = "1000")]
    pub fallback_headroom_ms: u64,

    #[envconfig(from = "RETRY_MAX_ATTEMPTS", default = "3")]
    pub retry_max_attempts: u32,

    #[envconfig(from = "RETRY_BASE_DELAY_MS", default = "500")]
    pub retry_base_delay_ms: u64,

    #[envconfig(from = "RETRY_MAX_DELAY_MS", default = "5000")]
    pub retry_max_delay_ms: u64,

    #[envconfig(from = "RETRY_JITTER_MS", default = "300")]
    pub retry_jitter_ms: u64,

    #[envconfig(from = "ENABLE_FALLBACK", default = "true")]
    pub enable_fallback: bool,

    #[envconfig(from = "ENABLE_AUTO_EVALUATION", default = "true")]
    pub enable_auto_evaluation: bool,

    #[envconfig(
        from = "EVALUATION_MODEL",
        default = "sentence-transformers/all-MiniLM-L6-v2"
    )]
    pub evaluation_model: String,

    /// Feature-extraction endpoint; empty selects the local hashing embedder
    #[envconfig(from = "EVALUATION_EMBEDDING_URL", default = "")]
    pub evaluation_embedding_url: String,

    #[envconfig(from = "EVALUATION_API_KEY", default = "")]
    pub evaluation_api_key: String,

    #[envconfig(from = "EVALUATION_TIMEOUT_MS", default = "2000")]
    pub evaluation_timeout_ms: u64,

    #[envconfig(from = "HEALTH_CHECK_TIMEOUT_MS", default = "2000")]
    pub health_check_timeout_ms: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    /// Parsed, trimmed API keys
    pub fn api_key_list(&self) -> Vec<String> {
        self.api_keys
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn uses_redis(&self) -> bool {
        !self.redis_url.trim().is_empty()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(self.retry_max_attempts)
            .base_delay(Duration::from_millis(self.retry_base_delay_ms))
            .max_delay(Duration::from_millis(self.retry_max_delay_ms))
            .jitter(Duration::from_millis(self.retry_jitter_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn fallback_headroom(&self) -> Duration {
        Duration::from_millis(self.fallback_headroom_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}
