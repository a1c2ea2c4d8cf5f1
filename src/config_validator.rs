use crate::config::Config;
use crate::error::SummarizerError;

const MIN_API_KEY_LENGTH: usize = 8;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates every section of a loaded configuration
    pub fn validate(config: &Config) -> Result<(), SummarizerError> {
        Self::validate_api_keys(&config.api_key_list())?;
        if config.gemini_api_key.trim().is_empty() {
            return Err(SummarizerError::Configuration(
                "GEMINI_API_KEY cannot be empty".to_string(),
            ));
        }
        if config.uses_redis() {
            Self::validate_redis_url(&config.redis_url)?;
        }
        Self::validate_rate_limit(config.rate_limit_per_window, config.rate_limit_window_secs)?;
        Self::validate_cache_ttl(config.cache_ttl_seconds)?;
        Self::validate_timeouts(
            config.llm_timeout_ms,
            config.request_timeout_ms,
            config.fallback_headroom_ms,
        )?;
        Self::validate_retry(
            config.retry_max_attempts,
            config.retry_base_delay_ms,
            config.retry_max_delay_ms,
        )?;
        Self::validate_log_level(&config.log_level)?;
        Ok(())
    }

    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), SummarizerError> {
        if url.is_empty() {
            return Err(SummarizerError::Configuration(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(SummarizerError::Configuration(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates the accepted API keys
    pub fn validate_api_keys(keys: &[String]) -> Result<(), SummarizerError> {
        if keys.is_empty() {
            return Err(SummarizerError::Configuration(
                "At least one API key must be provided".to_string(),
            ));
        }

        if let Some(short) = keys.iter().find(|key| key.len() < MIN_API_KEY_LENGTH) {
            let prefix: String = short.chars().take(4).collect();
            return Err(SummarizerError::Configuration(format!(
                "API key '{}...' is too short (minimum {} characters)",
                prefix, MIN_API_KEY_LENGTH
            )));
        }

        Ok(())
    }

    /// Validates rate limit parameters
    pub fn validate_rate_limit(limit: u64, window_secs: u64) -> Result<(), SummarizerError> {
        if limit == 0 || limit > 10_000 {
            return Err(SummarizerError::Configuration(
                "Rate limit must be between 1 and 10000 requests per window".to_string(),
            ));
        }

        if window_secs == 0 {
            return Err(SummarizerError::Configuration(
                "Rate limit window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_cache_ttl(ttl_secs: u64) -> Result<(), SummarizerError> {
        if !(60..=86_400).contains(&ttl_secs) {
            return Err(SummarizerError::Configuration(
                "Cache TTL must be between 60 and 86400 seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// The provider timeout must fit inside the request deadline with
    /// the fallback headroom still available.
    pub fn validate_timeouts(
        provider_ms: u64,
        request_ms: u64,
        headroom_ms: u64,
    ) -> Result<(), SummarizerError> {
        if provider_ms == 0 || request_ms == 0 {
            return Err(SummarizerError::Configuration(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if provider_ms.saturating_add(headroom_ms) > request_ms {
            return Err(SummarizerError::Configuration(format!(
                "LLM timeout ({}ms) plus fallback headroom ({}ms) must not exceed request timeout ({}ms)",
                provider_ms, headroom_ms, request_ms
            )));
        }

        Ok(())
    }

    pub fn validate_retry(
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Result<(), SummarizerError> {
        if !(1..=10).contains(&max_attempts) {
            return Err(SummarizerError::Configuration(
                "Retry attempts must be between 1 and 10".to_string(),
            ));
        }

        if base_delay_ms > max_delay_ms {
            return Err(SummarizerError::Configuration(
                "Retry base delay must not exceed the maximum delay".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_log_level(level: &str) -> Result<(), SummarizerError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(SummarizerError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                level, valid_levels
            )));
        }

        Ok(())
    }
}
