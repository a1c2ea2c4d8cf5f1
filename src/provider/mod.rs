//! Primary generation capability.

use async_trait::async_trait;
use std::time::Duration;

use crate::model::{Language, SummarizeRequest, Tone, TokenUsage};

pub mod gemini;

pub use gemini::GeminiProvider;

/// Average characters per token, used when a backend reports no usage.
pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() / CHARS_PER_TOKEN).min(u32::MAX as usize) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Http(String),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider rate limit reached")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider rejected credentials")]
    Unauthorized,

    #[error("provider rejected input: {0}")]
    InvalidInput(String),

    #[error("provider returned no text")]
    EmptyResponse,

    #[error("provider blocked the content: {0}")]
    Blocked(String),
}

impl ProviderError {
    /// Transient failures that may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::Http(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::EmptyResponse => true,
            ProviderError::Api { status, .. } => *status >= 500 || *status == 408,
            ProviderError::Unauthorized
            | ProviderError::InvalidInput(_)
            | ProviderError::Blocked(_) => false,
        }
    }

    /// Errors caused by the request itself, reported to the caller as-is.
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, ProviderError::InvalidInput(_))
    }
}

/// Parameters handed to a provider for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub text: String,
    pub lang: Language,
    pub max_tokens: u32,
    pub tone: Tone,
}

impl From<&SummarizeRequest> for GenerationRequest {
    fn from(request: &SummarizeRequest) -> Self {
        Self {
            text: request.text.clone(),
            lang: request.lang,
            max_tokens: request.max_tokens,
            tone: request.tone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub summary: String,
    pub usage: TokenUsage,
    pub model: String,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Configured model identifier.
    fn model(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}
