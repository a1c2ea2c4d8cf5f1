//! Google Gemini `generateContent` REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    estimate_tokens, Generation, GenerationProvider, GenerationRequest, ProviderError,
};
use crate::model::{Language, Tone, TokenUsage};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const TEMPERATURE: f32 = 0.3;
const TOP_P: f32 = 0.8;
const TOP_K: u32 = 40;
const MAX_OUTPUT_TOKENS: u32 = 512;

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            http,
        })
    }

    fn model_url(&self) -> String {
        format!("{}/v1beta/models/{}", self.base_url, self.model)
    }

    async fn error_from_response(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = response
            .json::<ErrorEnvelope>()
            .await
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", status));

        classify_status(status, message, retry_after)
    }
}

/// Maps a non-success Gemini status to a provider error.
fn classify_status(status: u16, message: String, retry_after: Option<Duration>) -> ProviderError {
    match status {
        // Gemini reports a bad key as 400 INVALID_ARGUMENT.
        400 if message.to_ascii_lowercase().contains("api key") => ProviderError::Unauthorized,
        400 => ProviderError::InvalidInput(message),
        401 | 403 => ProviderError::Unauthorized,
        429 => ProviderError::RateLimited { retry_after },
        _ => ProviderError::Api { status, message },
    }
}

pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut instruction = match request.tone {
        Tone::Neutral => {
            "Provide a balanced, objective summary that captures the main points".to_string()
        }
        Tone::Concise => {
            "Create a very concise, brief summary focusing only on key information".to_string()
        }
        Tone::Bullet => {
            "Generate a bullet-point summary with clear, structured points".to_string()
        }
    };

    if request.lang != Language::Auto {
        instruction.push_str(&format!(" in {}", request.lang.code()));
    }
    instruction.push_str(&format!(
        ". Keep the summary under {} tokens.",
        request.max_tokens
    ));

    format!(
        "{}\n\nText to summarize:\n{}\n\nSummary:",
        instruction, request.text
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError> {
        let prompt = build_prompt(request);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
                temperature: TEMPERATURE,
                top_p: TOP_P,
                top_k: TOP_K,
            },
        };

        let response = self
            .http
            .post(format!("{}:generateContent", self.model_url()))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Http(format!("malformed response: {}", e)))?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::Blocked(reason));
        }

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        let summary = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
            .trim()
            .to_string();

        if summary.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_default();
            return match reason.as_str() {
                "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
                    Err(ProviderError::Blocked(reason.clone()))
                }
                _ => Err(ProviderError::EmptyResponse),
            };
        }

        let usage = match parsed.usage_metadata {
            Some(meta) => TokenUsage::new(meta.prompt_token_count, meta.candidates_token_count),
            None => TokenUsage::new(estimate_tokens(&prompt), estimate_tokens(&summary)),
        };

        Ok(Generation {
            summary,
            usage,
            model: parsed.model_version.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .http
            .get(self.model_url())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }
}
