//! Value types shared by the pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_TEXT_LENGTH: u64 = 10;
pub const MAX_TEXT_LENGTH: u64 = 50_000;
pub const MIN_WORD_COUNT: usize = 5;
pub const MIN_SUMMARY_TOKENS: u32 = 10;
pub const MAX_SUMMARY_TOKENS: u32 = 500;

/// Target language of a summary. `Auto` keeps the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Auto,
    En,
    Es,
    Fr,
    De,
    It,
    Pt,
    Ru,
    Zh,
    Ja,
    Ko,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::Auto,
        Language::En,
        Language::Es,
        Language::Fr,
        Language::De,
        Language::It,
        Language::Pt,
        Language::Ru,
        Language::Zh,
        Language::Ja,
        Language::Ko,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Auto => "auto",
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::It => "it",
            Language::Pt => "pt",
            Language::Ru => "ru",
            Language::Zh => "zh",
            Language::Ja => "ja",
            Language::Ko => "ko",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Language::ALL
            .iter()
            .copied()
            .find(|lang| lang.code() == wanted)
            .ok_or_else(|| {
                let supported: Vec<&str> = Language::ALL.iter().map(|l| l.code()).collect();
                format!(
                    "unsupported language '{}', expected one of: {}",
                    s,
                    supported.join(", ")
                )
            })
    }
}

/// Summary style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Concise,
    Bullet,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Neutral, Tone::Concise, Tone::Bullet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Concise => "concise",
            Tone::Bullet => "bullet",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Tone::ALL
            .iter()
            .copied()
            .find(|tone| tone.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unsupported tone '{}', expected one of: neutral, concise, bullet",
                    s
                )
            })
    }
}

/// A validated summarization request.
///
/// Only [`crate::validation::RequestValidator`] builds these from caller
/// input; the pipeline trusts every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizeRequest {
    pub text: String,
    pub lang: Language,
    pub max_tokens: u32,
    pub tone: Tone,
}

impl SummarizeRequest {
    pub fn new(text: impl Into<String>, lang: Language, max_tokens: u32, tone: Tone) -> Self {
        Self {
            text: text.into(),
            lang,
            max_tokens,
            tone,
        }
    }
}

/// Opaque, stable identifier for an authenticated caller.
///
/// Derived from a digest of the credential; the credential itself never
/// leaves [`crate::auth::KeyStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Quality metrics for a produced summary. Every field is within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub rouge_1_f: f64,
    pub rouge_2_f: f64,
    pub rouge_l_f: f64,
    pub semantic_similarity: f64,
    pub compression_ratio: f64,
    pub quality_score: f64,
}

/// Marker prefix of every model identifier produced by the local fallback.
pub const FALLBACK_MODEL_PREFIX: &str = "fallback/";

/// Final output of the pipeline, created once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub usage: TokenUsage,
    pub model: String,
    pub latency_ms: u64,
    pub evaluation: Option<EvaluationMetrics>,
    pub cached: bool,
}

impl SummaryResult {
    pub fn generated(
        summary: String,
        usage: TokenUsage,
        model: String,
        latency_ms: u64,
        evaluation: Option<EvaluationMetrics>,
    ) -> Self {
        Self {
            summary,
            usage,
            model,
            latency_ms,
            evaluation,
            cached: false,
        }
    }

    /// Rebuilds a stored result as a cache hit served in `latency_ms`.
    pub fn from_cache(stored: SummaryResult, latency_ms: u64) -> Self {
        Self {
            latency_ms,
            cached: true,
            ..stored
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.model.starts_with(FALLBACK_MODEL_PREFIX)
    }
}
