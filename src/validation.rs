use serde::Deserialize;
use std::collections::HashSet;
use validator::Validate;

use crate::error::SummarizerError;
use crate::model::{
    Language, SummarizeRequest, Tone, MAX_SUMMARY_TOKENS, MAX_TEXT_LENGTH, MIN_SUMMARY_TOKENS,
    MIN_TEXT_LENGTH, MIN_WORD_COUNT,
};

pub const DEFAULT_MAX_TOKENS: u32 = 100;
const MIN_DISTINCT_CHARS: usize = 3;

/// Raw `POST /v1/summarize` body, before validation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SummarizeBody {
    #[validate(length(
        min = 10,
        max = 50000,
        message = "text must be between 10 and 50000 characters"
    ))]
    pub text: String,

    #[serde(default)]
    pub lang: Option<String>,

    #[validate(range(min = 10, max = 500, message = "max_tokens must be between 10 and 500"))]
    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub tone: Option<String>,
}

/// Turns caller input into a [`SummarizeRequest`] the pipeline can trust.
pub struct RequestValidator;

impl RequestValidator {
    pub fn validate(body: SummarizeBody) -> Result<SummarizeRequest, SummarizerError> {
        let body = SummarizeBody {
            text: body.text.trim().to_string(),
            ..body
        };

        body.validate()
            .map_err(|errors| SummarizerError::Validation(errors.to_string()))?;

        Self::validate_text_content(&body.text)?;

        let lang = match body.lang.as_deref() {
            None => Language::Auto,
            Some(raw) => raw
                .parse::<Language>()
                .map_err(SummarizerError::Validation)?,
        };
        let tone = match body.tone.as_deref() {
            None => Tone::Neutral,
            Some(raw) => raw.parse::<Tone>().map_err(SummarizerError::Validation)?,
        };
        let max_tokens = body.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        Self::validate_max_tokens(max_tokens)?;

        Ok(SummarizeRequest::new(body.text, lang, max_tokens, tone))
    }

    /// Content-quality rules on already trimmed text.
    pub fn validate_text_content(text: &str) -> Result<(), SummarizerError> {
        let length = text.chars().count() as u64;
        if !(MIN_TEXT_LENGTH..=MAX_TEXT_LENGTH).contains(&length) {
            return Err(SummarizerError::Validation(format!(
                "text must be between {} and {} characters",
                MIN_TEXT_LENGTH, MAX_TEXT_LENGTH
            )));
        }

        if text.split_whitespace().count() < MIN_WORD_COUNT {
            return Err(SummarizerError::Validation(format!(
                "text must contain at least {} words",
                MIN_WORD_COUNT
            )));
        }

        // Case-folded, whitespace included.
        let distinct: HashSet<char> = text.chars().flat_map(char::to_lowercase).collect();
        if distinct.len() < MIN_DISTINCT_CHARS {
            return Err(SummarizerError::Validation(
                "text must contain meaningful content".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_max_tokens(max_tokens: u32) -> Result<(), SummarizerError> {
        if !(MIN_SUMMARY_TOKENS..=MAX_SUMMARY_TOKENS).contains(&max_tokens) {
            return Err(SummarizerError::Validation(format!(
                "max_tokens must be between {} and {}",
                MIN_SUMMARY_TOKENS, MAX_SUMMARY_TOKENS
            )));
        }
        Ok(())
    }
}
