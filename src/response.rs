use serde::{Deserialize, Serialize};

use crate::model::{EvaluationMetrics, SummaryResult, TokenUsage};

/// Body of a successful `POST /v1/summarize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
    pub usage: TokenUsage,
    pub model: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationMetrics>,
    pub cached: bool,
}

impl From<SummaryResult> for SummarizeResponse {
    fn from(result: SummaryResult) -> Self {
        Self {
            summary: result.summary,
            usage: result.usage,
            model: result.model,
            latency_ms: result.latency_ms,
            evaluation: result.evaluation,
            cached: result.cached,
        }
    }
}
