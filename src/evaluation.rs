//! Summary quality metrics: n-gram overlap, embedding similarity and
//! compression, combined into one score.
//!
//! The embedding backend is built on first use. Any failure while embedding
//! fails the whole evaluation; the pipeline then omits the block.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::model::EvaluationMetrics;

const ROUGE_L_WEIGHT: f64 = 0.30;
const SEMANTIC_WEIGHT: f64 = 0.40;
const COMPRESSION_WEIGHT: f64 = 0.30;
const IDEAL_COMPRESSION_RATIO: f64 = 0.20;
const COMPRESSION_TOLERANCE: f64 = 0.05;

const HASHING_DIMENSIONS: usize = 256;

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("token regex is valid"));

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("embedding backend failed: {0}")]
    Embedding(String),

    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("nothing to evaluate: {0}")]
    EmptyInput(&'static str),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EvaluationError>;
}

/// Deterministic bag-of-words embedding: each lowercase token adds ±1 to a
/// bucket chosen by its SHA-256 digest. Needs no model download.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASHING_DIMENSIONS];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u16::from_be_bytes([digest[0], digest[1]]) as usize % HASHING_DIMENSIONS;
            let sign = if digest[2] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EvaluationError> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

/// HuggingFace-style feature-extraction endpoint.
#[derive(Clone)]
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    api_key: String,
    http: Client,
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [&'a str],
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EvaluationError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvaluationError::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            http,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EvaluationError> {
        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.base_url, self.model
        );
        let mut request = self
            .http
            .post(&url)
            .json(&FeatureExtractionRequest { inputs: texts });
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EvaluationError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EvaluationError::Embedding(format!(
                "embedding endpoint returned {}",
                status
            )));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| EvaluationError::Embedding(format!("malformed embeddings: {}", e)))?;

        if vectors.len() != texts.len() {
            return Err(EvaluationError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub model: String,
    /// Empty selects [`HashingEmbedder`].
    pub embedding_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

pub struct QualityEvaluator {
    settings: EvaluatorSettings,
    backend: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl QualityEvaluator {
    pub fn new(settings: EvaluatorSettings) -> Self {
        Self {
            settings,
            backend: OnceCell::new(),
        }
    }

    /// Evaluator with a ready backend.
    pub fn with_embedder(embedder: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            settings: EvaluatorSettings {
                model: embedder.name().to_string(),
                embedding_url: String::new(),
                api_key: String::new(),
                timeout,
            },
            backend: OnceCell::new_with(Some(embedder)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.initialized()
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    async fn embedder(&self) -> Result<&Arc<dyn EmbeddingProvider>, EvaluationError> {
        self.backend
            .get_or_try_init(|| async {
                let backend: Arc<dyn EmbeddingProvider> = if self.settings.embedding_url.is_empty()
                {
                    Arc::new(HashingEmbedder)
                } else {
                    Arc::new(HttpEmbedder::new(
                        &self.settings.embedding_url,
                        &self.settings.model,
                        &self.settings.api_key,
                        self.settings.timeout,
                    )?)
                };
                tracing::info!(
                    backend = backend.name(),
                    model = %self.settings.model,
                    "Initialized evaluation embedder"
                );
                Ok::<_, EvaluationError>(backend)
            })
            .await
    }

    async fn semantic_similarity(&self, source: &str, summary: &str) -> Result<f64, EvaluationError> {
        let embedder = self.embedder().await?;
        let vectors = tokio::time::timeout(self.settings.timeout, embedder.embed(&[source, summary]))
            .await
            .map_err(|_| EvaluationError::Timeout(self.settings.timeout))??;

        match vectors.as_slice() {
            [a, b] => Ok(cosine(a, b).clamp(0.0, 1.0)),
            _ => Err(EvaluationError::Embedding(
                "embedding backend returned the wrong number of vectors".to_string(),
            )),
        }
    }

    pub async fn evaluate(
        &self,
        source: &str,
        summary: &str,
    ) -> Result<EvaluationMetrics, EvaluationError> {
        let source_tokens = tokenize(source);
        let summary_tokens = tokenize(summary);
        if source_tokens.is_empty() {
            return Err(EvaluationError::EmptyInput("source"));
        }
        if summary_tokens.is_empty() {
            return Err(EvaluationError::EmptyInput("summary"));
        }

        let rouge_1 = rouge_n(&source_tokens, &summary_tokens, 1);
        let rouge_2 = rouge_n(&source_tokens, &summary_tokens, 2);
        let rouge_l = rouge_l(&source_tokens, &summary_tokens);
        let semantic = self.semantic_similarity(source, summary).await?;
        let compression = compression_ratio(source, summary);
        let quality = quality_score(rouge_l, semantic, compression);

        Ok(EvaluationMetrics {
            rouge_1_f: round4(rouge_1),
            rouge_2_f: round4(rouge_2),
            rouge_l_f: round4(rouge_l),
            semantic_similarity: round4(semantic),
            compression_ratio: round4(compression),
            quality_score: round4(quality),
        })
    }

    /// Embeds a probe text through the backend.
    pub async fn health_check(&self) -> Result<(), EvaluationError> {
        let embedder = self.embedder().await?;
        let vectors = embedder.embed(&["health check"]).await?;
        if vectors.first().map_or(true, |v| v.is_empty()) {
            return Err(EvaluationError::Embedding("empty probe embedding".to_string()));
        }
        Ok(())
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn f1(overlap: f64, reference_len: usize, candidate_len: usize) -> f64 {
    if overlap == 0.0 || reference_len == 0 || candidate_len == 0 {
        return 0.0;
    }
    let precision = overlap / candidate_len as f64;
    let recall = overlap / reference_len as f64;
    2.0 * precision * recall / (precision + recall)
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// ROUGE-N F1 with clipped n-gram counts.
pub fn rouge_n(reference: &[String], candidate: &[String], n: usize) -> f64 {
    if reference.len() < n || candidate.len() < n {
        return 0.0;
    }
    let reference_counts = ngram_counts(reference, n);
    let candidate_counts = ngram_counts(candidate, n);
    let overlap: usize = candidate_counts
        .iter()
        .map(|(gram, count)| (*count).min(reference_counts.get(gram).copied().unwrap_or(0)))
        .sum();

    f1(
        overlap as f64,
        reference.len() + 1 - n,
        candidate.len() + 1 - n,
    )
}

/// ROUGE-L F1 over the longest common subsequence.
pub fn rouge_l(reference: &[String], candidate: &[String]) -> f64 {
    if reference.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    let mut previous = vec![0usize; candidate.len() + 1];
    let mut current = vec![0usize; candidate.len() + 1];
    for r in reference {
        for (j, c) in candidate.iter().enumerate() {
            current[j + 1] = if r == c {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    let lcs = previous[candidate.len()];
    f1(lcs as f64, reference.len(), candidate.len())
}

pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Summary words over source words, within [0, 1].
pub fn compression_ratio(source: &str, summary: &str) -> f64 {
    let source_words = source.split_whitespace().count();
    if source_words == 0 {
        return 0.0;
    }
    (summary.split_whitespace().count() as f64 / source_words as f64).clamp(0.0, 1.0)
}

/// 1.0 near the ideal ratio, falling linearly to 0 outside the tolerance.
pub fn compression_score(ratio: f64) -> f64 {
    let distance = (IDEAL_COMPRESSION_RATIO - ratio).abs();
    if distance <= COMPRESSION_TOLERANCE {
        1.0
    } else {
        (1.0 - (distance - COMPRESSION_TOLERANCE) / IDEAL_COMPRESSION_RATIO).max(0.0)
    }
}

pub fn quality_score(rouge_l: f64, semantic: f64, compression: f64) -> f64 {
    (ROUGE_L_WEIGHT * rouge_l
        + SEMANTIC_WEIGHT * semantic
        + COMPRESSION_WEIGHT * compression_score(compression))
    .clamp(0.0, 1.0)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
