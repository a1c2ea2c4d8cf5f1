//! Local extractive summarizer used when the provider cannot answer.
//!
//! Sentences are ranked with TextRank: a similarity graph over sentences,
//! scored by weighted PageRank. The top sentences are emitted in their
//! original order. The summarizer is total for non-empty input and makes
//! no external calls.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::model::{SummarizeRequest, Tone, TokenUsage, FALLBACK_MODEL_PREFIX};
use crate::provider::{Generation, CHARS_PER_TOKEN};

const DAMPING: f64 = 0.85;
const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-6;
const SALIENCE_EPSILON: f64 = 1e-9;

/// Sentences past this index are not ranked, which keeps the dense
/// similarity graph bounded for maximum-length input.
pub const MAX_RANKED_SENTENCES: usize = 400;

pub const MIN_SENTENCES: usize = 1;
pub const MAX_SENTENCES: usize = 8;

static WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("word regex is valid"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "in", "is", "it", "its", "of", "on", "or", "she", "that", "the", "their",
    "them", "they", "this", "to", "was", "were", "which", "will", "with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMethod {
    TextRank,
    /// Ranking found nothing to distinguish; the leading sentences were used.
    Lead,
}

impl RankingMethod {
    pub fn model_id(&self) -> String {
        match self {
            RankingMethod::TextRank => format!("{}textrank", FALLBACK_MODEL_PREFIX),
            RankingMethod::Lead => format!("{}lead", FALLBACK_MODEL_PREFIX),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractiveSummary {
    pub sentences: Vec<String>,
    pub method: RankingMethod,
}

impl ExtractiveSummary {
    pub fn render(&self, tone: Tone) -> String {
        match tone {
            Tone::Bullet => self
                .sentences
                .iter()
                .map(|s| format!("• {}", s))
                .collect::<Vec<_>>()
                .join("\n"),
            Tone::Neutral | Tone::Concise => self.sentences.join(" "),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSummarizer;

impl FallbackSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Summarizes a request into a result marked as fallback output.
    pub fn summarize_request(&self, request: &SummarizeRequest) -> Generation {
        let budget = sentence_budget(&request.text, request.max_tokens);
        let extract = self.summarize(&request.text, budget);
        let summary = extract.render(request.tone);

        Generation {
            usage: TokenUsage::new(word_count(&request.text), word_count(&summary)),
            model: extract.method.model_id(),
            summary,
        }
    }

    pub fn summarize(&self, text: &str, sentence_budget: usize) -> ExtractiveSummary {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return ExtractiveSummary {
                sentences: vec![text.trim().to_string()],
                method: RankingMethod::Lead,
            };
        }

        let candidates = &sentences[..sentences.len().min(MAX_RANKED_SENTENCES)];
        let budget = sentence_budget.clamp(MIN_SENTENCES, MAX_SENTENCES).min(candidates.len());
        let scores = rank(candidates);

        let (selected, method) = match scores {
            Some(scores) => (top_in_order(&scores, budget), RankingMethod::TextRank),
            None => ((0..budget).collect(), RankingMethod::Lead),
        };

        ExtractiveSummary {
            sentences: selected.into_iter().map(|i| sentences[i].clone()).collect(),
            method,
        }
    }
}

/// Sentence count whose estimated token size fits `max_tokens`.
pub fn sentence_budget(text: &str, max_tokens: u32) -> usize {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return MIN_SENTENCES;
    }
    let chars = text.chars().count() as f64;
    let tokens_per_sentence = (chars / sentences.len() as f64 / CHARS_PER_TOKEN as f64).max(1.0);
    let target = (max_tokens as f64 / tokens_per_sentence) as usize;
    target
        .clamp(MIN_SENTENCES, MAX_SENTENCES)
        .min(sentences.len())
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

fn is_cjk_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

/// Splits on terminators followed by whitespace or end of text. CJK full
/// stops end a sentence without needing whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let end = idx + c.len_utf8();
        let boundary = match chars.peek() {
            None => true,
            Some(&(_, next)) if is_terminator(next) => false,
            Some(&(_, next)) => next.is_whitespace() || is_cjk_terminator(c),
        };
        if boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn content_words(sentence: &str) -> HashSet<String> {
    WORD_REGEX
        .find_iter(sentence)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let common = a.intersection(b).count();
    if common == 0 {
        return 0.0;
    }
    let norm = (a.len() as f64).ln() + (b.len() as f64).ln();
    if norm <= f64::EPSILON {
        1.0
    } else {
        common as f64 / norm
    }
}

/// PageRank scores per sentence, or `None` when no sentence stands out.
fn rank(sentences: &[String]) -> Option<Vec<f64>> {
    let n = sentences.len();
    if n < 2 {
        return None;
    }

    let words: Vec<HashSet<String>> = sentences.iter().map(|s| content_words(s)).collect();
    let mut weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let w = similarity(&words[i], &words[j]);
            weights[i][j] = w;
            weights[j][i] = w;
        }
    }
    let out_weight: Vec<f64> = weights.iter().map(|row| row.iter().sum()).collect();

    let mut scores = vec![1.0; n];
    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![1.0 - DAMPING; n];
        for (i, slot) in next.iter_mut().enumerate() {
            let incoming: f64 = (0..n)
                .filter(|&j| j != i && out_weight[j] > 0.0)
                .map(|j| weights[j][i] / out_weight[j] * scores[j])
                .sum();
            *slot += DAMPING * incoming;
        }
        let delta = next
            .iter()
            .zip(&scores)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        scores = next;
        if delta < TOLERANCE {
            break;
        }
    }

    let max = scores.iter().cloned().fold(f64::MIN, f64::max);
    let min = scores.iter().cloned().fold(f64::MAX, f64::min);
    if max - min <= SALIENCE_EPSILON {
        None
    } else {
        Some(scores)
    }
}

/// Indices of the `k` best scores, returned in document order. Ties keep
/// the earlier sentence.
fn top_in_order(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut picked: Vec<usize> = order.into_iter().take(k).collect();
    picked.sort_unstable();
    picked
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count().min(u32::MAX as usize) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Language;

    const ARTICLE: &str = "Solar power is growing quickly across the world. \
        Cheap solar panels have made solar power the cheapest source of electricity. \
        My neighbour owns a red bicycle. \
        Governments now plan grids around solar power and storage. \
        The weather was pleasant on Tuesday.";

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("First one. Second one! Third? Wait... done");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third?", "Wait...", "done"]
        );
        assert_eq!(split_sentences("3.14 is pi. Yes."), vec!["3.14 is pi.", "Yes."]);
        assert_eq!(split_sentences("今日は晴れ。明日は雨。"), vec!["今日は晴れ。", "明日は雨。"]);
        assert_eq!(split_sentences("no terminator here"), vec!["no terminator here"]);
    }

    #[test]
    fn test_central_sentences_win_and_keep_document_order() {
        let extract = FallbackSummarizer::new().summarize(ARTICLE, 2);
        assert_eq!(extract.method, RankingMethod::TextRank);
        assert_eq!(extract.sentences.len(), 2);
        assert!(extract
            .sentences
            .iter()
            .all(|s| s.to_lowercase().contains("solar")));
        assert!(!extract.sentences.iter().any(|s| s.contains("bicycle")));

        let positions: Vec<usize> = extract
            .sentences
            .iter()
            .map(|s| ARTICLE.find(s.as_str()).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicate_sentences_fall_back_to_lead() {
        let text = "Same words here. Same words here. Same words here. Same words here.";
        let extract = FallbackSummarizer::new().summarize(text, 2);
        assert_eq!(extract.method, RankingMethod::Lead);
        assert_eq!(extract.sentences, vec!["Same words here.", "Same words here."]);
    }

    #[test]
    fn test_single_run_on_text_is_returned() {
        let text = "AAAAAAAAAAAAAAAAAAAA";
        let extract = FallbackSummarizer::new().summarize(text, 3);
        assert_eq!(extract.sentences, vec![text.to_string()]);
        assert_eq!(extract.method, RankingMethod::Lead);
    }

    #[test]
    fn test_maximum_length_input_ranks_a_bounded_prefix() {
        let mut text = String::new();
        let mut i = 0;
        while text.len() < 50_000 {
            text.push_str(&format!("Topic {} covers item {}. ", i % 37, i));
            i += 1;
        }
        text.truncate(50_000);
        let sentences = split_sentences(&text);
        assert!(sentences.len() > MAX_RANKED_SENTENCES);

        let started = std::time::Instant::now();
        let extract = FallbackSummarizer::new().summarize(&text, MAX_SENTENCES);
        let elapsed = started.elapsed();

        assert_eq!(extract.method, RankingMethod::TextRank);
        assert_eq!(extract.sentences.len(), MAX_SENTENCES);
        let ranked = &sentences[..MAX_RANKED_SENTENCES];
        assert!(extract.sentences.iter().all(|s| ranked.contains(s)));
        assert!(elapsed < std::time::Duration::from_secs(5), "took {:?}", elapsed);
    }

    #[test]
    fn test_budget_is_clamped() {
        assert_eq!(sentence_budget("One. Two. Three.", 10), 3);
        assert_eq!(sentence_budget(ARTICLE, 10), 1);
        let long: String = (0..40).map(|i| format!("Sentence number {}. ", i)).collect();
        assert_eq!(sentence_budget(&long, 500), MAX_SENTENCES);
    }

    #[test]
    fn test_bullet_rendering_and_model_marker() {
        let request = SummarizeRequest::new(ARTICLE, Language::En, 40, Tone::Bullet);
        let generation = FallbackSummarizer::new().summarize_request(&request);
        assert!(generation.model.starts_with(FALLBACK_MODEL_PREFIX));
        assert!(generation.summary.lines().all(|l| l.starts_with("• ")));
        assert!(generation.usage.prompt_tokens > generation.usage.completion_tokens);
    }
}
