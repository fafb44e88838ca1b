//! Memoized text analysis
//!
//! Embeddings, sentiment and summaries are expensive and deterministic
//! enough to share across requests, so each goes through its own
//! `CachedCall` namespace in the process-wide cache.

use std::sync::Arc;
use std::time::Duration;

use mosaic_cache::{CachedCall, ExpiringCache};
use tracing::debug;

use crate::capabilities::{Embedder, Sentiment, SentimentClassifier, Summarizer};
use crate::retrieval::EMBEDDING_NAMESPACE;

pub const SENTIMENT_NAMESPACE: &str = "text-sentiment";
pub const SUMMARIZATION_NAMESPACE: &str = "text-summarization";

/// TTL for memoized text analysis
pub const ANALYSIS_TTL: Duration = Duration::from_secs(3600);

/// Rough characters-per-token ratio used by the chunker
const CHARS_PER_TOKEN: usize = 4;

pub struct TextAnalyzer {
    embedder: Arc<dyn Embedder>,
    sentiment: Arc<dyn SentimentClassifier>,
    summarizer: Arc<dyn Summarizer>,
    embeddings: CachedCall,
    sentiments: CachedCall,
    summaries: CachedCall,
}

impl TextAnalyzer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        sentiment: Arc<dyn SentimentClassifier>,
        summarizer: Arc<dyn Summarizer>,
        cache: Arc<ExpiringCache<serde_json::Value>>,
    ) -> Self {
        let memo = |namespace: &str| CachedCall::new(Arc::clone(&cache), namespace).with_ttl(ANALYSIS_TTL);
        Self {
            embedder,
            sentiment,
            summarizer,
            embeddings: memo(EMBEDDING_NAMESPACE),
            sentiments: memo(SENTIMENT_NAMESPACE),
            summaries: memo(SUMMARIZATION_NAMESPACE),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embeddings
            .call("embed_text", &(text,), || self.embedder.embed_text(text))
            .await
    }

    pub async fn sentiment(&self, text: &str) -> anyhow::Result<Sentiment> {
        self.sentiments
            .call("classify", &(text,), || self.sentiment.classify(text))
            .await
    }

    pub async fn summarize(&self, text: &str, max_length: usize) -> anyhow::Result<String> {
        debug!("Summarizing {} chars to {} words", text.len(), max_length);
        self.summaries
            .call("summarize", &(text, max_length), || {
                self.summarizer.summarize(text, max_length)
            })
            .await
    }
}

/// Split `text` into sentence-aligned chunks of roughly `max_tokens`
/// tokens each.
///
/// A single sentence longer than the budget becomes its own chunk. Every
/// chunk ends with a period.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    let flattened = text.replace('\n', " ");
    let sentences = flattened
        .split(". ")
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut tokens = 0;

    for sentence in sentences {
        let sentence_tokens = (sentence.chars().count() / CHARS_PER_TOKEN).max(1);

        if tokens + sentence_tokens > max_tokens && !current.is_empty() {
            chunks.push(finish_chunk(&current));
            current.clear();
            tokens = 0;
        }
        current.push(sentence);
        tokens += sentence_tokens;
    }

    if !current.is_empty() {
        chunks.push(finish_chunk(&current));
    }
    chunks
}

fn finish_chunk(sentences: &[&str]) -> String {
    let joined = sentences.join(". ");
    let joined = joined.trim();
    if joined.ends_with(['.', '!', '?']) {
        joined.to_string()
    } else {
        format!("{}.", joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{ExtractiveSummarizer, HashingEmbedder, LexiconSentiment};
    use async_trait::async_trait;
    use mosaic_cache::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSentiment(AtomicUsize);

    #[async_trait]
    impl SentimentClassifier for CountingSentiment {
        async fn classify(&self, _text: &str) -> anyhow::Result<Sentiment> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Sentiment {
                label: "POSITIVE".to_string(),
                score: 0.9,
            })
        }
    }

    fn cache() -> Arc<ExpiringCache<serde_json::Value>> {
        Arc::new(ExpiringCache::new(CacheConfig::default()))
    }

    #[tokio::test]
    async fn test_sentiment_is_memoized() {
        let classifier = Arc::new(CountingSentiment::default());
        let analyzer = TextAnalyzer::new(
            Arc::new(HashingEmbedder::new(8)),
            classifier.clone(),
            Arc::new(ExtractiveSummarizer),
            cache(),
        );

        for _ in 0..3 {
            let sentiment = analyzer.sentiment("great product").await.unwrap();
            assert_eq!(sentiment.label, "POSITIVE");
        }
        analyzer.sentiment("another text").await.unwrap();

        assert_eq!(classifier.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_namespaces_are_written() {
        let shared = cache();
        let analyzer = TextAnalyzer::new(
            Arc::new(HashingEmbedder::new(8)),
            Arc::new(LexiconSentiment),
            Arc::new(ExtractiveSummarizer),
            Arc::clone(&shared),
        );

        analyzer.embed("hello").await.unwrap();
        analyzer.summarize("One. Two.", 10).await.unwrap();

        let stats = shared.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(analyzer.dimension(), 8);
    }

    #[test]
    fn test_chunk_text_groups_sentences() {
        // Each sentence is 8 chars -> 2 tokens
        let text = "Aaaaaaaa. Bbbbbbbb. Cccccccc. Dddddddd";
        let chunks = chunk_text(text, 4);
        assert_eq!(chunks, vec!["Aaaaaaaa. Bbbbbbbb.", "Cccccccc. Dddddddd."]);
    }

    #[test]
    fn test_chunk_text_keeps_existing_terminator() {
        let chunks = chunk_text("First line.\nSecond line.", 500);
        assert_eq!(chunks, vec!["First line. Second line."]);
    }

    #[test]
    fn test_chunk_text_oversized_sentence() {
        let long = "x".repeat(400);
        let chunks = chunk_text(&format!("short. {}", long), 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "short.");
        assert!(chunks[1].starts_with("xxx"));
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("   ", 100).is_empty());
    }
}
