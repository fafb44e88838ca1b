//! Similarity retrieval over the vector index

use std::sync::Arc;

use mosaic_cache::CachedCall;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capabilities::{
    Embedder, IndexMatch, Metadata, MetadataFilter, Modality, VectorIndex,
};
use crate::config::RetrievalConfig;
use crate::error::{PipelineError, Result};

/// Namespace for memoized text embeddings
pub const EMBEDDING_NAMESPACE: &str = "text-embeddings";

/// A retrieved document, normalized for the generator and the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Preview of the stored content
    pub content: String,
    pub metadata: Metadata,
    /// Higher is more relevant
    pub relevance_score: f32,
}

impl SourceDocument {
    /// Normalize a raw index match, truncating content to `preview_chars`
    pub fn from_match(raw: IndexMatch, preview_chars: usize) -> Self {
        Self {
            content: preview(&raw.content, preview_chars),
            metadata: raw.metadata,
            relevance_score: raw.score.unwrap_or(0.0),
        }
    }
}

fn preview(content: &str, limit: usize) -> String {
    match content.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
    embeddings: Option<CachedCall>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        info!("Retriever ready (k = {})", config.k);
        Self {
            embedder,
            index,
            config,
            embeddings: None,
        }
    }

    /// Memoize query embeddings through `cache`
    pub fn with_embedding_cache(mut self, cache: CachedCall) -> Self {
        self.embeddings = Some(cache.with_ttl(self.config.embedding_cache_ttl));
        self
    }

    pub fn k(&self) -> usize {
        self.config.k
    }

    /// Up to `k` text documents for `query`, most relevant first.
    ///
    /// Image, audio and video records share the index but are never
    /// returned here. An empty index yields an empty list. Embedding and index failures
    /// are returned as `PipelineError::Retrieval`.
    pub async fn retrieve(&self, query: &str, owner: Option<&str>) -> Result<Vec<SourceDocument>> {
        let vector = self
            .embed(query)
            .await
            .map_err(|e| PipelineError::retrieval(e.context("query embedding failed")))?;

        let filter = MetadataFilter::modality(Modality::Text).and_owner(owner);
        let matches = self
            .index
            .search(&vector, self.config.k, Some(&filter))
            .await
            .map_err(|e| PipelineError::retrieval(e.context("vector search failed")))?;

        let mut documents: Vec<SourceDocument> = matches
            .into_iter()
            .map(|raw| SourceDocument::from_match(raw, self.config.preview_chars))
            .collect();
        documents.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!("Retrieved {} documents for query", documents.len());
        Ok(documents)
    }

    async fn embed(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        match &self.embeddings {
            Some(cache) => {
                cache
                    .call("embed_text", &(query,), || self.embedder.embed_text(query))
                    .await
            }
            None => self.embedder.embed_text(query).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{HashingEmbedder, InMemoryVectorIndex, IndexRecord};
    use async_trait::async_trait;
    use mosaic_cache::{CacheConfig, ExpiringCache};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedIndex(Vec<IndexMatch>);

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn search(
            &self,
            _vector: &[f32],
            k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> anyhow::Result<Vec<IndexMatch>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }

        async fn insert(&self, _record: IndexRecord) -> anyhow::Result<String> {
            anyhow::bail!("read-only")
        }
    }

    struct CountingEmbedder(AtomicUsize);

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed_text(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }

        async fn embed_image(&self, _image: &[u8]) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("text only")
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed_text(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model not loaded")
        }

        async fn embed_image(&self, _image: &[u8]) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model not loaded")
        }
    }

    fn raw(content: &str, score: Option<f32>) -> IndexMatch {
        IndexMatch {
            content: content.to_string(),
            metadata: Metadata::new(),
            score,
        }
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
        // Multi-byte characters are cut on char boundaries
        assert_eq!(preview("héllo wörld", 4), "héll...");
    }

    #[test]
    fn test_missing_score_defaults_to_zero() {
        let doc = SourceDocument::from_match(raw("x", None), 200);
        assert_eq!(doc.relevance_score, 0.0);
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let retriever = Retriever::new(
            Arc::new(HashingEmbedder::new(32)),
            Arc::new(InMemoryVectorIndex::new()),
            RetrievalConfig::default(),
        );
        let documents = retriever.retrieve("anything", None).await.unwrap();
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_results_ordered_by_relevance() {
        let index = FixedIndex(vec![
            raw("low", Some(0.2)),
            raw("unscored", None),
            raw("high", Some(0.9)),
        ]);
        let retriever = Retriever::new(
            Arc::new(HashingEmbedder::new(8)),
            Arc::new(index),
            RetrievalConfig::default(),
        );

        let documents = retriever.retrieve("q", None).await.unwrap();
        let contents: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["high", "low", "unscored"]);
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let embedder = Arc::new(HashingEmbedder::new(32));
        let index = Arc::new(InMemoryVectorIndex::new());
        for owner in ["alice", "bob"] {
            let mut metadata = Metadata::new();
            metadata.insert("user_id".to_string(), json!(owner));
            metadata.insert("modality".to_string(), json!("text"));
            index
                .insert(IndexRecord {
                    content: format!("{} notes on rust", owner),
                    metadata,
                    vector: embedder.embed_text("notes on rust").await.unwrap(),
                })
                .await
                .unwrap();
        }

        let retriever = Retriever::new(embedder, index, RetrievalConfig::default());
        let documents = retriever.retrieve("rust", Some("alice")).await.unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].metadata["user_id"], "alice");
    }

    #[tokio::test]
    async fn test_only_text_records_are_retrieved() {
        let embedder = Arc::new(HashingEmbedder::new(32));
        let index = Arc::new(InMemoryVectorIndex::new());
        for (content, modality) in [("rust ownership", "text"), ("a crab on a beach", "image")] {
            let mut metadata = Metadata::new();
            metadata.insert("modality".to_string(), json!(modality));
            index
                .insert(IndexRecord {
                    content: content.to_string(),
                    metadata,
                    vector: embedder.embed_text("rust").await.unwrap(),
                })
                .await
                .unwrap();
        }

        let retriever = Retriever::new(embedder, index, RetrievalConfig::default());
        let documents = retriever.retrieve("rust", None).await.unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content, "rust ownership");
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retrieval_error() {
        let retriever = Retriever::new(
            Arc::new(BrokenEmbedder),
            Arc::new(InMemoryVectorIndex::new()),
            RetrievalConfig::default(),
        );

        let err = retriever.retrieve("q", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval(_)));
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_query_embeddings_are_memoized() {
        let embedder = Arc::new(CountingEmbedder(AtomicUsize::new(0)));
        let cache = Arc::new(ExpiringCache::new(CacheConfig::default()));
        let retriever = Retriever::new(
            embedder.clone(),
            Arc::new(InMemoryVectorIndex::new()),
            RetrievalConfig::default(),
        )
        .with_embedding_cache(CachedCall::new(cache, EMBEDDING_NAMESPACE));

        retriever.retrieve("same question", None).await.unwrap();
        retriever.retrieve("same question", None).await.unwrap();
        retriever.retrieve("other question", None).await.unwrap();

        assert_eq!(embedder.0.load(Ordering::SeqCst), 2);
    }
}
