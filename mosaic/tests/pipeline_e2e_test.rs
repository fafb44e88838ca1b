use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mosaic::capabilities::stub::IMAGE_PLACEHOLDER;
use mosaic::capabilities::{
    Embedder, HashingEmbedder, IndexMatch, IndexRecord, LanguageModel, Metadata, MetadataFilter,
    VectorIndex,
};
use mosaic::config::RetrievalConfig;
use mosaic::{Backends, Generator, MultiModalRequest, Orchestrator, PipelineConfig, Retriever};
use serde_json::json;

/// Index that always returns the same matches
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
        Ok("ignored".to_string())
    }
}

/// Model that records prompts and answers with a fixed string
#[derive(Default)]
struct RecordingModel {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("AI stands for artificial intelligence.".to_string())
    }
}

struct UnavailableEmbedder;

#[async_trait]
impl Embedder for UnavailableEmbedder {
    fn dimension(&self) -> usize {
        8
    }

    async fn embed_text(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }

    async fn embed_image(&self, _image: &[u8]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }
}

fn ai_document() -> IndexMatch {
    let mut metadata = Metadata::new();
    metadata.insert("user_id".to_string(), json!("1"));
    IndexMatch {
        content: "AI is...".to_string(),
        metadata,
        score: Some(0.9),
    }
}

fn orchestrator(embedder: Arc<dyn Embedder>, model: Arc<RecordingModel>) -> Orchestrator {
    Orchestrator::builder()
        .retriever(Retriever::new(
            embedder,
            Arc::new(FixedIndex(vec![ai_document()])),
            RetrievalConfig::default(),
        ))
        .generator(Generator::new(model))
        .build()
        .unwrap()
}

/// Test: a single indexed document becomes the only source and the only context
#[tokio::test]
async fn test_answer_what_is_ai() {
    let model = Arc::new(RecordingModel::default());
    let orchestrator = orchestrator(Arc::new(HashingEmbedder::new(8)), model.clone());

    let result = orchestrator.answer("What is AI?", None).await;

    assert_eq!(result.query, "What is AI?");
    assert_eq!(result.answer, "AI stands for artificial intelligence.");
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].content, "AI is...");
    assert!((result.sources[0].relevance_score - 0.9).abs() < f32::EPSILON);
    assert!(result.processing_time.unwrap() >= 0.0);

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Context from your knowledge base:\nAI is...\n\nQuestion: What is AI?"));
}

/// Test: an attached image appends exactly one paragraph to the base answer
#[tokio::test]
async fn test_multi_modal_image_paragraph() {
    let model = Arc::new(RecordingModel::default());
    let orchestrator = orchestrator(Arc::new(HashingEmbedder::new(8)), model);

    let base = orchestrator.answer("describe scene", None).await;
    let request = MultiModalRequest::new("describe scene").with_image(b"x".to_vec());
    let result = orchestrator.answer_multi_modal(&request).await;

    assert_eq!(result.answer, format!("{}\n\n{}", base.answer, IMAGE_PLACEHOLDER));
    assert_eq!(result.sources, base.sources);
}

/// Test: an embedding failure degrades into a well-formed result
#[tokio::test]
async fn test_embedding_failure_degrades() {
    let model = Arc::new(RecordingModel::default());
    let orchestrator = orchestrator(Arc::new(UnavailableEmbedder), model.clone());

    let result = orchestrator.answer("What is AI?", None).await;

    assert!(result.sources.is_empty());
    assert!(result
        .answer
        .starts_with("I encountered an error processing your request: "));
    assert!(result.answer.contains("embedding service unavailable"));
    assert!(result.processing_time.is_some());
    // Generation is never reached
    assert!(model.prompts.lock().unwrap().is_empty());
}

/// Test: a failing generation capability degrades too
#[tokio::test]
async fn test_generation_failure_degrades() {
    struct DownModel;

    #[async_trait]
    impl LanguageModel for DownModel {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("503 Service Unavailable")
        }
    }

    let orchestrator = Orchestrator::builder()
        .retriever(Retriever::new(
            Arc::new(HashingEmbedder::new(8)),
            Arc::new(FixedIndex(vec![ai_document()])),
            RetrievalConfig::default(),
        ))
        .generator(Generator::new(Arc::new(DownModel)))
        .build()
        .unwrap();

    let result = orchestrator.answer("What is AI?", None).await;
    assert!(result.sources.is_empty());
    assert_eq!(
        result.answer,
        "I encountered an error processing your request: Failed to generate response: 503 Service Unavailable"
    );
}

/// Test: a failing modality capability yields the multi-modal degraded message
#[tokio::test]
async fn test_multi_modal_failure_degrades() {
    struct BlindDescriber;

    #[async_trait]
    impl mosaic::capabilities::ImageDescriber for BlindDescriber {
        async fn describe_image(&self, _image: &[u8]) -> anyhow::Result<String> {
            anyhow::bail!("corrupt image")
        }
    }

    let backends = Backends::stub(8, "./unused")
        .with_index(Arc::new(FixedIndex(vec![ai_document()])))
        .with_image_describer(Arc::new(BlindDescriber));
    let orchestrator =
        Orchestrator::from_backends(&PipelineConfig::in_memory(), &backends, None).unwrap();

    let request = MultiModalRequest::new("describe scene").with_image(b"x".to_vec());
    let result = orchestrator.answer_multi_modal(&request).await;

    assert!(result.sources.is_empty());
    assert_eq!(
        result.answer,
        "I encountered an error processing your multi-modal request: Failed to process image input: corrupt image"
    );
}

/// Test: a missing index location is fatal at construction
#[test]
fn test_missing_index_is_configuration_error() {
    let mut config = PipelineConfig::in_memory();
    config.backend.vector_index_url = None;

    let backends = Backends::stub(8, "./unused");
    let err = Orchestrator::from_backends(&config, &backends, None).err().unwrap();
    assert!(matches!(err, mosaic::PipelineError::Configuration(_)));
}
