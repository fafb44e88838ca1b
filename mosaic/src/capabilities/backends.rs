use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::{
    BlobStore, E5Embedder, Embedder, ExtractiveSummarizer, HashingEmbedder, ImageDescriber,
    InMemoryVectorIndex, LanceVectorIndex, LanguageModel, LexiconSentiment, LocalBlobStore,
    OpenAiChatModel, PlaceholderDescriber, SentimentClassifier, StubLanguageModel,
    StubTranscriber, Summarizer, Transcriber, VectorIndex, VideoDescriber,
};
use crate::config::{
    lancedb_path, EmbeddingBackend, PipelineConfig, LANCEDB_INDEX_SCHEME, MEMORY_INDEX_SCHEME,
};
use crate::error::{PipelineError, Result};

/// One concrete implementation per capability, shared by every component
#[derive(Clone)]
pub struct Backends {
    pub embedder: Arc<dyn Embedder>,
    pub transcriber: Arc<dyn Transcriber>,
    pub image_describer: Arc<dyn ImageDescriber>,
    pub video_describer: Arc<dyn VideoDescriber>,
    pub summarizer: Arc<dyn Summarizer>,
    pub sentiment: Arc<dyn SentimentClassifier>,
    pub index: Arc<dyn VectorIndex>,
    pub blob_store: Arc<dyn BlobStore>,
    pub language_model: Arc<dyn LanguageModel>,
}

impl Backends {
    /// Every capability backed by its deterministic stub
    pub fn stub(embedding_dimension: usize, blob_root: impl Into<PathBuf>) -> Self {
        let describer = Arc::new(PlaceholderDescriber);
        Self {
            embedder: Arc::new(HashingEmbedder::new(embedding_dimension)),
            transcriber: Arc::new(StubTranscriber),
            image_describer: describer.clone(),
            video_describer: describer,
            summarizer: Arc::new(ExtractiveSummarizer),
            sentiment: Arc::new(LexiconSentiment),
            index: Arc::new(InMemoryVectorIndex::new()),
            blob_store: Arc::new(LocalBlobStore::new(blob_root)),
            language_model: Arc::new(StubLanguageModel),
        }
    }

    /// Select implementations from configuration.
    ///
    /// The embedder and the vector index follow `backend`; transcription,
    /// description, summarization and sentiment use the stubs. The language
    /// model is the HTTP client unless stub models are requested.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self> {
        let backend = &config.backend;
        let mut backends = Self::stub(backend.embedding_dimension, backend.blob_root.clone());

        if backend.embedding_backend == EmbeddingBackend::FastEmbed {
            let embedder = E5Embedder::new().map_err(configuration)?;
            backends.embedder = Arc::new(embedder);
        }
        info!(
            "Using {:?} embedder (dimension {})",
            backend.embedding_backend,
            backends.embedder.dimension()
        );

        match backend.vector_index_url.as_deref() {
            None => {
                return Err(PipelineError::Configuration(
                    "VECTOR_INDEX_URL is required".to_string(),
                ))
            }
            Some(url) if url.starts_with(MEMORY_INDEX_SCHEME) => {
                info!("Using in-memory vector index");
            }
            Some(url) => match lancedb_path(url) {
                Some(path) if !path.is_empty() => {
                    let index = LanceVectorIndex::open(path, backends.embedder.dimension())
                        .await
                        .map_err(configuration)?;
                    backends.index = Arc::new(index);
                }
                _ => {
                    return Err(PipelineError::Configuration(format!(
                        "unsupported vector index location '{}' (built in: {}, {}<directory>)",
                        url, MEMORY_INDEX_SCHEME, LANCEDB_INDEX_SCHEME
                    )))
                }
            },
        }

        if backend.use_stub_models {
            info!("Using stub language model");
        } else {
            let model = OpenAiChatModel::from_config(&config.generation).map_err(configuration)?;
            backends.language_model = Arc::new(model);
        }

        Ok(backends)
    }

    /// Whether indexed records outlive the process
    pub fn index_is_persistent(config: &PipelineConfig) -> bool {
        config
            .backend
            .vector_index_url
            .as_deref()
            .and_then(lancedb_path)
            .is_some()
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_image_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.image_describer = describer;
        self
    }

    pub fn with_video_describer(mut self, describer: Arc<dyn VideoDescriber>) -> Self {
        self.video_describer = describer;
        self
    }

    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn with_blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = blob_store;
        self
    }

    pub fn with_language_model(mut self, language_model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = language_model;
        self
    }
}

fn configuration(err: anyhow::Error) -> PipelineError {
    PipelineError::Configuration(format!("{:#}", err))
}
