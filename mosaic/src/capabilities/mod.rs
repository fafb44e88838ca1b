//! Capability interfaces to external collaborators
//!
//! Inference engines, the vector index, object storage and the language
//! model are all reached through these traits. Each has a deterministic
//! stub implementation. The embedder (fastembed), the index (LanceDB) and
//! the language model (OpenAI-compatible HTTP) also have real ones.
//! `Backends::from_config` picks between them.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod backends;
pub mod blob;
pub mod e5_embedder;
pub mod lance_index;
pub mod memory_index;
pub mod openai;
pub mod stub;

pub use backends::Backends;
pub use blob::LocalBlobStore;
pub use e5_embedder::E5Embedder;
pub use lance_index::LanceVectorIndex;
pub use memory_index::InMemoryVectorIndex;
pub use openai::OpenAiChatModel;
pub use stub::{
    ExtractiveSummarizer, HashingEmbedder, LexiconSentiment, PlaceholderDescriber,
    StubLanguageModel, StubTranscriber,
};

/// Free-form document metadata (owner id, modality, source path, tags)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the owning user's id
pub const OWNER_KEY: &str = "user_id";

/// Metadata key holding the record's `Modality`
pub const MODALITY_KEY: &str = "modality";

/// Speech-to-text output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language: String,
}

/// Sentiment label with confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f32,
}

/// Kind of source a record was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
            Modality::Video => "video",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact-match constraints on metadata fields; a record must satisfy all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub conditions: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().and(field, value)
    }

    /// Restrict to documents owned by `owner_id`
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self::equals(OWNER_KEY, owner_id)
    }

    /// Restrict to records derived from one kind of source
    pub fn modality(modality: Modality) -> Self {
        Self::equals(MODALITY_KEY, modality.as_str())
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Add an owner condition when `owner_id` is given
    pub fn and_owner(self, owner_id: Option<&str>) -> Self {
        match owner_id {
            Some(owner_id) => self.and(OWNER_KEY, owner_id),
            None => self,
        }
    }

    /// Value required for `field`, if this filter constrains it
    pub fn value_for(&self, field: &str) -> Option<&str> {
        self.conditions
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| match metadata.get(field) {
                Some(serde_json::Value::String(s)) => s == value,
                Some(other) => other.to_string() == *value,
                None => false,
            })
    }
}

/// A stored item handed to the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub content: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// Raw nearest-neighbour match as returned by an index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMatch {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Similarity, higher is closer. Some indexes omit it.
    pub score: Option<f32>,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Whether `embed_image` accepts raw image bytes. Text-only models
    /// index an image through the embedding of its description.
    fn embeds_images(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript>;
}

#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe_image(&self, image: &[u8]) -> Result<String>;
}

#[async_trait]
pub trait VideoDescriber: Send + Sync {
    async fn describe_video(&self, video: &[u8]) -> Result<String>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, max_length: usize) -> Result<String>;
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Sentiment>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` matches, closest first
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>>;

    /// Store a record, returning its id
    async fn insert(&self, record: IndexRecord) -> Result<String>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `local_path` to `remote_path`, returning a URL for the object
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<String>;
}

/// Text generation capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}
