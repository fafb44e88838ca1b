//! Pipeline configuration
//!
//! Values come from `Default`, then from the environment (optionally
//! seeded from a `.env` file). `validate` is the single gate that decides
//! whether the process may start.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mosaic_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admission::AdmissionConfig;
use crate::error::{PipelineError, Result};
use crate::tasks::TaskEngineConfig;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct:free";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Scheme for the built-in in-process vector index
pub const MEMORY_INDEX_SCHEME: &str = "memory://";

/// Scheme for a LanceDB index on local disk, `lancedb://<directory>`
pub const LANCEDB_INDEX_SCHEME: &str = "lancedb://";

/// Top-level configuration for the composition root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub admission: AdmissionConfig,
    pub tasks: TaskEngineConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub backend: BackendConfig,
}

/// Retriever settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Nearest neighbours requested per query
    pub k: usize,
    /// Characters of document content kept in a source preview
    pub preview_chars: usize,
    /// TTL for memoized query embeddings
    pub embedding_cache_ttl: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 3,
            preview_chars: 200,
            embedding_cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Generation capability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible API key (OpenAI or OpenRouter)
    pub api_key: Option<String>,
    /// Base URL of the chat-completions API
    pub api_base: String,
    pub model_name: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Text embedding implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing, no model download
    #[default]
    Hashing,
    /// Local multilingual E5 model through fastembed
    FastEmbed,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" | "stub" => Ok(Self::Hashing),
            "fastembed" => Ok(Self::FastEmbed),
            other => Err(format!("unknown embedding backend '{}'", other)),
        }
    }
}

/// Which concrete capability implementations to construct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Location of the vector index: `memory://` for the in-process index,
    /// `lancedb://<directory>` for a persistent LanceDB table.
    pub vector_index_url: Option<String>,
    /// Use the deterministic stub language model
    pub use_stub_models: bool,
    pub embedding_backend: EmbeddingBackend,
    /// Dimension of vectors produced by the hashing embedder
    pub embedding_dimension: usize,
    /// Root directory of the local blob store
    pub blob_root: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            vector_index_url: None,
            use_stub_models: false,
            embedding_backend: EmbeddingBackend::Hashing,
            embedding_dimension: 384,
            blob_root: PathBuf::from("./data/blobs"),
        }
    }
}

impl PipelineConfig {
    /// Configuration backed entirely by in-process stubs
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.backend.vector_index_url = Some(MEMORY_INDEX_SCHEME.to_string());
        config.backend.use_stub_models = true;
        config
    }

    /// Load configuration from the process environment and `.env`
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            info!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        // Vector index
        config.backend.vector_index_url = var("VECTOR_INDEX_URL");
        if let Some(stub) = var("USE_STUB_BACKENDS") {
            config.backend.use_stub_models = stub.eq_ignore_ascii_case("true") || stub == "1";
        }
        if let Some(embedder) = parse_var(&var, "EMBEDDING_BACKEND")? {
            config.backend.embedding_backend = embedder;
        }
        if let Some(dim) = parse_var(&var, "EMBEDDING_DIMENSION")? {
            config.backend.embedding_dimension = dim;
        }
        if let Some(root) = var("BLOB_STORE_ROOT") {
            config.backend.blob_root = PathBuf::from(root);
        }

        // Generation credentials, OpenAI first then OpenRouter
        let openai_key = var("OPENAI_API_KEY");
        let openrouter_key = var("OPENROUTER_API_KEY");
        let explicit_model = var("RAG_MODEL");
        config.generation.api_key = openai_key.clone().or_else(|| openrouter_key.clone());

        if let Some(base) = var("OPENAI_API_BASE") {
            config.generation.api_base = base;
        } else if openai_key.is_none() && openrouter_key.is_some() {
            config.generation.api_base = OPENROUTER_API_BASE.to_string();
        }

        match explicit_model {
            Some(model) => config.generation.model_name = model,
            None if openai_key.is_none() && openrouter_key.is_some() => {
                config.generation.model_name = OPENROUTER_DEFAULT_MODEL.to_string();
            }
            None => {}
        }

        if let Some(temperature) = parse_var(&var, "RAG_TEMPERATURE")? {
            config.generation.temperature = temperature;
        }
        if let Some(k) = parse_var(&var, "RAG_RETRIEVAL_K")? {
            config.retrieval.k = k;
        }

        // Cache and admission
        if let Some(secs) = parse_var::<u64, _>(&var, "CACHE_TTL_SECONDS")? {
            config.cache.default_ttl = Duration::from_secs(secs);
        }
        if let Some(requests) = parse_var(&var, "RATE_LIMIT_REQUESTS")? {
            config.admission.requests_per_window = requests;
        }
        if let Some(secs) = parse_var::<u64, _>(&var, "RATE_LIMIT_WINDOW_SECONDS")? {
            config.admission.window = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&var, "RATE_LIMIT_SWEEP_SECONDS")? {
            config.admission.sweep_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Fail fast on anything that would make the pipeline unusable
    pub fn validate(&self) -> Result<()> {
        match self.backend.vector_index_url.as_deref() {
            None => {
                return Err(PipelineError::Configuration(
                    "VECTOR_INDEX_URL is required".to_string(),
                ))
            }
            Some(url) if lancedb_path(url) == Some("") => {
                return Err(PipelineError::Configuration(format!(
                    "{}<directory> needs a directory",
                    LANCEDB_INDEX_SCHEME
                )))
            }
            Some(_) => {}
        }

        if !self.backend.use_stub_models && self.generation.api_key.is_none() {
            return Err(PipelineError::Configuration(
                "OPENAI_API_KEY or OPENROUTER_API_KEY is required".to_string(),
            ));
        }

        if self.retrieval.k == 0 {
            return Err(PipelineError::Configuration(
                "retrieval k must be greater than 0".to_string(),
            ));
        }

        if self.backend.embedding_dimension == 0 {
            return Err(PipelineError::Configuration(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(PipelineError::Configuration(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        self.admission.validate()?;
        self.tasks.validate()?;
        self.cache
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        Ok(())
    }

    /// Copy safe to print: credentials replaced by a marker
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let redact = |value: &mut Option<String>| {
            if value.is_some() {
                *value = Some("********".to_string());
            }
        };
        redact(&mut copy.generation.api_key);
        copy
    }
}

/// Directory part of a `lancedb://` index URL
pub fn lancedb_path(url: &str) -> Option<&str> {
    url.strip_prefix(LANCEDB_INDEX_SCHEME).map(str::trim)
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                PipelineError::Configuration(format!("invalid {} '{}': {}", name, raw, e))
            })
        })
        .transpose()
}
