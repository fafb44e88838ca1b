//! Retrieval -> generation -> enhancement facade
//!
//! `answer` and `answer_multi_modal` never return an error. Any failure
//! along the way becomes a result whose answer describes the problem and
//! whose sources are empty.

use std::sync::Arc;
use std::time::Instant;

use mosaic_cache::{CachedCall, ExpiringCache};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capabilities::Backends;
use crate::config::PipelineConfig;
use crate::enhancer::{MultiModalEnhancer, MultiModalRequest};
use crate::error::{PipelineError, Result};
use crate::generation::Generator;
use crate::retrieval::{Retriever, SourceDocument, EMBEDDING_NAMESPACE};

/// Answer to one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub query: String,
    #[serde(rename = "result")]
    pub answer: String,
    /// Most relevant first
    pub sources: Vec<SourceDocument>,
    /// Wall-clock seconds spent on the request
    pub processing_time: Option<f64>,
}

impl GenerationResult {
    fn degraded(query: &str, answer: String, started: Instant) -> Self {
        Self {
            query: query.to_string(),
            answer,
            sources: Vec::new(),
            processing_time: Some(started.elapsed().as_secs_f64()),
        }
    }
}

pub struct Orchestrator {
    retriever: Retriever,
    generator: Generator,
    enhancer: MultiModalEnhancer,
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    retriever: Option<Retriever>,
    generator: Option<Generator>,
    enhancer: Option<MultiModalEnhancer>,
}

impl OrchestratorBuilder {
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn enhancer(mut self, enhancer: MultiModalEnhancer) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Fails if the retriever or the generator is missing
    pub fn build(self) -> Result<Orchestrator> {
        let retriever = self.retriever.ok_or_else(|| {
            PipelineError::Configuration("vector index retriever is not configured".to_string())
        })?;
        let generator = self.generator.ok_or_else(|| {
            PipelineError::Configuration("generation capability is not configured".to_string())
        })?;

        Ok(Orchestrator {
            retriever,
            generator,
            enhancer: self.enhancer.unwrap_or_default(),
        })
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Validate `config` and wire the pipeline from `backends`.
    ///
    /// With a cache, query embeddings are memoized in it.
    pub fn from_backends(
        config: &PipelineConfig,
        backends: &Backends,
        cache: Option<Arc<ExpiringCache<serde_json::Value>>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut retriever = Retriever::new(
            backends.embedder.clone(),
            backends.index.clone(),
            config.retrieval.clone(),
        );
        if let Some(cache) = cache {
            retriever = retriever.with_embedding_cache(CachedCall::new(cache, EMBEDDING_NAMESPACE));
        }

        let orchestrator = Self::builder()
            .retriever(retriever)
            .generator(Generator::new(backends.language_model.clone()))
            .enhancer(MultiModalEnhancer::new(
                backends.image_describer.clone(),
                backends.transcriber.clone(),
                backends.video_describer.clone(),
            ))
            .build()?;

        info!("Orchestrator initialized");
        Ok(orchestrator)
    }

    /// Answer `query`, optionally scoped to documents owned by `owner`
    pub async fn answer(&self, query: &str, owner: Option<&str>) -> GenerationResult {
        let started = Instant::now();
        info!("Generating response for query: {}", preview(query));

        match self.retrieve_and_generate(query, owner).await {
            Ok((answer, sources)) => GenerationResult {
                query: query.to_string(),
                answer,
                sources,
                processing_time: Some(started.elapsed().as_secs_f64()),
            },
            Err(e) => {
                warn!("Response generation failed: {}", e);
                GenerationResult::degraded(
                    query,
                    format!("I encountered an error processing your request: {}", e),
                    started,
                )
            }
        }
    }

    /// Answer the request's query, then append context for attached media
    pub async fn answer_multi_modal(&self, request: &MultiModalRequest) -> GenerationResult {
        let started = Instant::now();
        let base = self.answer(&request.query, request.owner_id.as_deref()).await;

        match self.enhancer.enhance(&base, request).await {
            Ok(enhanced) => GenerationResult {
                processing_time: Some(started.elapsed().as_secs_f64()),
                ..enhanced
            },
            Err(e) => {
                warn!("Multi-modal response generation failed: {}", e);
                GenerationResult::degraded(
                    &request.query,
                    format!(
                        "I encountered an error processing your multi-modal request: {}",
                        e
                    ),
                    started,
                )
            }
        }
    }

    async fn retrieve_and_generate(
        &self,
        query: &str,
        owner: Option<&str>,
    ) -> Result<(String, Vec<SourceDocument>)> {
        let sources = self.retriever.retrieve(query, owner).await?;
        let answer = self.generator.generate(query, &sources).await?;
        Ok((answer, sources))
    }
}

fn preview(query: &str) -> String {
    match query.char_indices().nth(50) {
        Some((cut, _)) => format!("{}...", &query[..cut]),
        None => query.to_string(),
    }
}
