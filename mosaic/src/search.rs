//! Per-modality similarity search over ingested media
//!
//! Unlike `Retriever`, which only ever sees text, these searches are
//! restricted to one media kind and return the stored descriptions and
//! transcripts directly without generation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capabilities::{Backends, Embedder, ImageDescriber, MetadataFilter, Modality, VectorIndex};
use crate::error::{PipelineError, Result};
use crate::retrieval::SourceDocument;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Characters of a text query echoed back in results
const QUERY_ECHO_CHARS: usize = 50;

/// How a search was phrased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSearchResult {
    pub modality: Modality,
    pub query_type: QueryKind,
    /// Text query, shortened; absent for image queries
    pub query: Option<String>,
    pub results: Vec<SourceDocument>,
    pub embedding_dimension: usize,
}

#[derive(Clone)]
pub struct MediaSearch {
    embedder: Arc<dyn Embedder>,
    image_describer: Arc<dyn ImageDescriber>,
    index: Arc<dyn VectorIndex>,
    preview_chars: usize,
}

impl MediaSearch {
    pub fn new(backends: &Backends, preview_chars: usize) -> Self {
        Self {
            embedder: backends.embedder.clone(),
            image_describer: backends.image_describer.clone(),
            index: backends.index.clone(),
            preview_chars,
        }
    }

    /// Records of `modality` closest to a text query
    pub async fn search_text(
        &self,
        modality: Modality,
        query: &str,
        owner: Option<&str>,
        limit: usize,
    ) -> Result<MediaSearchResult> {
        if query.trim().is_empty() {
            return Err(PipelineError::Retrieval("empty search query".to_string()));
        }
        let vector = self
            .embedder
            .embed_text(query)
            .await
            .map_err(|e| PipelineError::retrieval(e.context("query embedding failed")))?;

        let results = self.nearest(modality, &vector, owner, limit).await?;
        Ok(MediaSearchResult {
            modality,
            query_type: QueryKind::Text,
            query: Some(echo(query)),
            results,
            embedding_dimension: vector.len(),
        })
    }

    pub async fn search_images(
        &self,
        query: &str,
        owner: Option<&str>,
        limit: usize,
    ) -> Result<MediaSearchResult> {
        self.search_text(Modality::Image, query, owner, limit).await
    }

    /// Images similar to a reference image
    pub async fn search_images_by_example(
        &self,
        image: &[u8],
        owner: Option<&str>,
        limit: usize,
    ) -> Result<MediaSearchResult> {
        // Mirrors how ingestion vectorized the stored images
        let vector = if self.embedder.embeds_images() {
            self.embedder.embed_image(image).await
        } else {
            match self.image_describer.describe_image(image).await {
                Ok(description) => self.embedder.embed_text(&description).await,
                Err(e) => Err(e),
            }
        }
        .map_err(|e| PipelineError::retrieval(e.context("reference image embedding failed")))?;

        let results = self.nearest(Modality::Image, &vector, owner, limit).await?;
        Ok(MediaSearchResult {
            modality: Modality::Image,
            query_type: QueryKind::Image,
            query: None,
            results,
            embedding_dimension: vector.len(),
        })
    }

    pub async fn search_audio(
        &self,
        query: &str,
        owner: Option<&str>,
        limit: usize,
    ) -> Result<MediaSearchResult> {
        self.search_text(Modality::Audio, query, owner, limit).await
    }

    pub async fn search_video(
        &self,
        query: &str,
        owner: Option<&str>,
        limit: usize,
    ) -> Result<MediaSearchResult> {
        self.search_text(Modality::Video, query, owner, limit).await
    }

    async fn nearest(
        &self,
        modality: Modality,
        vector: &[f32],
        owner: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SourceDocument>> {
        let filter = MetadataFilter::modality(modality).and_owner(owner);
        let matches = self
            .index
            .search(vector, limit, Some(&filter))
            .await
            .map_err(|e| PipelineError::retrieval(e.context("vector search failed")))?;

        debug!("{} search returned {} matches", modality, matches.len());
        Ok(matches
            .into_iter()
            .map(|raw| SourceDocument::from_match(raw, self.preview_chars))
            .collect())
    }
}

fn echo(query: &str) -> String {
    match query.char_indices().nth(QUERY_ECHO_CHARS) {
        Some((cut, _)) => format!("{}...", &query[..cut]),
        None => query.to_string(),
    }
}
