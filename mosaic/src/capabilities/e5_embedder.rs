//! Local text embeddings with fastembed's multilingual E5 model

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use super::Embedder;

/// MultilingualE5Small output size
pub const E5_SMALL_DIMENSION: usize = 384;

/// Text-only embedder. Images are indexed through their descriptions.
#[derive(Clone)]
pub struct E5Embedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl E5Embedder {
    /// Load the model, downloading it on first use
    pub fn new() -> Result<Self> {
        info!("Initializing multilingual embedding model");

        let mut options = InitOptions::default();
        options.model_name = EmbeddingModel::MultilingualE5Small;
        options.show_download_progress = true;

        let model = TextEmbedding::try_new(options)
            .context("Failed to initialize embedding model")?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

/// E5 expects a role prefix. Queries and passages are compared
/// symmetrically, so both use "query: ".
fn prefixed(text: &str) -> String {
    format!("query: {}", text)
}

#[async_trait]
impl Embedder for E5Embedder {
    fn dimension(&self) -> usize {
        E5_SMALL_DIMENSION
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let input = prefixed(text);

        // Inference is CPU bound
        tokio::task::spawn_blocking(move || {
            let model = model
                .lock()
                .map_err(|_| anyhow!("embedding model lock poisoned"))?;
            model
                .embed(vec![input], None)
                .context("Failed to generate embedding")?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("No embedding generated"))
        })
        .await
        .context("embedding worker stopped")?
    }

    async fn embed_image(&self, _image: &[u8]) -> Result<Vec<f32>> {
        bail!("the E5 model embeds text only")
    }

    fn embeds_images(&self) -> bool {
        false
    }
}
