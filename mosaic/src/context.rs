//! Composition root
//!
//! Builds exactly one instance of every shared component and owns the
//! background activities: the task reaper, the admission sweeper and,
//! when enabled, the cache sweeper.

use std::sync::Arc;

use mosaic_cache::{start_auto_cleanup, ExpiringCache};
use tokio::task::JoinHandle;
use tracing::info;

use crate::admission::AdmissionController;
use crate::capabilities::Backends;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingest::Ingestor;
use crate::orchestrator::Orchestrator;
use crate::search::MediaSearch;
use crate::tasks::TaskEngine;
use crate::text::TextAnalyzer;

pub struct ServiceContext {
    pub config: PipelineConfig,
    pub backends: Backends,
    pub cache: Arc<ExpiringCache<serde_json::Value>>,
    pub admission: AdmissionController,
    pub tasks: TaskEngine,
    pub orchestrator: Arc<Orchestrator>,
    pub text: Arc<TextAnalyzer>,
    pub ingestor: Ingestor,
    pub search: MediaSearch,
    background: Vec<JoinHandle<()>>,
}

impl ServiceContext {
    /// Validate `config`, select backends from it and start the services.
    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let backends = Backends::from_config(&config).await?;
        Self::with_backends(config, backends)
    }

    /// Start the services over caller-supplied backends.
    /// Must be called from within a tokio runtime.
    pub fn with_backends(config: PipelineConfig, backends: Backends) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ExpiringCache::new(config.cache.clone()));
        let admission = AdmissionController::new(config.admission.clone());
        let tasks = TaskEngine::new(config.tasks.clone());

        let orchestrator = Arc::new(Orchestrator::from_backends(
            &config,
            &backends,
            Some(Arc::clone(&cache)),
        )?);
        let text = Arc::new(TextAnalyzer::new(
            backends.embedder.clone(),
            backends.sentiment.clone(),
            backends.summarizer.clone(),
            Arc::clone(&cache),
        ));
        let ingestor = Ingestor::new(&backends, Arc::clone(&text), tasks.clone());
        let search = MediaSearch::new(&backends, config.retrieval.preview_chars);

        let mut background = vec![tasks.start_reaper(), admission.start_sweeper()];
        if let Some(sweeper) = start_auto_cleanup(Arc::clone(&cache)) {
            background.push(sweeper);
        }

        info!("Service context ready ({} background activities)", background.len());

        Ok(Self {
            config,
            backends,
            cache,
            admission,
            tasks,
            orchestrator,
            text,
            ingestor,
            search,
            background,
        })
    }

    /// Stop the background activities. In-flight tasks keep running.
    pub fn shutdown(&mut self) {
        if self.background.is_empty() {
            return;
        }
        for handle in self.background.drain(..) {
            handle.abort();
        }
        info!("Service context shut down");
    }

    pub fn background_activities(&self) -> usize {
        self.background.len()
    }
}

impl Drop for ServiceContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_starts_background_activities() {
        let blobs = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::in_memory();
        config.backend.blob_root = blobs.path().to_path_buf();

        let mut context = ServiceContext::from_config(config).await.unwrap();
        assert_eq!(context.background_activities(), 3);

        context.shutdown();
        assert_eq!(context.background_activities(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_does_not_start() {
        assert!(ServiceContext::from_config(PipelineConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_without_cache_sweeper() {
        let mut config = PipelineConfig::in_memory();
        config.cache.enable_auto_cleanup = false;

        let backends = Backends::stub(16, "./unused");
        let context = ServiceContext::with_backends(config, backends).unwrap();
        assert_eq!(context.background_activities(), 2);
    }
}
