//! Error taxonomy for the pipeline
//!
//! Only `Configuration` is allowed to abort startup. Every per-request
//! failure is converted into a well-formed `GenerationResult` by the
//! orchestrator, and admission rejections are surfaced to the caller as a
//! distinct, retryable kind.

use std::time::Duration;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or invalid configuration; fatal at construction
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Sliding-window limit reached for a client; retry later
    #[error("Rate limit exceeded for {client_id}. Please try again in {:.1}s", .retry_after.as_secs_f64())]
    AdmissionRejected {
        client_id: String,
        retry_after: Duration,
    },

    /// Embedding or vector index call failed
    #[error("Failed to retrieve documents: {0}")]
    Retrieval(String),

    /// Generation capability failed
    #[error("Failed to generate response: {0}")]
    Generation(String),

    /// A modality context capability failed
    #[error("Failed to process {modality} input: {reason}")]
    Enhancement { modality: String, reason: String },

    /// A media ingestion step failed
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    /// A task id was submitted twice
    #[error("Task {0} already exists")]
    DuplicateTask(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Wrap a collaborator failure raised during retrieval
    pub fn retrieval(err: anyhow::Error) -> Self {
        Self::Retrieval(format!("{:#}", err))
    }

    /// Wrap a collaborator failure raised during generation
    pub fn generation(err: anyhow::Error) -> Self {
        Self::Generation(format!("{:#}", err))
    }

    /// Wrap a collaborator failure raised while deriving modality context
    pub fn enhancement(modality: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Enhancement {
            modality: modality.into(),
            reason: format!("{:#}", err),
        }
    }

    /// Whether the caller may retry the same request later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. })
    }

    /// Suggested backoff for admission rejections
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::AdmissionRejected { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
