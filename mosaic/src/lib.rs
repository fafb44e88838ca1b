pub mod admission;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod enhancer;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod orchestrator;
pub mod retrieval;
pub mod search;
pub mod tasks;
pub mod text;

pub use admission::{client_id, AdmissionConfig, AdmissionController};
pub use capabilities::{Backends, Modality};
pub use config::PipelineConfig;
pub use context::ServiceContext;
pub use enhancer::{MultiModalEnhancer, MultiModalRequest};
pub use error::{PipelineError, Result};
pub use generation::Generator;
pub use ingest::Ingestor;
pub use orchestrator::{GenerationResult, Orchestrator};
pub use retrieval::{Retriever, SourceDocument};
pub use search::{MediaSearch, MediaSearchResult, QueryKind, DEFAULT_SEARCH_LIMIT};
pub use tasks::{Task, TaskEngine, TaskEngineConfig, TaskStatus};
pub use text::{chunk_text, TextAnalyzer};
