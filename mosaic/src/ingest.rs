//! Background ingestion of text, images, audio and video
//!
//! `ingest_*` do the work inline; `dispatch_*` validate the input, hand
//! the work to the task engine and return the task id straight away.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capabilities::{
    Backends, BlobStore, Embedder, ImageDescriber, IndexRecord, Metadata, Modality, Transcriber,
    Transcript, VectorIndex, VideoDescriber, MODALITY_KEY, OWNER_KEY,
};
use crate::error::{PipelineError, Result};
use crate::tasks::TaskEngine;
use crate::text::{chunk_text, TextAnalyzer};

pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];
pub const AUDIO_EXTENSIONS: &[&str] = &[".wav", ".mp3", ".m4a"];
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi"];

const UNSUPPORTED_IMAGE: &str = "Unsupported image format. Please use JPG or PNG.";
const UNSUPPORTED_AUDIO: &str = "Unsupported audio format. Please use WAV, MP3 or M4A.";
const UNSUPPORTED_VIDEO: &str = "Unsupported video format. Please use MP4.";

/// Soundtrack stand-in when a video's audio cannot be transcribed
pub const NO_TRANSCRIPT: &str = "Audio transcription not available";

/// Token budget per text chunk
pub const DEFAULT_CHUNK_TOKENS: usize = 500;

#[derive(Clone)]
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    image_describer: Arc<dyn ImageDescriber>,
    video_describer: Arc<dyn VideoDescriber>,
    transcriber: Arc<dyn Transcriber>,
    index: Arc<dyn VectorIndex>,
    blob_store: Arc<dyn BlobStore>,
    text: Arc<TextAnalyzer>,
    tasks: TaskEngine,
    chunk_tokens: usize,
}

impl Ingestor {
    pub fn new(backends: &Backends, text: Arc<TextAnalyzer>, tasks: TaskEngine) -> Self {
        Self {
            embedder: backends.embedder.clone(),
            image_describer: backends.image_describer.clone(),
            video_describer: backends.video_describer.clone(),
            transcriber: backends.transcriber.clone(),
            index: backends.index.clone(),
            blob_store: backends.blob_store.clone(),
            text,
            tasks,
            chunk_tokens: DEFAULT_CHUNK_TOKENS,
        }
    }

    pub fn with_chunk_tokens(mut self, chunk_tokens: usize) -> Self {
        self.chunk_tokens = chunk_tokens.max(1);
        self
    }

    /// Chunk, embed and index `text` for `owner`
    pub async fn ingest_text(&self, text: &str, owner: &str) -> anyhow::Result<serde_json::Value> {
        let chunks = chunk_text(text, self.chunk_tokens);
        if chunks.is_empty() {
            bail!("no text to ingest");
        }

        let sentiment = self.text.sentiment(text).await.context("sentiment analysis failed")?;

        for (position, chunk) in chunks.iter().enumerate() {
            let vector = self.text.embed(chunk).await.context("text embedding failed")?;

            let mut metadata = owner_metadata(owner, Modality::Text);
            metadata.insert("chunk_index".to_string(), json!(position));
            metadata.insert("sentiment".to_string(), json!(sentiment.label));
            metadata.insert("sentiment_score".to_string(), json!(sentiment.score));

            self.index
                .insert(IndexRecord {
                    content: chunk.clone(),
                    metadata,
                    vector,
                })
                .await
                .context("index insert failed")?;
        }

        info!("Ingested {} text chunks for {}", chunks.len(), owner);
        Ok(json!({
            "chunks": chunks.len(),
            "embedding_dimension": self.text.dimension(),
            "sentiment": sentiment,
        }))
    }

    /// Embed, describe, store and index an image file.
    ///
    /// Text-only embedders index the image through its description.
    pub async fn ingest_image(&self, path: &Path, owner: &str) -> anyhow::Result<serde_json::Value> {
        let extension = checked_extension(path, IMAGE_EXTENSIONS, UNSUPPORTED_IMAGE)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;

        let description = self
            .image_describer
            .describe_image(&bytes)
            .await
            .context("image description failed")?;
        let embedding = if self.embedder.embeds_images() {
            self.embedder.embed_image(&bytes).await
        } else {
            self.embedder.embed_text(&description).await
        }
        .context("image embedding failed")?;

        let storage_path = format!("images/{}/{}{}", owner, Uuid::new_v4(), extension);
        let signed_url = self.blob_store.put(path, &storage_path).await?;

        let mut metadata = owner_metadata(owner, Modality::Image);
        metadata.insert("source_path".to_string(), json!(storage_path));
        self.index
            .insert(IndexRecord {
                content: description.clone(),
                metadata,
                vector: embedding.clone(),
            })
            .await
            .context("index insert failed")?;

        info!("Ingested image {} for {}", storage_path, owner);
        Ok(json!({
            "storage_path": storage_path,
            "signed_url": signed_url,
            "description": description,
            "embedding_dimension": embedding.len(),
        }))
    }

    /// Transcribe, embed, store and index an audio file
    pub async fn ingest_audio(&self, path: &Path, owner: &str) -> anyhow::Result<serde_json::Value> {
        let extension = checked_extension(path, AUDIO_EXTENSIONS, UNSUPPORTED_AUDIO)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;

        let transcript = self.transcriber.transcribe(&bytes).await.context("transcription failed")?;
        let embedding = self.text.embed(&transcript.text).await.context("transcript embedding failed")?;

        let storage_path = format!("audio/{}/{}{}", owner, Uuid::new_v4(), extension);
        let signed_url = self.blob_store.put(path, &storage_path).await?;

        let mut metadata = owner_metadata(owner, Modality::Audio);
        metadata.insert("source_path".to_string(), json!(storage_path));
        metadata.insert("language".to_string(), json!(transcript.language));
        self.index
            .insert(IndexRecord {
                content: transcript.text.clone(),
                metadata,
                vector: embedding.clone(),
            })
            .await
            .context("index insert failed")?;

        info!("Ingested audio {} for {}", storage_path, owner);
        Ok(json!({
            "storage_path": storage_path,
            "signed_url": signed_url,
            "transcript": transcript.text,
            "language": transcript.language,
            "embedding_dimension": embedding.len(),
        }))
    }

    /// Describe, transcribe, store and index a video file.
    ///
    /// A soundtrack that cannot be transcribed does not fail the upload;
    /// the record carries `NO_TRANSCRIPT` with language "unknown".
    pub async fn ingest_video(&self, path: &Path, owner: &str) -> anyhow::Result<serde_json::Value> {
        let extension = checked_extension(path, VIDEO_EXTENSIONS, UNSUPPORTED_VIDEO)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;

        let description = self
            .video_describer
            .describe_video(&bytes)
            .await
            .context("video description failed")?;
        let transcript = match self.transcriber.transcribe(&bytes).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Video soundtrack not transcribed: {:#}", e);
                Transcript {
                    text: NO_TRANSCRIPT.to_string(),
                    language: "unknown".to_string(),
                }
            }
        };
        let embedding = self.text.embed(&description).await.context("description embedding failed")?;

        let storage_path = format!("videos/{}/{}{}", owner, Uuid::new_v4(), extension);
        let signed_url = self.blob_store.put(path, &storage_path).await?;

        let mut metadata = owner_metadata(owner, Modality::Video);
        metadata.insert("source_path".to_string(), json!(storage_path));
        metadata.insert("transcript".to_string(), json!(transcript.text));
        metadata.insert("language".to_string(), json!(transcript.language));
        self.index
            .insert(IndexRecord {
                content: description.clone(),
                metadata,
                vector: embedding.clone(),
            })
            .await
            .context("index insert failed")?;

        info!("Ingested video {} for {}", storage_path, owner);
        Ok(json!({
            "storage_path": storage_path,
            "signed_url": signed_url,
            "description": description,
            "transcript": transcript.text,
            "language": transcript.language,
            "embedding_dimension": embedding.len(),
        }))
    }

    pub async fn dispatch_text(&self, text: String, owner: String) -> Result<String> {
        if text.trim().is_empty() {
            return Err(PipelineError::Ingestion("no text to ingest".to_string()));
        }
        let this = self.clone();
        Ok(self
            .tasks
            .submit(async move { this.ingest_text(&text, &owner).await })
            .await)
    }

    pub async fn dispatch_image(&self, path: PathBuf, owner: String) -> Result<String> {
        checked_extension(&path, IMAGE_EXTENSIONS, UNSUPPORTED_IMAGE)
            .map_err(|e| PipelineError::Ingestion(e.to_string()))?;
        let this = self.clone();
        Ok(self
            .tasks
            .submit(async move { this.ingest_image(&path, &owner).await })
            .await)
    }

    pub async fn dispatch_audio(&self, path: PathBuf, owner: String) -> Result<String> {
        checked_extension(&path, AUDIO_EXTENSIONS, UNSUPPORTED_AUDIO)
            .map_err(|e| PipelineError::Ingestion(e.to_string()))?;
        let this = self.clone();
        Ok(self
            .tasks
            .submit(async move { this.ingest_audio(&path, &owner).await })
            .await)
    }

    pub async fn dispatch_video(&self, path: PathBuf, owner: String) -> Result<String> {
        checked_extension(&path, VIDEO_EXTENSIONS, UNSUPPORTED_VIDEO)
            .map_err(|e| PipelineError::Ingestion(e.to_string()))?;
        let this = self.clone();
        Ok(self
            .tasks
            .submit(async move { this.ingest_video(&path, &owner).await })
            .await)
    }
}

fn owner_metadata(owner: &str, modality: Modality) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(OWNER_KEY.to_string(), json!(owner));
    metadata.insert(MODALITY_KEY.to_string(), json!(modality));
    metadata
}

/// Lowercased extension with its leading dot, if it is in `allowed`
fn checked_extension(path: &Path, allowed: &[&str], message: &str) -> anyhow::Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    if !allowed.contains(&extension.as_str()) {
        bail!("{}", message);
    }
    Ok(extension)
}
