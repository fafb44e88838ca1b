use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mosaic::capabilities::stub::{AUDIO_PLACEHOLDER, IMAGE_PLACEHOLDER, VIDEO_PLACEHOLDER};
use mosaic::capabilities::{InMemoryVectorIndex, Transcriber, Transcript};
use mosaic::ingest::NO_TRANSCRIPT;
use mosaic::{Backends, PipelineConfig, PipelineError, ServiceContext, TaskStatus};
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(10);

/// Transcriber for recordings without a usable soundtrack
struct SilentTranscriber;

#[async_trait]
impl Transcriber for SilentTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> anyhow::Result<Transcript> {
        anyhow::bail!("no audio stream")
    }
}

fn context_with_index(blobs: &TempDir) -> (ServiceContext, Arc<InMemoryVectorIndex>) {
    context_with(blobs, |backends| backends)
}

fn context_with(
    blobs: &TempDir,
    customize: impl FnOnce(Backends) -> Backends,
) -> (ServiceContext, Arc<InMemoryVectorIndex>) {
    let mut config = PipelineConfig::in_memory();
    config.backend.blob_root = blobs.path().to_path_buf();

    let index = Arc::new(InMemoryVectorIndex::new());
    let backends = customize(
        Backends::stub(config.backend.embedding_dimension, blobs.path()).with_index(index.clone()),
    );

    let context = ServiceContext::with_backends(config, backends).unwrap();
    (context, index)
}

/// Test: ingested text is retrievable by its owner and hidden from others
#[tokio::test]
async fn test_ingested_text_answers_owner_queries() {
    let blobs = TempDir::new().unwrap();
    let (context, index) = context_with_index(&blobs);

    let task_id = context
        .ingestor
        .dispatch_text(
            "Rust is a systems programming language.".to_string(),
            "alice".to_string(),
        )
        .await
        .unwrap();

    let task = context.tasks.wait(&task_id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap()["chunks"], 1);
    assert_eq!(index.len().await, 1);

    let own = context
        .orchestrator
        .answer("What is Rust?", Some("alice"))
        .await;
    assert_eq!(own.sources.len(), 1);
    assert_eq!(own.sources[0].content, "Rust is a systems programming language.");
    assert_eq!(
        own.answer,
        "Based on the available context: Rust is a systems programming language."
    );

    let other = context.orchestrator.answer("What is Rust?", Some("bob")).await;
    assert!(other.sources.is_empty());
}

/// Test: image ingestion stores the file under the owner's prefix
#[tokio::test]
async fn test_image_ingestion_stores_blob() {
    let blobs = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let (context, index) = context_with_index(&blobs);

    let photo = uploads.path().join("photo.PNG");
    std::fs::write(&photo, b"\x89PNG fake image bytes").unwrap();

    let task_id = context
        .ingestor
        .dispatch_image(photo, "alice".to_string())
        .await
        .unwrap();
    let task = context.tasks.wait(&task_id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);

    let result = task.result.unwrap();
    let storage_path = result["storage_path"].as_str().unwrap();
    assert!(storage_path.starts_with("images/alice/"));
    assert!(storage_path.ends_with(".png"));
    assert!(result["signed_url"].as_str().unwrap().starts_with("file://"));
    assert!(blobs.path().join(storage_path).exists());
    assert_eq!(index.len().await, 1);
}

/// Test: audio ingestion indexes the transcript
#[tokio::test]
async fn test_audio_ingestion_indexes_transcript() {
    let blobs = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let (context, _index) = context_with_index(&blobs);

    let clip = uploads.path().join("memo.wav");
    std::fs::write(&clip, b"RIFF fake audio").unwrap();

    let task_id = context
        .ingestor
        .dispatch_audio(clip, "alice".to_string())
        .await
        .unwrap();
    let task = context.tasks.wait(&task_id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);

    let result = task.result.unwrap();
    assert!(result["storage_path"].as_str().unwrap().starts_with("audio/alice/"));
    assert_eq!(result["transcript"], AUDIO_PLACEHOLDER);
    assert_eq!(result["language"], "en");
}

/// Test: unsupported formats are rejected before a task is created
#[tokio::test]
async fn test_unsupported_extension_rejected() {
    let blobs = TempDir::new().unwrap();
    let (context, _index) = context_with_index(&blobs);

    let err = context
        .ingestor
        .dispatch_image(blobs.path().join("anim.gif"), "alice".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ingestion(_)));
    assert!(err.to_string().contains("Please use JPG or PNG"));

    let err = context
        .ingestor
        .dispatch_audio(blobs.path().join("song.flac"), "alice".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ingestion(_)));

    assert!(context.tasks.list().await.is_empty());
}

/// Test: a missing file surfaces as a failed task, not a dispatch error
#[tokio::test]
async fn test_missing_file_fails_task() {
    let blobs = TempDir::new().unwrap();
    let (context, index) = context_with_index(&blobs);

    let task_id = context
        .ingestor
        .dispatch_image(blobs.path().join("missing.jpg"), "alice".to_string())
        .await
        .unwrap();
    let task = context.tasks.wait(&task_id, POLL).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("missing.jpg"));
    assert!(task.result.is_none());
    assert!(index.is_empty().await);
}

/// Test: blank text is rejected up front
#[tokio::test]
async fn test_blank_text_rejected() {
    let blobs = TempDir::new().unwrap();
    let (context, _index) = context_with_index(&blobs);

    let err = context
        .ingestor
        .dispatch_text("   \n".to_string(), "alice".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ingestion(_)));
}

/// Test: image records never show up as sources for text questions
#[tokio::test]
async fn test_answers_cite_only_text() {
    let blobs = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let (context, index) = context_with_index(&blobs);

    let text_task = context
        .ingestor
        .dispatch_text(
            "Rust is a systems programming language.".to_string(),
            "alice".to_string(),
        )
        .await
        .unwrap();
    let mut tasks = vec![text_task];
    for name in ["rust-logo.png", "ferris.jpg"] {
        let photo = uploads.path().join(name);
        std::fs::write(&photo, format!("fake image bytes of {}", name)).unwrap();
        tasks.push(
            context
                .ingestor
                .dispatch_image(photo, "alice".to_string())
                .await
                .unwrap(),
        );
    }
    for id in &tasks {
        let task = context.tasks.wait(id, POLL).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);
    }
    assert_eq!(index.len().await, 3);

    let result = context
        .orchestrator
        .answer("What is Rust?", Some("alice"))
        .await;
    assert_eq!(result.sources.len(), 1);
    assert!(result
        .sources
        .iter()
        .all(|source| source.content != IMAGE_PLACEHOLDER && source.metadata["modality"] == "text"));

    // The images stay reachable through media search
    let images = context
        .search
        .search_images("rust logo", Some("alice"), 5)
        .await
        .unwrap();
    assert_eq!(images.results.len(), 2);
}

/// Test: video ingestion stores under the owner's videos prefix and indexes the description
#[tokio::test]
async fn test_video_ingestion() {
    let blobs = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let (context, index) = context_with_index(&blobs);

    let clip = uploads.path().join("demo.MOV");
    std::fs::write(&clip, b"fake quicktime bytes").unwrap();

    let task_id = context
        .ingestor
        .dispatch_video(clip, "alice".to_string())
        .await
        .unwrap();
    let task = context.tasks.wait(&task_id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);

    let result = task.result.unwrap();
    let storage_path = result["storage_path"].as_str().unwrap();
    assert!(storage_path.starts_with("videos/alice/"));
    assert!(storage_path.ends_with(".mov"));
    assert!(blobs.path().join(storage_path).exists());
    assert_eq!(result["description"], VIDEO_PLACEHOLDER);
    assert_eq!(result["transcript"], AUDIO_PLACEHOLDER);
    assert_eq!(index.len().await, 1);

    let found = context
        .search
        .search_video("video context", Some("alice"), 5)
        .await
        .unwrap();
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.results[0].metadata["modality"], "video");
}

/// Test: a video whose soundtrack cannot be transcribed is still ingested
#[tokio::test]
async fn test_video_without_transcript() {
    let blobs = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let (context, _index) =
        context_with(&blobs, |backends| backends.with_transcriber(Arc::new(SilentTranscriber)));

    let clip = uploads.path().join("silent.mp4");
    std::fs::write(&clip, b"fake mp4 bytes").unwrap();

    let task_id = context
        .ingestor
        .dispatch_video(clip, "alice".to_string())
        .await
        .unwrap();
    let task = context.tasks.wait(&task_id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);

    let result = task.result.unwrap();
    assert_eq!(result["transcript"], NO_TRANSCRIPT);
    assert_eq!(result["language"], "unknown");
}

/// Test: unsupported video containers are rejected up front
#[tokio::test]
async fn test_unsupported_video_rejected() {
    let blobs = TempDir::new().unwrap();
    let (context, _index) = context_with_index(&blobs);

    let err = context
        .ingestor
        .dispatch_video(blobs.path().join("clip.mkv"), "alice".to_string())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Please use MP4"));
    assert!(context.tasks.list().await.is_empty());
}
