//! Modality context appended to a generated answer

use std::sync::Arc;

use tracing::debug;

use crate::capabilities::{ImageDescriber, PlaceholderDescriber, StubTranscriber, Transcriber, VideoDescriber};
use crate::error::{PipelineError, Result};
use crate::orchestrator::GenerationResult;

/// A query with optional media attachments
#[derive(Debug, Clone, Default)]
pub struct MultiModalRequest {
    pub query: String,
    pub image: Option<Vec<u8>>,
    pub audio: Option<Vec<u8>>,
    pub video: Option<Vec<u8>>,
    pub owner_id: Option<String>,
}

impl MultiModalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.image = Some(bytes.into());
        self
    }

    pub fn with_audio(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.audio = Some(bytes.into());
        self
    }

    pub fn with_video(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.video = Some(bytes.into());
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn has_media(&self) -> bool {
        self.image.is_some() || self.audio.is_some() || self.video.is_some()
    }
}

pub struct MultiModalEnhancer {
    image: Arc<dyn ImageDescriber>,
    audio: Arc<dyn Transcriber>,
    video: Arc<dyn VideoDescriber>,
}

impl Default for MultiModalEnhancer {
    fn default() -> Self {
        let describer = Arc::new(PlaceholderDescriber);
        Self {
            image: describer.clone(),
            audio: Arc::new(StubTranscriber),
            video: describer,
        }
    }
}

impl MultiModalEnhancer {
    pub fn new(
        image: Arc<dyn ImageDescriber>,
        audio: Arc<dyn Transcriber>,
        video: Arc<dyn VideoDescriber>,
    ) -> Self {
        Self { image, audio, video }
    }

    /// Context strings for the attached media, image then audio then video
    pub async fn contexts(&self, request: &MultiModalRequest) -> Result<Vec<String>> {
        let mut contexts = Vec::new();

        if let Some(image) = &request.image {
            let text = self
                .image
                .describe_image(image)
                .await
                .map_err(|e| PipelineError::enhancement("image", e))?;
            contexts.push(text);
        }

        if let Some(audio) = &request.audio {
            let transcript = self
                .audio
                .transcribe(audio)
                .await
                .map_err(|e| PipelineError::enhancement("audio", e))?;
            contexts.push(transcript.text);
        }

        if let Some(video) = &request.video {
            let text = self
                .video
                .describe_video(video)
                .await
                .map_err(|e| PipelineError::enhancement("video", e))?;
            contexts.push(text);
        }

        Ok(contexts)
    }

    /// New result whose answer has one paragraph per attached modality
    pub async fn enhance(
        &self,
        base: &GenerationResult,
        request: &MultiModalRequest,
    ) -> Result<GenerationResult> {
        let contexts = self.contexts(request).await?;
        debug!("Appending {} modality contexts", contexts.len());

        let mut answer = base.answer.clone();
        for context in contexts {
            answer.push_str("\n\n");
            answer.push_str(&context);
        }

        Ok(GenerationResult {
            answer,
            ..base.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::stub::{AUDIO_PLACEHOLDER, IMAGE_PLACEHOLDER, VIDEO_PLACEHOLDER};
    use crate::capabilities::Transcript;
    use async_trait::async_trait;

    fn base() -> GenerationResult {
        GenerationResult {
            query: "describe scene".to_string(),
            answer: "A base answer.".to_string(),
            sources: Vec::new(),
            processing_time: Some(0.1),
        }
    }

    struct BrokenTranscriber;

    #[async_trait]
    impl Transcriber for BrokenTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> anyhow::Result<Transcript> {
            anyhow::bail!("unsupported sample rate")
        }
    }

    #[tokio::test]
    async fn test_no_media_is_noop() {
        let enhancer = MultiModalEnhancer::default();
        let request = MultiModalRequest::new("describe scene");

        let result = enhancer.enhance(&base(), &request).await.unwrap();
        assert_eq!(result.answer, "A base answer.");
    }

    #[tokio::test]
    async fn test_single_image_paragraph() {
        let enhancer = MultiModalEnhancer::default();
        let request = MultiModalRequest::new("describe scene").with_image(b"x".to_vec());
        let original = base();

        let result = enhancer.enhance(&original, &request).await.unwrap();
        assert_eq!(result.answer, format!("A base answer.\n\n{}", IMAGE_PLACEHOLDER));
        // The base result is untouched
        assert_eq!(original.answer, "A base answer.");
        assert_eq!(result.processing_time, original.processing_time);
    }

    #[tokio::test]
    async fn test_fixed_modality_order() {
        let enhancer = MultiModalEnhancer::default();
        let request = MultiModalRequest::new("q")
            .with_video(b"v".to_vec())
            .with_audio(b"a".to_vec())
            .with_image(b"i".to_vec());

        let result = enhancer.enhance(&base(), &request).await.unwrap();
        assert_eq!(
            result.answer,
            format!(
                "A base answer.\n\n{}\n\n{}\n\n{}",
                IMAGE_PLACEHOLDER, AUDIO_PLACEHOLDER, VIDEO_PLACEHOLDER
            )
        );
    }

    #[tokio::test]
    async fn test_capability_failure_names_modality() {
        let describer = Arc::new(PlaceholderDescriber);
        let enhancer =
            MultiModalEnhancer::new(describer.clone(), Arc::new(BrokenTranscriber), describer);
        let request = MultiModalRequest::new("q").with_audio(b"a".to_vec());

        let err = enhancer.enhance(&base(), &request).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to process audio input: unsupported sample rate"
        );
    }
}
