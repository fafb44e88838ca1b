//! Deterministic stand-ins for the inference backends
//!
//! These keep the pipeline runnable without model weights or network
//! access. Outputs are stable for identical inputs.

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{
    Embedder, ImageDescriber, LanguageModel, Sentiment, SentimentClassifier, Summarizer,
    Transcriber, Transcript, VideoDescriber,
};
use crate::generation::{CONTEXT_HEADER, QUESTION_HEADER};

pub const IMAGE_PLACEHOLDER: &str = "[Image context processed]";
pub const AUDIO_PLACEHOLDER: &str = "[Audio context processed]";
pub const VIDEO_PLACEHOLDER: &str = "[Video context processed]";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Feature-hashing embedder: each token lands in a signed bucket, the
/// result is L2-normalized so cosine similarity is a dot product.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn project<'a>(&self, features: impl Iterator<Item = &'a [u8]>) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for feature in features {
            let hash = fnv1a(feature);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::as_bytes);
        Ok(self.project(tokens))
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        if image.is_empty() {
            bail!("cannot embed an empty image");
        }
        // Byte trigrams stand in for visual features
        let features: Vec<&[u8]> = if image.len() < 3 {
            vec![image]
        } else {
            image.windows(3).collect()
        };
        Ok(self.project(features.into_iter()))
    }
}

/// Fixed placeholder descriptions for image and video input
#[derive(Debug, Clone, Default)]
pub struct PlaceholderDescriber;

#[async_trait]
impl ImageDescriber for PlaceholderDescriber {
    async fn describe_image(&self, _image: &[u8]) -> Result<String> {
        Ok(IMAGE_PLACEHOLDER.to_string())
    }
}

#[async_trait]
impl VideoDescriber for PlaceholderDescriber {
    async fn describe_video(&self, _video: &[u8]) -> Result<String> {
        Ok(VIDEO_PLACEHOLDER.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubTranscriber;

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript> {
        Ok(Transcript {
            text: AUDIO_PLACEHOLDER.to_string(),
            language: "en".to_string(),
        })
    }
}

/// Leading whole sentences up to `max_length` words
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSummarizer;

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, text: &str, max_length: usize) -> Result<String> {
        let text = text.trim();
        if text.split_whitespace().count() <= max_length {
            return Ok(text.to_string());
        }

        let mut summary = Vec::new();
        let mut words = 0;
        for sentence in text.split_inclusive(['.', '!', '?']) {
            let sentence = sentence.trim();
            let count = sentence.split_whitespace().count();
            if words + count > max_length {
                break;
            }
            words += count;
            summary.push(sentence);
        }

        if summary.is_empty() {
            // First sentence alone is too long
            let truncated: Vec<&str> = text.split_whitespace().take(max_length).collect();
            return Ok(format!("{}...", truncated.join(" ")));
        }

        Ok(summary.join(" "))
    }
}

/// Word-list sentiment with POSITIVE / NEGATIVE / NEUTRAL labels
#[derive(Debug, Clone, Default)]
pub struct LexiconSentiment;

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "love", "like", "happy", "wonderful", "best",
    "fantastic", "helpful", "nice", "perfect", "enjoy", "awesome",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "poor", "sad", "worst", "horrible", "broken",
    "useless", "angry", "slow", "wrong", "fail", "failed",
];

#[async_trait]
impl SentimentClassifier for LexiconSentiment {
    async fn classify(&self, text: &str) -> Result<Sentiment> {
        let lowered = text.to_lowercase();
        let (mut positive, mut negative) = (0_u32, 0_u32);

        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if POSITIVE_WORDS.contains(&token) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&token) {
                negative += 1;
            }
        }

        let total = (positive + negative) as f32;
        let sentiment = if positive > negative {
            Sentiment {
                label: "POSITIVE".to_string(),
                score: 0.5 + 0.5 * (positive - negative) as f32 / total,
            }
        } else if negative > positive {
            Sentiment {
                label: "NEGATIVE".to_string(),
                score: 0.5 + 0.5 * (negative - positive) as f32 / total,
            }
        } else {
            Sentiment {
                label: "NEUTRAL".to_string(),
                score: 0.5,
            }
        };
        Ok(sentiment)
    }
}

/// Answers with the first context passage of the prompt, or admits it
/// does not know when the context is empty.
#[derive(Debug, Clone, Default)]
pub struct StubLanguageModel;

pub const STUB_UNKNOWN_ANSWER: &str = "I don't know based on the available context.";

#[async_trait]
impl LanguageModel for StubLanguageModel {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let context = prompt
            .split_once(CONTEXT_HEADER)
            .map(|(_, rest)| rest)
            .and_then(|rest| rest.split_once(QUESTION_HEADER))
            .map(|(context, _)| context.trim())
            .unwrap_or_default();

        match context.split("\n\n").map(str::trim).find(|p| !p.is_empty()) {
            Some(passage) => Ok(format!("Based on the available context: {}", passage)),
            None => Ok(STUB_UNKNOWN_ANSWER.to_string()),
        }
    }
}
