//! AI capability adapters.
//!
//! Each generative concern the pipeline needs is a single-method contract:
//! segmentation, narration, speech synthesis, image prompting, image
//! generation, vision extraction, and fact checking. Production wires every
//! trait to Gemini; tests substitute in-memory doubles. Fallback is
//! expressed as an ordered chain of models, not runtime probing of client
//! internals.

use std::sync::Arc;

use async_trait::async_trait;

pub mod gemini;
pub mod image;
pub mod prompts;
pub mod tts;

pub use gemini::GeminiClient;
pub use image::GeminiImage;
pub use tts::GeminiSpeech;

use crate::config::AiConfig;
use crate::models::{AudioType, InputType};

/// Errors from AI providers.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Api(String),

    #[error("missing or invalid API key")]
    Authentication,

    #[error("empty response from model")]
    EmptyResponse,

    #[error("invalid response format: {0}")]
    InvalidResponse(String),
}

pub type AiResult<T> = Result<T, AiError>;

/// Inline audio returned by speech synthesis, before any container wrapping.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FactCheckReport {
    pub verdict: String,
    pub explanation: String,
}

/// Proposes segment boundaries as 0-based, exclusive, ascending grapheme
/// indices ending at the text's grapheme count.
#[async_trait]
pub trait SegmentationModel: Send + Sync {
    async fn propose_boundaries(
        &self,
        text: &str,
        grapheme_count: usize,
        target_count: usize,
        input_type: InputType,
    ) -> AiResult<Vec<usize>>;
}

/// Generates the narration script for one segment.
#[async_trait]
pub trait NarrationModel: Send + Sync {
    async fn narrate(
        &self,
        segment_text: &str,
        audio_type: AudioType,
        input_type: InputType,
    ) -> AiResult<String>;
}

/// Synthesizes speech for a narration script. Implementations may return raw
/// PCM (`audio/L<bits>; rate=<hz>`); the pipeline wraps that in a WAV
/// container.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        script: &str,
        audio_type: AudioType,
        voice: &str,
    ) -> AiResult<SynthesizedAudio>;
}

/// Produces an image-generation prompt for one segment.
#[async_trait]
pub trait ImagePromptModel: Send + Sync {
    async fn image_prompt(&self, segment_text: &str, input_type: InputType) -> AiResult<String>;
}

/// Renders an illustration from a prompt, requesting IMAGE output modality.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> AiResult<GeneratedImage>;
}

/// Extracts text from an uploaded image or PDF, paraphrasing rather than
/// transcribing, in a register parameterized by the input kind.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract_text(
        &self,
        bytes: &[u8],
        mime_type: &str,
        input_type: InputType,
    ) -> AiResult<String>;
}

/// External agent surface only; not wired into the job pipeline.
#[async_trait]
pub trait FactChecker: Send + Sync {
    async fn fact_check(&self, claim: &str) -> AiResult<FactCheckReport>;
}

/// The full capability set handed to the worker and the agent surface.
/// Segmentation and narration are ordered fallback chains (primary first).
#[derive(Clone)]
pub struct Capabilities {
    pub segmentation: Vec<Arc<dyn SegmentationModel>>,
    pub narration: Vec<Arc<dyn NarrationModel>>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub image_prompt: Arc<dyn ImagePromptModel>,
    pub image: Arc<dyn ImageGenerator>,
    pub vision: Arc<dyn VisionExtractor>,
    pub fact_check: Arc<dyn FactChecker>,
}

impl Capabilities {
    /// Wire every capability to Gemini using the configured model names.
    pub fn gemini(config: &AiConfig) -> AiResult<Self> {
        let text = |model: &str| GeminiClient::new(&config.api_key, model, config.timeout);

        let segmentation: Vec<Arc<dyn SegmentationModel>> = vec![
            Arc::new(text(&config.segmentation_model)?),
            Arc::new(text(&config.segmentation_fallback_model)?),
        ];
        let narration: Vec<Arc<dyn NarrationModel>> = vec![
            Arc::new(text(&config.narration_model)?),
            Arc::new(text(&config.narration_fallback_model)?),
        ];

        Ok(Self {
            segmentation,
            narration,
            speech: Arc::new(GeminiSpeech::new(text(&config.tts_model)?)),
            image_prompt: Arc::new(text(&config.narration_model)?),
            image: Arc::new(GeminiImage::new(text(&config.image_model)?)),
            vision: Arc::new(text(&config.vision_model)?),
            fact_check: Arc::new(text(&config.narration_model)?),
        })
    }
}
