//! Gemini image generation.

use async_trait::async_trait;

use super::gemini::{Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part};
use super::{AiError, AiResult, GeneratedImage, ImageGenerator};

pub struct GeminiImage {
    client: GeminiClient,
}

impl GeminiImage {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageGenerator for GeminiImage {
    async fn generate(&self, prompt: &str) -> AiResult<GeneratedImage> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(prompt)])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                ..Default::default()
            }),
        };

        let response = self.client.generate(&request).await?;
        let (mime_type, bytes) = response
            .inline_blobs()
            .into_iter()
            .find(|(mime, _)| mime.starts_with("image/"))
            .ok_or_else(|| AiError::InvalidResponse("no image part in response".to_string()))?;

        Ok(GeneratedImage { bytes, mime_type })
    }
}
