//! Gemini speech synthesis.
//!
//! The TTS models stream inline audio parts; this adapter concatenates them
//! and reports the provider MIME type unchanged (typically raw PCM,
//! `audio/L16; rate=24000`). Container wrapping is the pipeline's concern.

use async_trait::async_trait;

use super::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part, PrebuiltVoiceConfig,
    SpeechConfig, VoiceConfig,
};
use super::{prompts, AiError, AiResult, SpeechSynthesizer, SynthesizedAudio};
use crate::models::AudioType;

pub struct GeminiSpeech {
    client: GeminiClient,
}

impl GeminiSpeech {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(
        &self,
        script: &str,
        audio_type: AudioType,
        voice: &str,
    ) -> AiResult<SynthesizedAudio> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(format!(
                "{}\n\n{script}",
                prompts::tts_instruction(audio_type)
            ))])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                }),
                ..Default::default()
            }),
        };

        let response = self.client.generate(&request).await?;
        let blobs = response.inline_blobs();
        let mime_type = blobs
            .first()
            .map(|(mime, _)| mime.clone())
            .ok_or(AiError::EmptyResponse)?;

        let mut bytes = Vec::new();
        for (_, part) in blobs {
            bytes.extend_from_slice(&part);
        }
        if bytes.is_empty() {
            return Err(AiError::EmptyResponse);
        }

        Ok(SynthesizedAudio { bytes, mime_type })
    }
}
