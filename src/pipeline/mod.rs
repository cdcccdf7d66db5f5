//! Per-segment enrichment pipeline.
//!
//! Four capability calls in sequence: narration, speech synthesis, image
//! prompting, image generation. Narration and image prompting degrade
//! gracefully (fallback model, then empty script / deterministic prompt);
//! speech synthesis and image generation failures fail the segment. An empty
//! narration script skips TTS entirely and creates no audio asset.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ai::{AiError, Capabilities};
use crate::database::{asset_repository::NewAsset, AssetRepository, SegmentRepository};
use crate::models::{AssetKind, Job, SegmentRow, SegmentStatus};
use crate::storage::{segment_asset_key, ObjectStore, StorageError};

pub mod wav;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{stage}: {source}")]
    Capability {
        stage: &'static str,
        #[source]
        source: AiError,
    },
}

/// Model names recorded into asset metadata, plus the configured TTS voice.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tts_voice: String,
    pub tts_model: String,
    pub image_model: String,
}

pub struct SegmentPipeline {
    capabilities: Capabilities,
    store: Arc<dyn ObjectStore>,
    segments: SegmentRepository,
    assets: AssetRepository,
    settings: PipelineSettings,
}

impl SegmentPipeline {
    pub fn new(
        capabilities: Capabilities,
        store: Arc<dyn ObjectStore>,
        segments: SegmentRepository,
        assets: AssetRepository,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            capabilities,
            store,
            segments,
            assets,
            settings,
        }
    }

    /// Run the full pipeline for one segment. On failure, the segment is
    /// marked `failed` and the error is returned for the executor to
    /// propagate.
    pub async fn process_segment(&self, job: &Job, segment: &SegmentRow) -> Result<(), PipelineError> {
        self.segments
            .set_status(segment.id, SegmentStatus::Running)
            .await?;

        match self.run(job, segment).await {
            Ok(()) => {
                self.segments
                    .set_status(segment.id, SegmentStatus::Succeeded)
                    .await?;
                Ok(())
            }
            Err(e) => {
                if let Err(mark) = self
                    .segments
                    .set_status(segment.id, SegmentStatus::Failed)
                    .await
                {
                    warn!(segment = %segment.id, "failed to mark segment failed: {}", mark);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, job: &Job, segment: &SegmentRow) -> Result<(), PipelineError> {
        let script = self.narrate(job, segment).await;

        if script.is_empty() {
            info!(job = %job.id, idx = segment.idx, "empty narration script, skipping TTS");
        } else {
            self.synthesize_audio(job, segment, &script).await?;
        }

        let prompt = self.image_prompt(job, segment).await;
        self.generate_image(job, segment, &prompt).await?;

        Ok(())
    }

    /// Narration with the model chain: first model producing a non-empty
    /// script wins; if the whole chain fails, the script is empty.
    async fn narrate(&self, job: &Job, segment: &SegmentRow) -> String {
        for model in &self.capabilities.narration {
            match model
                .narrate(&segment.text, job.audio_type, job.input_type)
                .await
            {
                Ok(script) if !script.trim().is_empty() => return script,
                Ok(_) => {
                    warn!(job = %job.id, idx = segment.idx, "narration model returned empty script");
                }
                Err(e) => {
                    warn!(job = %job.id, idx = segment.idx, "narration model failed: {}", e);
                }
            }
        }
        String::new()
    }

    async fn synthesize_audio(
        &self,
        job: &Job,
        segment: &SegmentRow,
        script: &str,
    ) -> Result<(), PipelineError> {
        let audio = self
            .capabilities
            .speech
            .synthesize(script, job.audio_type, &self.settings.tts_voice)
            .await
            .map_err(|e| PipelineError::Capability {
                stage: "speech synthesis",
                source: e,
            })?;

        // Raw PCM gets a WAV container; anything already containerized is
        // stored as-is.
        let (bytes, mime_type) = match wav::parse_pcm_mime(&audio.mime_type) {
            Some(format) => (
                wav::wrap_pcm_in_wav(&audio.bytes, format),
                "audio/wav".to_string(),
            ),
            None => (audio.bytes, audio.mime_type),
        };

        let key = segment_asset_key(job.id, segment.idx, &format!("audio.{}", audio_ext(&mime_type)));
        let size = bytes.len() as i64;
        self.store.put(&key, bytes, &mime_type).await?;

        self.assets
            .create(&NewAsset {
                job_id: job.id,
                segment_id: Some(segment.id),
                kind: AssetKind::Audio,
                mime_type,
                bucket: self.store.bucket().to_string(),
                object_key: key,
                size_bytes: size,
                checksum: None,
                metadata: serde_json::json!({
                    "model": self.settings.tts_model,
                    "voice": self.settings.tts_voice,
                    "duration_secs": estimate_duration_secs(script),
                }),
            })
            .await?;

        Ok(())
    }

    /// Image prompt with fallback: model output, or a deterministic
    /// style-prefixed prompt from the head of the segment.
    async fn image_prompt(&self, job: &Job, segment: &SegmentRow) -> String {
        match self
            .capabilities
            .image_prompt
            .image_prompt(&segment.text, job.input_type)
            .await
        {
            Ok(prompt) if !prompt.trim().is_empty() => prompt,
            Ok(_) | Err(_) => fallback_image_prompt(&segment.text, job.input_type),
        }
    }

    async fn generate_image(
        &self,
        job: &Job,
        segment: &SegmentRow,
        prompt: &str,
    ) -> Result<(), PipelineError> {
        let image = self
            .capabilities
            .image
            .generate(prompt)
            .await
            .map_err(|e| PipelineError::Capability {
                stage: "image generation",
                source: e,
            })?;

        let key = segment_asset_key(
            job.id,
            segment.idx,
            &format!("image.{}", image_ext(&image.mime_type)),
        );
        let size = image.bytes.len() as i64;
        self.store.put(&key, image.bytes, &image.mime_type).await?;

        self.assets
            .create(&NewAsset {
                job_id: job.id,
                segment_id: Some(segment.id),
                kind: AssetKind::Image,
                mime_type: image.mime_type,
                bucket: self.store.bucket().to_string(),
                object_key: key,
                size_bytes: size,
                checksum: None,
                metadata: serde_json::json!({
                    "model": self.settings.image_model,
                    "prompt": prompt,
                }),
            })
            .await?;

        Ok(())
    }
}

/// Estimated narration length: ~5 characters per word at 150 words/minute.
pub fn estimate_duration_secs(script: &str) -> f64 {
    (script.len() as f64 / 5.0) / 150.0 * 60.0
}

/// Deterministic fallback prompt from the first 200 characters of the
/// segment, prefixed with the per-kind style.
pub fn fallback_image_prompt(segment_text: &str, input_type: crate::models::InputType) -> String {
    let mut head: &str = segment_text;
    if head.len() > 200 {
        let mut cut = 200;
        while !head.is_char_boundary(cut) {
            cut -= 1;
        }
        head = &head[..cut];
    }
    format!(
        "{}, illustrating: {}",
        crate::ai::prompts::style_prefix(input_type),
        head.trim()
    )
}

fn audio_ext(mime: &str) -> &'static str {
    match mime {
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}

fn image_ext(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InputType;

    #[test]
    fn duration_estimate_matches_formula() {
        // 750 chars -> 150 words -> one minute.
        let script = "x".repeat(750);
        assert!((estimate_duration_secs(&script) - 60.0).abs() < f64::EPSILON);
        assert_eq!(estimate_duration_secs(""), 0.0);
    }

    #[test]
    fn fallback_prompt_truncates_on_char_boundary() {
        let text = "é".repeat(300); // 2 bytes each; 200 is mid-char
        let prompt = fallback_image_prompt(&text, InputType::Fictional);
        assert!(prompt.starts_with("atmospheric digital painting"));
        // must not panic and must stay under the style prefix + ~200 bytes
        assert!(prompt.len() < 300);
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(image_ext("image/png"), "png");
        assert_eq!(image_ext("image/jpeg"), "jpg");
        assert_eq!(image_ext("image/webp"), "webp");
        assert_eq!(image_ext("image/gif"), "gif");
        assert_eq!(image_ext("application/octet-stream"), "png");
        assert_eq!(audio_ext("audio/wav"), "wav");
        assert_eq!(audio_ext("audio/mpeg"), "mp3");
    }
}
