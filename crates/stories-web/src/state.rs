//! Shared application state for the intake service.

use std::sync::Arc;

use stories::ai::Capabilities;
use stories::config::IntakeConfig;
use stories::database::{
    ApiKeyRepository, AssetRepository, FileRepository, JobRepository, SegmentRepository,
};
use stories::messaging::EventPublisher;
use stories::segmentation::SegmentationEngine;
use stories::storage::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobRepository,
    pub segments: SegmentRepository,
    pub assets: AssetRepository,
    pub files: FileRepository,
    pub api_keys: ApiKeyRepository,
    pub store: Arc<dyn ObjectStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub capabilities: Capabilities,
    pub engine: Arc<SegmentationEngine>,
    pub tts_voice: String,
    pub config: IntakeConfig,
}
