//! Worker process.
//!
//! Consumes `jobs` messages and drives each job through segmentation, the
//! per-segment pipeline, and markup composition, emitting a terminal event
//! on the `webhooks` topic.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stories::ai::Capabilities;
use stories::config::{AiConfig, DatabaseConfig, KafkaConfig, StorageConfig, WorkerConfig};
use stories::database::{
    AssetRepository, DatabaseManager, FileRepository, JobRepository, PgBoundaryCache,
    SegmentRepository,
};
use stories::jobs::{JobExecutor, JobMessageHandler};
use stories::messaging::{consumer, KafkaPublisher};
use stories::pipeline::{PipelineSettings, SegmentPipeline};
use stories::segmentation::SegmentationEngine;
use stories::storage::S3ObjectStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stories=info,worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting stories worker");

    let db_config = DatabaseConfig::from_env();
    let kafka_config = KafkaConfig::from_env();
    let storage_config = StorageConfig::from_env();
    let ai_config = AiConfig::from_env();
    let worker_config = WorkerConfig::from_env();

    let db = DatabaseManager::connect(&db_config).await?;
    db.run_migrations().await?;
    let pool = db.pool().clone();

    let store = Arc::new(S3ObjectStore::connect(&storage_config).await);
    let capabilities = Capabilities::gemini(&ai_config)?;

    let engine = SegmentationEngine::new(
        capabilities.segmentation.clone(),
        Arc::new(PgBoundaryCache::new(pool.clone())),
        worker_config.rule_based_fallback,
    );

    let pipeline = Arc::new(SegmentPipeline::new(
        capabilities.clone(),
        store.clone(),
        SegmentRepository::new(pool.clone()),
        AssetRepository::new(pool.clone()),
        PipelineSettings {
            tts_voice: ai_config.tts_voice.clone(),
            tts_model: ai_config.tts_model.clone(),
            image_model: ai_config.image_model.clone(),
        },
    ));

    let publisher = Arc::new(KafkaPublisher::connect(&kafka_config)?);

    let executor = JobExecutor::new(
        JobRepository::new(pool.clone()),
        SegmentRepository::new(pool.clone()),
        AssetRepository::new(pool.clone()),
        FileRepository::new(pool.clone()),
        store,
        capabilities.vision.clone(),
        engine,
        pipeline,
        publisher,
        worker_config.max_concurrent_segments,
    );

    let jobs_consumer = consumer::create_consumer(
        &kafka_config,
        &kafka_config.worker_group,
        &kafka_config.jobs_topic,
    )?;

    let shutdown = stories::shutdown::shutdown_token();
    consumer::run_consumer(jobs_consumer, JobMessageHandler::new(executor), shutdown).await;

    tracing::info!("worker stopped");
    Ok(())
}
