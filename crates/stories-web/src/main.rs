//! Stories intake service.
//!
//! HTTP JSON API for job submission, file uploads, and asset reads, plus the
//! MCP agent endpoint. Persists jobs, charges quota, and enqueues work
//! messages; execution happens in the worker process.

mod auth;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stories::ai::Capabilities;
use stories::config::{AiConfig, DatabaseConfig, IntakeConfig, KafkaConfig, StorageConfig, WorkerConfig};
use stories::database::{
    ApiKeyRepository, AssetRepository, DatabaseManager, FileRepository, JobRepository,
    PgBoundaryCache, SegmentRepository,
};
use stories::messaging::KafkaPublisher;
use stories::segmentation::SegmentationEngine;
use stories::storage::S3ObjectStore;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stories=info,stories_web=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting stories intake service");

    let db_config = DatabaseConfig::from_env();
    let kafka_config = KafkaConfig::from_env();
    let storage_config = StorageConfig::from_env();
    let ai_config = AiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    let intake_config = IntakeConfig::from_env();

    let db = DatabaseManager::connect(&db_config).await?;
    db.run_migrations().await?;
    let pool = db.pool().clone();

    let store = Arc::new(S3ObjectStore::connect(&storage_config).await);
    let capabilities = Capabilities::gemini(&ai_config)?;
    let engine = Arc::new(SegmentationEngine::new(
        capabilities.segmentation.clone(),
        Arc::new(PgBoundaryCache::new(pool.clone())),
        worker_config.rule_based_fallback,
    ));
    let publisher = Arc::new(KafkaPublisher::connect(&kafka_config)?);

    let max_file_size = intake_config.max_file_size;
    let listen_port = intake_config.listen_port;

    let app_state = AppState {
        jobs: JobRepository::new(pool.clone()),
        segments: SegmentRepository::new(pool.clone()),
        assets: AssetRepository::new(pool.clone()),
        files: FileRepository::new(pool.clone()),
        api_keys: ApiKeyRepository::new(pool.clone()),
        store,
        publisher,
        capabilities,
        engine,
        tts_voice: ai_config.tts_voice.clone(),
        config: intake_config,
    };

    let api = Router::new()
        .route(
            "/v1/jobs",
            post(routes::jobs::create_job).get(routes::jobs::list_jobs),
        )
        .route("/v1/jobs/:id", get(routes::jobs::get_job))
        .route(
            "/v1/files",
            post(routes::files::upload_file).get(routes::files::list_files),
        )
        .route(
            "/v1/files/:id",
            get(routes::files::get_file).delete(routes::files::delete_file),
        )
        .route("/v1/assets/:id", get(routes::assets::get_asset))
        .route("/v1/assets/:id/content", get(routes::assets::get_asset_content))
        .layer(TimeoutLayer::new(Duration::from_secs(15)));

    // The agent endpoint gets a longer deadline: tool calls hit providers.
    let agent = Router::new()
        .route("/mcp", post(routes::mcp::handle))
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(api)
        .merge(agent)
        .layer(DefaultBodyLimit::max(max_file_size + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    tracing::info!("intake service listening on http://{}", addr);

    let shutdown = stories::shutdown::shutdown_token();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("intake service stopped");
    Ok(())
}
