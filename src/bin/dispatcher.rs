//! Dispatcher process.
//!
//! Consumes terminal events from the `webhooks` topic, makes the first
//! delivery attempt, and runs the background scanner that retries pending
//! deliveries with exponential backoff.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stories::config::{DatabaseConfig, KafkaConfig, WebhookConfig};
use stories::database::{DatabaseManager, JobRepository, WebhookDeliveryRepository};
use stories::messaging::consumer;
use stories::webhook::{scanner, WebhookDeliverer, WebhookMessageHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stories=info,dispatcher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting stories dispatcher");

    let db_config = DatabaseConfig::from_env();
    let kafka_config = KafkaConfig::from_env();
    let webhook_config = WebhookConfig::from_env();

    let db = DatabaseManager::connect(&db_config).await?;
    db.run_migrations().await?;
    let pool = db.pool().clone();

    let deliveries = WebhookDeliveryRepository::new(pool.clone());
    let deliverer = Arc::new(WebhookDeliverer::new(
        JobRepository::new(pool.clone()),
        deliveries.clone(),
        &webhook_config,
    )?);

    let webhooks_consumer = consumer::create_consumer(
        &kafka_config,
        &kafka_config.dispatcher_group,
        &kafka_config.webhooks_topic,
    )?;

    let shutdown = stories::shutdown::shutdown_token();

    let scanner_task = tokio::spawn(scanner::run_scanner(
        deliverer.clone(),
        deliveries,
        webhook_config,
        shutdown.clone(),
    ));

    consumer::run_consumer(
        webhooks_consumer,
        WebhookMessageHandler::new(deliverer),
        shutdown,
    )
    .await;

    let _ = scanner_task.await;
    tracing::info!("dispatcher stopped");
    Ok(())
}
