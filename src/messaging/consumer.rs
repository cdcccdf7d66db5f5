//! Consumer loop shared by the worker and the dispatcher.
//!
//! One consumer group per process, manual commits. A handler returning `Ok`
//! means the message is done (including handled failures recorded in the
//! database) and its offset is committed. A handler returning `Err` signals
//! an infrastructure problem: the error is logged and the offset is NOT
//! committed, so the message is redelivered after a rebalance or restart.

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::ClientConfig;
use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::MessagingError;
use crate::config::KafkaConfig;

/// Message processing seam.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()>;
}

/// Build a manual-commit consumer subscribed to one topic.
pub fn create_consumer(
    config: &KafkaConfig,
    group_id: &str,
    topic: &str,
) -> Result<StreamConsumer, MessagingError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "30000")
        .create()?;

    consumer.subscribe(&[topic])?;
    Ok(consumer)
}

/// Consume until the token is cancelled. The in-flight message completes
/// before the reader closes.
pub async fn run_consumer<H: MessageHandler>(
    consumer: StreamConsumer,
    handler: H,
    shutdown: CancellationToken,
) {
    info!("consumer loop started");

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("consumer shutting down");
                break;
            }
            received = consumer.recv() => received,
        };

        match message {
            Ok(message) => {
                let payload = message.payload().unwrap_or_default();
                match handler.handle(payload).await {
                    Ok(()) => {
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            warn!("offset commit failed: {}", e);
                        }
                    }
                    Err(e) => {
                        // Leave the offset uncommitted; redelivery retries.
                        error!("handler error, offset not committed: {:#}", e);
                    }
                }
            }
            Err(e) => {
                error!("kafka receive error: {}", e);
            }
        }
    }
}
