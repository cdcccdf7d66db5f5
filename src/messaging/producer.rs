//! Event emission to the message log.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::debug;

use super::{JobMessage, MessagingError, WebhookMessage};
use crate::config::KafkaConfig;

/// Seam for enqueueing work and terminal events, so intake and executor can
/// be exercised without a broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_job(&self, message: &JobMessage) -> Result<(), MessagingError>;

    async fn publish_webhook_event(&self, message: &WebhookMessage) -> Result<(), MessagingError>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    jobs_topic: String,
    webhooks_topic: String,
}

impl KafkaPublisher {
    pub fn connect(config: &KafkaConfig) -> Result<Self, MessagingError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "10000")
            .create()?;

        Ok(Self {
            producer,
            jobs_topic: config.jobs_topic.clone(),
            webhooks_topic: config.webhooks_topic.clone(),
        })
    }

    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), MessagingError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, Duration::from_secs(10))
            .await
            .map_err(|(e, _)| MessagingError::Kafka(e))?;
        debug!(topic, key, "message published");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish_job(&self, message: &JobMessage) -> Result<(), MessagingError> {
        let payload = serde_json::to_vec(message)?;
        self.send(&self.jobs_topic, &message.job_id.to_string(), &payload)
            .await
    }

    async fn publish_webhook_event(&self, message: &WebhookMessage) -> Result<(), MessagingError> {
        let payload = serde_json::to_vec(message)?;
        self.send(&self.webhooks_topic, &message.job_id.to_string(), &payload)
            .await
    }
}
