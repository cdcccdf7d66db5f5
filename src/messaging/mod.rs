//! At-least-once messaging substrate.
//!
//! Two topics, both keyed by the job id string for partition stickiness:
//! `jobs` carries work messages for the worker, `webhooks` carries terminal
//! events for the dispatcher. Offsets are committed only after the handler
//! returns; the job state machine is the idempotency barrier, not the log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod consumer;
pub mod producer;

pub use consumer::{run_consumer, MessageHandler};
pub use producer::{EventPublisher, KafkaPublisher};

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Body of a `jobs` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: Uuid,
    pub trace_id: String,
}

/// Terminal event kinds on the `webhooks` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    JobCompleted,
    JobFailed,
}

/// Body of a `webhooks` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMessage {
    pub job_id: Uuid,
    pub event: JobEvent,
    pub trace_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_message_wire_shape() {
        let msg = JobMessage {
            job_id: Uuid::nil(),
            trace_id: "t-1".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "job_id": "00000000-0000-0000-0000-000000000000",
                "trace_id": "t-1"
            })
        );
    }

    #[test]
    fn webhook_event_wire_shape() {
        let msg = WebhookMessage {
            job_id: Uuid::nil(),
            event: JobEvent::JobCompleted,
            trace_id: "t-2".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "job_completed");

        let failed = serde_json::to_string(&JobEvent::JobFailed).unwrap();
        assert_eq!(failed, "\"job_failed\"");
    }
}
