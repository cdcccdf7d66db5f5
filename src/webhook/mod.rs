//! Webhook delivery.
//!
//! Builds the terminal-event payload, signs it with the job's secret, makes
//! one attempt per trigger (consumed event or scanner pass), and classifies
//! the result: 2xx is sent, 4xx other than 429 is permanently failed,
//! everything else (5xx, 429, transport) stays pending for the scanner.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::database::{JobRepository, WebhookDeliveryRepository};
use crate::messaging::WebhookMessage;
use crate::models::{Job, JobStatus, WebhookDelivery};

pub mod scanner;

pub const SIGNATURE_HEADER: &str = "X-GS-Signature";
pub const TIMESTAMP_HEADER: &str = "X-GS-Timestamp";
pub const USER_AGENT: &str = "Stories-Webhook/1.0";

/// Callback body. `error` is present iff the job failed; `output_markup`
/// iff it succeeded.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_markup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobErrorBody {
    pub code: String,
    pub message: String,
}

pub fn build_payload(job: &Job) -> WebhookPayload {
    let error = match job.status {
        JobStatus::Failed => Some(JobErrorBody {
            code: job
                .error_code
                .clone()
                .unwrap_or_else(|| "processing_error".to_string()),
            message: job.error_message.clone().unwrap_or_default(),
        }),
        _ => None,
    };

    WebhookPayload {
        job_id: job.id,
        status: job.status,
        finished_at: job.finished_at,
        output_markup: job.output_markup.clone(),
        error,
    }
}

/// Hex HMAC-SHA-256 over the exact serialized payload bytes.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Classified result of one HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Permanent(String),
    Transient(String),
}

/// One signed POST, classified. Pure HTTP: no database access.
pub async fn attempt_once(
    client: &reqwest::Client,
    url: &str,
    body: &[u8],
    secret: Option<&str>,
) -> AttemptOutcome {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .body(body.to_vec());

    if let Some(secret) = secret {
        request = request.header(SIGNATURE_HEADER, sign(secret, body));
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                AttemptOutcome::Delivered
            } else if status.is_client_error() && status.as_u16() != 429 {
                AttemptOutcome::Permanent(format!("HTTP {status}"))
            } else {
                AttemptOutcome::Transient(format!("HTTP {status}"))
            }
        }
        Err(e) => AttemptOutcome::Transient(format!("transport error: {e}")),
    }
}

pub struct WebhookDeliverer {
    client: reqwest::Client,
    jobs: JobRepository,
    deliveries: WebhookDeliveryRepository,
}

impl WebhookDeliverer {
    pub fn new(
        jobs: JobRepository,
        deliveries: WebhookDeliveryRepository,
        config: &WebhookConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            jobs,
            deliveries,
        })
    }

    /// React to one consumed terminal event: create the delivery row if the
    /// job wants callbacks and none exists, then attempt once. Redelivered
    /// events for a job with an existing row are absorbed.
    pub async fn handle_event(&self, message: &WebhookMessage) -> Result<(), sqlx::Error> {
        let Some(job) = self.jobs.fetch(message.job_id).await? else {
            warn!(job_id = %message.job_id, "terminal event for unknown job");
            return Ok(());
        };
        let Some(url) = job.webhook_url.clone() else {
            debug!(job_id = %job.id, "job has no webhook url");
            return Ok(());
        };

        let Some(delivery) = self.deliveries.insert_if_absent(job.id, &url).await? else {
            debug!(job_id = %job.id, "duplicate terminal event absorbed");
            return Ok(());
        };

        self.attempt(&delivery).await
    }

    /// One delivery attempt against the stored row.
    pub async fn attempt(&self, delivery: &WebhookDelivery) -> Result<(), sqlx::Error> {
        let Some(job) = self.jobs.fetch(delivery.job_id).await? else {
            self.deliveries
                .mark_failed(delivery.id, "job no longer exists")
                .await?;
            return Ok(());
        };

        let payload = build_payload(&job);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                self.deliveries
                    .mark_failed(delivery.id, &format!("payload serialization: {e}"))
                    .await?;
                return Ok(());
            }
        };

        self.deliveries.record_attempt(delivery.id).await?;

        match attempt_once(
            &self.client,
            &delivery.url,
            &body,
            job.webhook_secret.as_deref(),
        )
        .await
        {
            AttemptOutcome::Delivered => {
                info!(job_id = %job.id, "webhook delivered");
                self.deliveries.mark_sent(delivery.id).await
            }
            AttemptOutcome::Permanent(reason) => {
                warn!(job_id = %job.id, "webhook permanently failed: {}", reason);
                self.deliveries.mark_failed(delivery.id, &reason).await
            }
            AttemptOutcome::Transient(reason) => {
                warn!(job_id = %job.id, "webhook attempt failed: {}", reason);
                self.deliveries
                    .record_transient_error(delivery.id, &reason)
                    .await
            }
        }
    }
}

/// Consumes `webhooks` messages. Delivery problems never fail the consumer:
/// the scanner owns retries, so the handler always commits.
pub struct WebhookMessageHandler {
    deliverer: Arc<WebhookDeliverer>,
}

impl WebhookMessageHandler {
    pub fn new(deliverer: Arc<WebhookDeliverer>) -> Self {
        Self { deliverer }
    }
}

#[async_trait::async_trait]
impl crate::messaging::MessageHandler for WebhookMessageHandler {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()> {
        let message: WebhookMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("malformed webhooks message, dropping: {}", e);
                return Ok(());
            }
        };

        if let Err(e) = self.deliverer.handle_event(&message).await {
            warn!(job_id = %message.job_id, "webhook handling error: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job(status: JobStatus) -> Job {
        Job {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            api_key_id: Uuid::new_v4(),
            input_type: crate::models::InputType::Educational,
            input_source: crate::models::InputSource::Text,
            segments_count: 3,
            audio_type: crate::models::AudioType::Podcast,
            input_text: "text".to_string(),
            extracted_text: None,
            output_markup: matches!(status, JobStatus::Succeeded)
                .then(|| "[[SEGMENT]]".to_string()),
            status,
            error_code: matches!(status, JobStatus::Failed)
                .then(|| "processing_error".to_string()),
            error_message: matches!(status, JobStatus::Failed)
                .then(|| "segment 1: boom".to_string()),
            webhook_url: Some("https://example.test/hook".to_string()),
            webhook_secret: Some("s3cret".to_string()),
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
        }
    }

    #[test]
    fn payload_error_present_iff_failed() {
        let failed = build_payload(&job(JobStatus::Failed));
        assert!(failed.error.is_some());
        assert!(failed.output_markup.is_none());

        let ok = build_payload(&job(JobStatus::Succeeded));
        assert!(ok.error.is_none());
        assert!(ok.output_markup.is_some());

        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none(), "absent, not null");
    }

    #[test]
    fn signature_round_trips() {
        let body = br#"{"job_id":"x"}"#;
        let signature = sign("s3cret", body);

        let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cret").unwrap();
        mac.update(body);
        mac.verify_slice(&hex::decode(signature).unwrap()).unwrap();
    }

    #[test]
    fn signature_depends_on_secret_and_body() {
        let body = b"payload";
        assert_ne!(sign("a", body), sign("b", body));
        assert_ne!(sign("a", b"payload"), sign("a", b"payload2"));
    }

    #[tokio::test]
    async fn two_hundred_is_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header_exists(TIMESTAMP_HEADER))
            .and(header(SIGNATURE_HEADER, sign("k", b"body").as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let outcome =
            attempt_once(&client, &format!("{}/hook", server.uri()), b"body", Some("k")).await;
        assert_eq!(outcome, AttemptOutcome::Delivered);
    }

    #[tokio::test]
    async fn four_ten_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let outcome = attempt_once(&client, &server.uri(), b"{}", None).await;
        assert!(matches!(outcome, AttemptOutcome::Permanent(_)));
    }

    #[tokio::test]
    async fn five_oh_three_and_429_are_transient() {
        for status in [503u16, 429] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let client = reqwest::Client::new();
            let outcome = attempt_once(&client, &server.uri(), b"{}", None).await;
            assert!(
                matches!(outcome, AttemptOutcome::Transient(_)),
                "status {status} must stay retryable"
            );
        }
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let client = reqwest::Client::new();
        // Nothing listens on this port.
        let outcome = attempt_once(&client, "http://127.0.0.1:9", b"{}", None).await;
        assert!(matches!(outcome, AttemptOutcome::Transient(_)));
    }

    #[tokio::test]
    async fn unsigned_when_no_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let outcome = attempt_once(&client, &server.uri(), b"{}", None).await;
        assert_eq!(outcome, AttemptOutcome::Delivered);

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
    }
}
