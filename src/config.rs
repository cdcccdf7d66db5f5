//! Environment-driven configuration.
//!
//! Every binary reads its configuration from environment variables with
//! sensible defaults, after loading `.env` via `dotenvy`. Each subsystem owns
//! a small config struct with a `from_env()` constructor.

use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Connection pool settings for the relational store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", "postgresql://localhost/stories"),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 25),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 5),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(300),
        }
    }
}

/// Message-log addresses and topic names.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub jobs_topic: String,
    pub webhooks_topic: String,
    pub worker_group: String,
    pub dispatcher_group: String,
}

impl KafkaConfig {
    pub fn from_env() -> Self {
        Self {
            brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            jobs_topic: env_or("KAFKA_JOBS_TOPIC", "jobs"),
            webhooks_topic: env_or("KAFKA_WEBHOOKS_TOPIC", "webhooks"),
            worker_group: env_or("KAFKA_WORKER_GROUP", "stories-worker"),
            dispatcher_group: env_or("KAFKA_DISPATCHER_GROUP", "stories-dispatcher"),
        }
    }
}

/// Object-store endpoint and bucket.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Path-style addressing, required by MinIO-style endpoints.
    pub force_path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            region: env_or("S3_REGION", "us-east-1"),
            bucket: env_or("S3_BUCKET", "stories"),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
            force_path_style: env_parse("S3_FORCE_PATH_STYLE", true),
        }
    }
}

/// AI provider keys and model names. Primary/fallback pairs drive the
/// fallback chains for segmentation and narration.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub segmentation_model: String,
    pub segmentation_fallback_model: String,
    pub narration_model: String,
    pub narration_fallback_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub image_model: String,
    pub vision_model: String,
    pub timeout: Duration,
}

impl AiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_or("GEMINI_API_KEY", ""),
            segmentation_model: env_or("SEGMENTATION_MODEL", "gemini-2.5-flash"),
            segmentation_fallback_model: env_or("SEGMENTATION_FALLBACK_MODEL", "gemini-2.5-flash-lite"),
            narration_model: env_or("NARRATION_MODEL", "gemini-2.5-flash"),
            narration_fallback_model: env_or("NARRATION_FALLBACK_MODEL", "gemini-2.5-flash-lite"),
            tts_model: env_or("TTS_MODEL", "gemini-2.5-flash-preview-tts"),
            tts_voice: env_or("TTS_VOICE", "Kore"),
            image_model: env_or("IMAGE_MODEL", "gemini-2.0-flash-preview-image-generation"),
            vision_model: env_or("VISION_MODEL", "gemini-2.5-flash"),
            timeout: Duration::from_secs(env_parse("AI_TIMEOUT_SECONDS", 120)),
        }
    }
}

/// Worker-side execution limits.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on concurrently processed segments within one job.
    pub max_concurrent_segments: usize,
    /// Whether the rule-based splitter runs when both segmentation models
    /// fail. Off, the failure path yields a single whole-text segment.
    pub rule_based_fallback: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrent_segments: env_parse("MAX_CONCURRENT_SEGMENTS", 4).max(1),
            rule_based_fallback: env_parse("RULE_BASED_FALLBACK", false),
        }
    }
}

/// Webhook delivery and retry-scanner parameters.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: i32,
    pub http_timeout: Duration,
    pub scan_interval: Duration,
    pub scan_batch_size: i64,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        Self {
            base_delay: Duration::from_secs(env_parse("WEBHOOK_BASE_DELAY_SECONDS", 30)),
            max_delay: Duration::from_secs(env_parse("WEBHOOK_MAX_DELAY_SECONDS", 24 * 3600)),
            max_retries: env_parse("WEBHOOK_MAX_RETRIES", 10),
            http_timeout: Duration::from_secs(30),
            scan_interval: Duration::from_secs(10),
            scan_batch_size: 100,
        }
    }
}

/// Intake-side validation limits and quota defaults.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub listen_port: u16,
    pub max_segments: i32,
    pub max_file_size: usize,
    /// Characters charged against the quota per attached file.
    pub chars_per_file: i64,
    pub file_ttl: Duration,
}

impl IntakeConfig {
    pub fn from_env() -> Self {
        Self {
            listen_port: env_parse("SERVER_PORT", 8080),
            max_segments: env_parse("MAX_SEGMENTS", 20),
            max_file_size: env_parse("MAX_FILE_SIZE", 20 * 1024 * 1024),
            chars_per_file: env_parse("QUOTA_CHARS_PER_FILE", 10_000),
            file_ttl: Duration::from_secs(env_parse("FILE_TTL_SECONDS", 7 * 24 * 3600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Unset keys fall back to documented defaults.
        let webhook = WebhookConfig {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(86400),
            max_retries: 10,
            http_timeout: Duration::from_secs(30),
            scan_interval: Duration::from_secs(10),
            scan_batch_size: 100,
        };
        assert_eq!(webhook.base_delay, Duration::from_secs(30));
        assert_eq!(webhook.max_delay, Duration::from_secs(86400));
        assert_eq!(webhook.max_retries, 10);
    }

    #[test]
    fn worker_concurrency_clamped_to_one() {
        std::env::set_var("MAX_CONCURRENT_SEGMENTS", "0");
        let cfg = WorkerConfig::from_env();
        assert_eq!(cfg.max_concurrent_segments, 1);
        std::env::remove_var("MAX_CONCURRENT_SEGMENTS");
    }
}
