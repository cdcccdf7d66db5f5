//! Domain model shared across the intake service, worker, and dispatcher.
//!
//! These rows map 1:1 onto the tables created by the embedded migrations.
//! Status enums are stored as lowercase VARCHAR and serialized the same way
//! on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of source material a job was submitted with. Drives the breakpoint
/// guidance given to the segmentation model and the paraphrasing register of
/// vision extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Educational,
    Financial,
    Fictional,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Educational => "educational",
            Self::Financial => "financial",
            Self::Fictional => "fictional",
        }
    }
}

/// Where the segmentation input comes from. Derived at job creation from the
/// presence of `text` and `file_ids` in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Text,
    Files,
    Mixed,
}

/// Narration register requested for the audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AudioType {
    FreeSpeech,
    Podcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Terminal states are sticky: redelivered work messages for these jobs
    /// are absorbed without re-execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub input_type: InputType,
    pub input_source: InputSource,
    pub segments_count: i32,
    pub audio_type: AudioType,
    pub input_text: String,
    pub extracted_text: Option<String>,
    pub output_markup: Option<String>,
    pub status: JobStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip)]
    pub webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The text the segmentation engine runs over: extracted text for file
    /// inputs, the submitted text otherwise.
    pub fn segmentation_input(&self) -> &str {
        match self.input_source {
            InputSource::Text => &self.input_text,
            InputSource::Files | InputSource::Mixed => {
                self.extracted_text.as_deref().unwrap_or(&self.input_text)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// One logical segment of a job's input. `start_char`/`end_char` are byte
/// offsets into the segmentation input and always lie on UTF-8 boundaries;
/// segments of a job are contiguous, non-overlapping, and cover the input.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SegmentRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub idx: i32,
    pub start_char: i64,
    pub end_char: i64,
    pub title: Option<String>,
    pub text: String,
    pub status: SegmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Audio,
}

/// A generated blob (audio clip or image) stored in the object store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Asset {
    pub id: Uuid,
    pub job_id: Uuid,
    pub segment_id: Option<Uuid>,
    pub kind: AssetKind,
    pub mime_type: String,
    pub bucket: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ready,
    Deleted,
}

/// An uploaded input blob (image or PDF) owned by a user, with an independent
/// expiry lifecycle.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub bucket: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Pending,
    Done,
    Failed,
}

/// Link between a job and an uploaded file, in declared processing order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobFile {
    pub job_id: Uuid,
    pub file_id: Uuid,
    pub position: i32,
    pub extraction_status: ExtractionStatus,
    pub extracted_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Disabled,
}

/// Character-quota accounting window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl QuotaPeriod {
    /// Window length. Month and year use fixed 30/365-day windows; the
    /// period is a rolling budget, not a calendar bucket.
    pub fn length(&self) -> chrono::Duration {
        match self {
            Self::Daily => chrono::Duration::days(1),
            Self::Weekly => chrono::Duration::days(7),
            Self::Monthly => chrono::Duration::days(30),
            Self::Yearly => chrono::Duration::days(365),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub secret_hash: String,
    pub lookup_hash: String,
    pub status: KeyStatus,
    pub quota_period: QuotaPeriod,
    pub quota_chars: i64,
    pub used_chars: i64,
    pub period_started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// Webhook delivery bookkeeping. At most one row per job: redelivered
/// terminal events are absorbed by the UNIQUE constraint on `job_id`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn audio_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&AudioType::FreeSpeech).unwrap(),
            "\"free_speech\""
        );
        assert_eq!(
            serde_json::to_string(&AudioType::Podcast).unwrap(),
            "\"podcast\""
        );
    }

    #[test]
    fn quota_period_lengths_ascend() {
        let mut prev = chrono::Duration::zero();
        for period in [
            QuotaPeriod::Daily,
            QuotaPeriod::Weekly,
            QuotaPeriod::Monthly,
            QuotaPeriod::Yearly,
        ] {
            assert!(period.length() > prev);
            prev = period.length();
        }
    }
}
