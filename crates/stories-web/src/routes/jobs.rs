//! Job submission and read endpoints.

use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthedKey;
use crate::error::ApiError;
use crate::state::AppState;
use stories::database::job_repository::NewJob;
use stories::database::QuotaOutcome;
use stories::messaging::JobMessage;
use stories::models::{
    AudioType, ExtractionStatus, FileStatus, InputSource, InputType, Job, JobStatus,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_ids: Option<Vec<Uuid>>,
    #[serde(rename = "type")]
    pub input_type: InputType,
    // Older clients still send pictures_count.
    #[serde(alias = "pictures_count")]
    pub segments_count: i32,
    pub audio_type: AudioType,
    #[serde(default)]
    pub webhook: Option<WebhookSpec>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookSpec {
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

pub async fn create_job(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let text = request.text.unwrap_or_default();
    let file_ids = request.file_ids.unwrap_or_default();

    if text.trim().is_empty() && file_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of text or file_ids is required".to_string(),
        ));
    }
    if request.segments_count < 1 || request.segments_count > state.config.max_segments {
        return Err(ApiError::BadRequest(format!(
            "segments_count must be between 1 and {}",
            state.config.max_segments
        )));
    }

    let mut seen = HashSet::new();
    if !file_ids.iter().all(|id| seen.insert(*id)) {
        return Err(ApiError::BadRequest("duplicate file_ids".to_string()));
    }

    for file_id in &file_ids {
        let file = state
            .files
            .fetch_owned(*file_id, key.user_id)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("file {file_id} not found")))?;
        if file.status != FileStatus::Ready {
            return Err(ApiError::BadRequest(format!("file {file_id} is not ready")));
        }
    }

    let charge =
        text.chars().count() as i64 + state.config.chars_per_file * file_ids.len() as i64;
    let outcome = state
        .api_keys
        .charge_quota(key.id, key.quota_period, charge)
        .await?;
    if outcome == QuotaOutcome::Exceeded {
        return Err(ApiError::QuotaExceeded);
    }

    let input_source = match (!text.trim().is_empty(), !file_ids.is_empty()) {
        (true, true) => InputSource::Mixed,
        (false, true) => InputSource::Files,
        _ => InputSource::Text,
    };

    let job = state
        .jobs
        .create(&NewJob {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            api_key_id: key.id,
            input_type: request.input_type,
            input_source,
            segments_count: request.segments_count,
            audio_type: request.audio_type,
            input_text: text,
            webhook_url: request.webhook.as_ref().map(|w| w.url.clone()),
            webhook_secret: request.webhook.and_then(|w| w.secret),
        })
        .await?;

    if !file_ids.is_empty() {
        state.files.link_to_job(job.id, &file_ids).await?;
    }

    state
        .publisher
        .publish_job(&JobMessage {
            job_id: job.id,
            trace_id: Uuid::new_v4().to_string(),
        })
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse {
            job_id: job.id,
            status: job.status,
            created_at: job.created_at,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct AssetView {
    pub id: Uuid,
    pub kind: stories::models::AssetKind,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: serde_json::Value,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct SegmentView {
    pub id: Uuid,
    pub idx: i32,
    pub title: Option<String>,
    pub text: String,
    pub status: stories::models::SegmentStatus,
    pub start_char: i64,
    pub end_char: i64,
    pub assets: Vec<AssetView>,
}

#[derive(Debug, Serialize)]
pub struct FileExtractionView {
    pub file_id: Uuid,
    pub filename: String,
    pub extraction_status: ExtractionStatus,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub segments: Vec<SegmentView>,
    pub files: Vec<FileExtractionView>,
}

fn download_url(asset_id: Uuid) -> String {
    format!("/v1/assets/{asset_id}/content")
}

pub async fn get_job(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    let job = state
        .jobs
        .fetch_owned(id, key.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let segments = state.segments.list_for_job(job.id).await?;
    let assets = state.assets.list_for_job(job.id).await?;
    let sources = state.files.job_files(job.id).await?;

    let segments = segments
        .into_iter()
        .map(|seg| {
            let assets = assets
                .iter()
                .filter(|a| a.segment_id == Some(seg.id))
                .map(|a| AssetView {
                    id: a.id,
                    kind: a.kind,
                    mime_type: a.mime_type.clone(),
                    size_bytes: a.size_bytes,
                    metadata: a.metadata.clone(),
                    download_url: download_url(a.id),
                })
                .collect();
            SegmentView {
                id: seg.id,
                idx: seg.idx,
                title: seg.title,
                text: seg.text,
                status: seg.status,
                start_char: seg.start_char,
                end_char: seg.end_char,
                assets,
            }
        })
        .collect();

    let files = sources
        .into_iter()
        .map(|(link, file)| FileExtractionView {
            file_id: file.id,
            filename: file.filename,
            extraction_status: link.extraction_status,
        })
        .collect();

    Ok(Json(JobView {
        job,
        segments,
        files,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub segments_count: i32,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let before = match &query.cursor {
        None => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| ApiError::BadRequest("invalid cursor".to_string()))?
                .with_timezone(&Utc),
        ),
    };

    let jobs = state.jobs.list_for_user(key.user_id, limit, before).await?;
    let next_cursor = (jobs.len() as i64 == limit)
        .then(|| jobs.last().map(|j| j.created_at.to_rfc3339()))
        .flatten();

    let jobs = jobs
        .into_iter()
        .map(|j| JobSummary {
            job_id: j.id,
            status: j.status,
            input_type: j.input_type,
            segments_count: j.segments_count,
            created_at: j.created_at,
            finished_at: j.finished_at,
        })
        .collect();

    Ok(Json(ListJobsResponse { jobs, next_cursor }))
}
