//! Asset read endpoints: metadata and the content byte stream.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthedKey;
use crate::error::ApiError;
use crate::state::AppState;
use stories::models::AssetKind;

#[derive(Debug, Serialize)]
pub struct AssetDetail {
    pub id: Uuid,
    pub job_id: Uuid,
    pub segment_id: Option<Uuid>,
    pub kind: AssetKind,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: serde_json::Value,
    pub download_url: String,
}

pub async fn get_asset(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    Path(id): Path<Uuid>,
) -> Result<Json<AssetDetail>, ApiError> {
    let asset = state
        .assets
        .fetch_owned(id, key.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(AssetDetail {
        id: asset.id,
        job_id: asset.job_id,
        segment_id: asset.segment_id,
        kind: asset.kind,
        mime_type: asset.mime_type,
        size_bytes: asset.size_bytes,
        metadata: asset.metadata,
        download_url: format!("/v1/assets/{}/content", asset.id),
    }))
}

pub async fn get_asset_content(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let asset = state
        .assets
        .fetch_owned(id, key.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let bytes = state.store.get(&asset.object_key).await?;

    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&asset.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(asset.size_bytes as u64),
    );

    Ok(response)
}
