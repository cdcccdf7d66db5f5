//! File upload and management endpoints.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthedKey;
use crate::error::ApiError;
use crate::state::AppState;
use stories::database::file_repository::NewFile;
use stories::models::{FileStatus, StoredFile};
use stories::storage::upload_key;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
];

#[derive(Debug, Serialize)]
pub struct FileView {
    pub file_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: FileStatus,
    pub created_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
}

impl From<StoredFile> for FileView {
    fn from(f: StoredFile) -> Self {
        Self {
            file_id: f.id,
            filename: f.filename,
            mime_type: f.mime_type,
            size_bytes: f.size_bytes,
            status: f.status,
            created_at: f.created_at,
            expires_at: f.expires_at,
        }
    }
}

/// Multipart upload, field `file`. The size cap is enforced while the body
/// streams in, and the recorded size is the actual byte count, never a
/// client-claimed length.
pub async fn upload_file(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileView>), ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(sanitize_filename)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing filename".to_string()))?;
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("missing content type".to_string()))?;

        if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(ApiError::UnsupportedMediaType(mime_type));
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::BadRequest(format!("upload aborted: {e}")))?
        {
            if bytes.len() + chunk.len() > state.config.max_file_size {
                return Err(ApiError::FileTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        let file_id = Uuid::new_v4();
        let key_path = upload_key(file_id, &filename);
        let size = bytes.len() as i64;

        state.store.put(&key_path, bytes, &mime_type).await?;

        let file = state
            .files
            .create(&NewFile {
                id: file_id,
                user_id: key.user_id,
                filename,
                mime_type,
                bucket: state.store.bucket().to_string(),
                object_key: key_path,
                size_bytes: size,
                expires_at: Utc::now()
                    + chrono::Duration::from_std(state.config.file_ttl)
                        .unwrap_or_else(|_| chrono::Duration::days(7)),
            })
            .await?;

        return Ok((StatusCode::CREATED, Json(file.into())));
    }

    Err(ApiError::BadRequest("missing field \"file\"".to_string()))
}

pub async fn list_files(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
) -> Result<Json<Vec<FileView>>, ApiError> {
    let files = state.files.list_for_user(key.user_id).await?;
    Ok(Json(files.into_iter().map(FileView::from).collect()))
}

pub async fn get_file(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    Path(id): Path<Uuid>,
) -> Result<Json<FileView>, ApiError> {
    let file = state
        .files
        .fetch_owned(id, key.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(file.into()))
}

pub async fn delete_file(
    State(state): State<AppState>,
    AuthedKey(key): AuthedKey,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let file = state
        .files
        .fetch_owned(id, key.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    state.files.set_status(file.id, FileStatus::Deleted).await?;
    if let Err(e) = state.store.delete(&file.object_key).await {
        tracing::warn!(file = %file.id, "blob delete failed: {}", e);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_stripped_to_basename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\tmp\\a.pdf"), "a.pdf");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
    }

    #[test]
    fn allowlist_covers_spec_types() {
        for mime in [
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/webp",
            "application/pdf",
        ] {
            assert!(ALLOWED_MIME_TYPES.contains(&mime));
        }
        assert!(!ALLOWED_MIME_TYPES.contains(&"text/html"));
    }
}
