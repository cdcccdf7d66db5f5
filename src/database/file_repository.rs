//! Uploaded-file persistence and job/file links.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExtractionStatus, FileStatus, JobFile, StoredFile};

pub struct NewFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub bucket: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, file: &NewFile) -> Result<StoredFile, sqlx::Error> {
        sqlx::query_as::<_, StoredFile>(
            r#"
            INSERT INTO files
                (id, user_id, filename, mime_type, bucket, object_key, size_bytes, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(file.id)
        .bind(file.user_id)
        .bind(&file.filename)
        .bind(&file.mime_type)
        .bind(&file.bucket)
        .bind(&file.object_key)
        .bind(file.size_bytes)
        .bind(file.expires_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Option<StoredFile>, sqlx::Error> {
        sqlx::query_as::<_, StoredFile>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn fetch_owned(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<StoredFile>, sqlx::Error> {
        sqlx::query_as::<_, StoredFile>("SELECT * FROM files WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StoredFile>, sqlx::Error> {
        sqlx::query_as::<_, StoredFile>(
            "SELECT * FROM files WHERE user_id = $1 AND status = 'ready' ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn set_status(&self, id: Uuid, status: FileStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE files SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Link files to a job in declared processing order.
    pub async fn link_to_job(&self, job_id: Uuid, file_ids: &[Uuid]) -> Result<(), sqlx::Error> {
        for (position, file_id) in file_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO job_files (job_id, file_id, position) VALUES ($1, $2, $3)",
            )
            .bind(job_id)
            .bind(file_id)
            .bind(position as i32)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Job links in declared order, with the backing file rows.
    pub async fn job_files(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<(JobFile, StoredFile)>, sqlx::Error> {
        let links = sqlx::query_as::<_, JobFile>(
            "SELECT job_id, file_id, position, extraction_status, extracted_text
             FROM job_files WHERE job_id = $1 ORDER BY position ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(links.len());
        for link in links {
            let file = self.fetch(link.file_id).await?.ok_or(sqlx::Error::RowNotFound)?;
            out.push((link, file));
        }
        Ok(out)
    }

    pub async fn set_extraction(
        &self,
        job_id: Uuid,
        file_id: Uuid,
        status: ExtractionStatus,
        extracted_text: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE job_files
            SET extraction_status = $3, extracted_text = $4
            WHERE job_id = $1 AND file_id = $2
            "#,
        )
        .bind(job_id)
        .bind(file_id)
        .bind(status)
        .bind(extracted_text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
