//! Job persistence.
//!
//! Owns every status transition of the job state machine. Timestamps are
//! coupled to transitions in SQL: `started_at` is set exactly once on the
//! first departure from `queued`, `finished_at` exactly once on entering a
//! terminal state.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AudioType, InputSource, InputType, Job, JobStatus};

/// Everything needed to insert a new job row.
pub struct NewJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub input_type: InputType,
    pub input_source: InputSource,
    pub segments_count: i32,
    pub audio_type: AudioType,
    pub input_text: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, job: &NewJob) -> Result<Job, sqlx::Error> {
        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs
                (id, user_id, api_key_id, input_type, input_source,
                 segments_count, audio_type, input_text, webhook_url, webhook_secret)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.api_key_id)
        .bind(job.input_type)
        .bind(job.input_source)
        .bind(job.segments_count)
        .bind(job.audio_type)
        .bind(&job.input_text)
        .bind(&job.webhook_url)
        .bind(&job.webhook_secret)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fetch a job only if it belongs to the given user.
    pub async fn fetch_owned(&self, id: Uuid, user_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Cursor pagination over a user's jobs, newest first. The cursor is an
    /// exclusive upper bound on `created_at`.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// `queued -> running` (or a restart re-entry into `running`).
    /// `started_at` is only stamped on the first transition.
    pub async fn mark_running(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = COALESCE(started_at, now())
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Clear partial markup before a crash-restart re-run.
    pub async fn clear_output(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET output_markup = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_extracted_text(&self, id: Uuid, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET extracted_text = $2 WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `running -> succeeded`; writes the markup and stamps `finished_at`.
    pub async fn finish_success(&self, id: Uuid, markup: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded', output_markup = $2,
                error_code = NULL, error_message = NULL,
                finished_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(markup)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `running -> failed`; records the error object and stamps `finished_at`.
    pub async fn finish_failure(
        &self,
        id: Uuid,
        code: &str,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error_code = $2, error_message = $3,
                output_markup = NULL,
                finished_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: JobStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
