//! Segment persistence.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{SegmentRow, SegmentStatus};

/// A planned segment ready to be written, before it has an id or status.
pub struct NewSegment {
    pub idx: i32,
    pub start_char: i64,
    pub end_char: i64,
    pub title: Option<String>,
    pub text: String,
}

#[derive(Clone)]
pub struct SegmentRepository {
    pool: PgPool,
}

impl SegmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one segment with status `queued` and return the stored row.
    /// The executor writes segments serially in idx order.
    pub async fn create(&self, job_id: Uuid, seg: &NewSegment) -> Result<SegmentRow, sqlx::Error> {
        sqlx::query_as::<_, SegmentRow>(
            r#"
            INSERT INTO segments (id, job_id, idx, start_char, end_char, title, text)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(seg.idx)
        .bind(seg.start_char)
        .bind(seg.end_char)
        .bind(&seg.title)
        .bind(&seg.text)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<SegmentRow>, sqlx::Error> {
        sqlx::query_as::<_, SegmentRow>(
            "SELECT * FROM segments WHERE job_id = $1 ORDER BY idx ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete every segment of a job. ON DELETE CASCADE removes their
    /// assets; this is the clean-slate step of the crash-restart branch.
    pub async fn delete_for_job(&self, job_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM segments WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_status(&self, id: Uuid, status: SegmentStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE segments SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
