//! Webhook delivery bookkeeping.
//!
//! The retry invariant lives in the row, not in memory: attempts, last
//! attempt time, and last error survive process restarts, and the scanner
//! recomputes backoff from them.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::WebhookDelivery;

#[derive(Clone)]
pub struct WebhookDeliveryRepository {
    pool: PgPool,
}

impl WebhookDeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the single delivery row for a job, absorbing redelivered
    /// terminal events. Returns the row if this call created it, `None` when
    /// a row already existed.
    pub async fn insert_if_absent(
        &self,
        job_id: Uuid,
        url: &str,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        sqlx::query_as::<_, WebhookDelivery>(
            r#"
            INSERT INTO webhook_deliveries (id, job_id, url)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        sqlx::query_as::<_, WebhookDelivery>("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn fetch_by_job(&self, job_id: Uuid) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        sqlx::query_as::<_, WebhookDelivery>(
            "SELECT * FROM webhook_deliveries WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Record the start of an attempt: bump the counter and stamp the time.
    pub async fn record_attempt(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE webhook_deliveries SET attempts = attempts + 1, last_attempt_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_sent(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhook_deliveries SET status = 'sent', last_error = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Terminal failure: a permanent HTTP response or retry exhaustion.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhook_deliveries SET status = 'failed', last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Transient failure: stays `pending` for the scanner to retry.
    pub async fn record_transient_error(&self, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhook_deliveries SET last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pending deliveries in creation order, capped for one scanner pass.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
        sqlx::query_as::<_, WebhookDelivery>(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
