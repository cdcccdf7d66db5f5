//! Content-addressed cache of validated grapheme boundary lists.
//!
//! Keyed by the SHA-256 hex of the normalized (trimmed, lower-cased) input
//! text. Lookup is by hash alone; the input type is stored as an
//! informational column. Entries are immutable in effect: concurrent writers
//! for the same text converge through ON CONFLICT.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::models::InputType;

/// Seam between the segmentation engine and the cache backing store, so the
/// engine can be exercised with an in-memory double.
#[async_trait]
pub trait BoundaryCache: Send + Sync {
    async fn get(&self, text_hash: &str) -> Result<Option<Vec<usize>>, sqlx::Error>;

    async fn put(
        &self,
        text_hash: &str,
        input_type: InputType,
        boundaries: &[usize],
    ) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct PgBoundaryCache {
    pool: PgPool,
}

impl PgBoundaryCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BoundaryCache for PgBoundaryCache {
    async fn get(&self, text_hash: &str) -> Result<Option<Vec<usize>>, sqlx::Error> {
        let row = sqlx::query("SELECT boundaries FROM segmentation_cache WHERE text_hash = $1")
            .bind(text_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| {
            let value: serde_json::Value = r.get("boundaries");
            serde_json::from_value::<Vec<usize>>(value).ok()
        }))
    }

    async fn put(
        &self,
        text_hash: &str,
        input_type: InputType,
        boundaries: &[usize],
    ) -> Result<(), sqlx::Error> {
        let value = serde_json::json!(boundaries);
        sqlx::query(
            r#"
            INSERT INTO segmentation_cache (text_hash, input_type, boundaries)
            VALUES ($1, $2, $3)
            ON CONFLICT (text_hash) DO UPDATE SET boundaries = EXCLUDED.boundaries
            "#,
        )
        .bind(text_hash)
        .bind(input_type)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
