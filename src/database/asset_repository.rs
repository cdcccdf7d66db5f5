//! Asset persistence.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Asset, AssetKind};

pub struct NewAsset {
    pub job_id: Uuid,
    pub segment_id: Option<Uuid>,
    pub kind: AssetKind,
    pub mime_type: String,
    pub bucket: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
}

impl AssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, asset: &NewAsset) -> Result<Asset, sqlx::Error> {
        sqlx::query_as::<_, Asset>(
            r#"
            INSERT INTO assets
                (id, job_id, segment_id, kind, mime_type, bucket, object_key,
                 size_bytes, checksum, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(asset.job_id)
        .bind(asset.segment_id)
        .bind(asset.kind)
        .bind(&asset.mime_type)
        .bind(&asset.bucket)
        .bind(&asset.object_key)
        .bind(asset.size_bytes)
        .bind(&asset.checksum)
        .bind(&asset.metadata)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Option<Asset>, sqlx::Error> {
        sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fetch an asset only if its job belongs to the given user.
    pub async fn fetch_owned(&self, id: Uuid, user_id: Uuid) -> Result<Option<Asset>, sqlx::Error> {
        sqlx::query_as::<_, Asset>(
            r#"
            SELECT a.* FROM assets a
            JOIN jobs j ON j.id = a.job_id
            WHERE a.id = $1 AND j.user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// All assets of a job in creation order, the order markup markers are
    /// emitted in.
    pub async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<Asset>, sqlx::Error> {
        sqlx::query_as::<_, Asset>(
            "SELECT * FROM assets WHERE job_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }
}
