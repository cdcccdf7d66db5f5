//! Database connection and repositories.
//!
//! Connection pooling, embedded migrations, and one repository struct per
//! aggregate. Repositories return `Option` for lookups so the HTTP boundary
//! can map missing rows to 404 without string-matching errors.

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::config::DatabaseConfig;

pub mod api_key_repository;
pub mod asset_repository;
pub mod boundary_cache;
pub mod file_repository;
pub mod job_repository;
pub mod segment_repository;
pub mod webhook_repository;

pub use api_key_repository::{ApiKeyRepository, QuotaOutcome};
pub use asset_repository::AssetRepository;
pub use boundary_cache::{BoundaryCache, PgBoundaryCache};
pub use file_repository::FileRepository;
pub use job_repository::JobRepository;
pub use segment_repository::SegmentRepository;
pub use webhook_repository::WebhookDeliveryRepository;

/// Embedded SQL migrations, applied idempotently in filename order at
/// startup. Applied versions are recorded by sqlx in its migrations table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Database connection manager.
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Create a bounded connection pool from the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            "connecting to database: {}",
            mask_database_url(&config.database_url)
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("failed to connect to database: {}", e);
                e
            })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded migrations. Safe to call on every startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("running database migrations");
        MIGRATOR.run(&self.pool).await
    }
}

/// Hide credentials when logging the connection string.
fn mask_database_url(url: &str) -> String {
    match url.find("://").zip(url.rfind('@')) {
        Some((scheme_end, at)) if at > scheme_end + 3 => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_hides_credentials() {
        assert_eq!(
            mask_database_url("postgresql://user:pw@db:5432/stories"),
            "postgresql://***@db:5432/stories"
        );
        assert_eq!(
            mask_database_url("postgresql://localhost/stories"),
            "postgresql://localhost/stories"
        );
    }
}
