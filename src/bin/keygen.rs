//! API-key provisioning tool.
//!
//! Mints a key, stores its hashes, and prints the raw token once. The token
//! is never persisted; losing it means minting a new key.
//!
//! Configuration (environment):
//!   DATABASE_URL       target database
//!   KEY_USER_ID        owner UUID (default: a fresh UUID, printed)
//!   KEY_QUOTA_PERIOD   daily | weekly | monthly | yearly (default monthly)
//!   KEY_QUOTA_CHARS    character budget per period (default 1000000)

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use stories::config::DatabaseConfig;
use stories::database::{ApiKeyRepository, DatabaseManager};
use stories::models::{ApiKey, KeyStatus, QuotaPeriod};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stories=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let user_id = match std::env::var("KEY_USER_ID") {
        Ok(raw) => raw.parse::<Uuid>().map_err(|e| anyhow::anyhow!("invalid KEY_USER_ID: {e}"))?,
        Err(_) => Uuid::new_v4(),
    };
    let quota_period = match std::env::var("KEY_QUOTA_PERIOD").as_deref() {
        Ok("daily") => QuotaPeriod::Daily,
        Ok("weekly") => QuotaPeriod::Weekly,
        Ok("monthly") | Err(_) => QuotaPeriod::Monthly,
        Ok("yearly") => QuotaPeriod::Yearly,
        Ok(other) => anyhow::bail!("invalid KEY_QUOTA_PERIOD: {other}"),
    };
    let quota_chars: i64 = std::env::var("KEY_QUOTA_CHARS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1_000_000);

    let db = DatabaseManager::connect(&DatabaseConfig::from_env()).await?;
    db.run_migrations().await?;

    let (token, lookup, secret_hash) = stories::auth::mint_key()?;
    let now = Utc::now();
    let key = ApiKey {
        id: Uuid::new_v4(),
        user_id,
        secret_hash,
        lookup_hash: lookup,
        status: KeyStatus::Active,
        quota_period,
        quota_chars,
        used_chars: 0,
        period_started_at: now,
        created_at: now,
    };

    ApiKeyRepository::new(db.pool().clone()).insert(&key).await?;

    println!("api_key_id: {}", key.id);
    println!("user_id:    {}", key.user_id);
    println!("quota:      {} chars / {:?}", key.quota_chars, key.quota_period);
    println!();
    println!("token (shown once, store it now):");
    println!("{token}");

    Ok(())
}
