//! API-key lookup and quota accounting.
//!
//! The quota charge is a single conditional UPDATE with an inline period
//! reset, so concurrent submissions on the same key cannot lose updates: the
//! row either absorbs the charge or the statement matches zero rows.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ApiKey, QuotaPeriod};

/// Result of a quota charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    Charged,
    Exceeded,
}

#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Constant-shape lookup by the SHA-256 hex of the presented token.
    /// Only active keys are returned.
    pub async fn find_by_lookup_hash(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE lookup_hash = $1 AND status = 'active'",
        )
        .bind(lookup_hash)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn insert(&self, key: &ApiKey) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO api_keys
                (id, user_id, secret_hash, lookup_hash, status, quota_period,
                 quota_chars, used_chars, period_started_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(key.id)
        .bind(key.user_id)
        .bind(&key.secret_hash)
        .bind(&key.lookup_hash)
        .bind(key.status)
        .bind(key.quota_period)
        .bind(key.quota_chars)
        .bind(key.used_chars)
        .bind(key.period_started_at)
        .bind(key.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Charge `amount` characters against the key's current period.
    ///
    /// If the period has lapsed (`period_started_at` older than the period
    /// length), the window resets before the charge is applied. The WHERE
    /// clause re-evaluates the same lapse condition, so the statement only
    /// matches when the post-reset consumption fits the budget.
    pub async fn charge_quota(
        &self,
        key_id: Uuid,
        period: QuotaPeriod,
        amount: i64,
    ) -> Result<QuotaOutcome, sqlx::Error> {
        let now = Utc::now();
        let lapsed_before = now - period.length();

        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET used_chars = CASE WHEN period_started_at < $3 THEN $2
                                  ELSE used_chars + $2 END,
                period_started_at = CASE WHEN period_started_at < $3 THEN $4
                                         ELSE period_started_at END
            WHERE id = $1
              AND status = 'active'
              AND (CASE WHEN period_started_at < $3 THEN 0 ELSE used_chars END) + $2
                  <= quota_chars
            "#,
        )
        .bind(key_id)
        .bind(amount)
        .bind(lapsed_before)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(QuotaOutcome::Charged)
        } else {
            Ok(QuotaOutcome::Exceeded)
        }
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Option<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}
