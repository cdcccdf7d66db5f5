//! Background retry scanner.
//!
//! One periodic scan owns every retry: per-delivery timers would leak across
//! process restarts, while the backoff state here is recomputed from the
//! persisted row (attempts, last attempt time) on every pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::WebhookDeliverer;
use crate::config::WebhookConfig;
use crate::database::WebhookDeliveryRepository;

/// Exponential backoff: `last_attempt + base · 2^(attempts-1)`, capped at
/// `max_delay`.
pub fn next_attempt_at(
    last_attempt: DateTime<Utc>,
    attempts: i32,
    base_delay: Duration,
    max_delay: Duration,
) -> DateTime<Utc> {
    let exponent = attempts.saturating_sub(1).clamp(0, 30) as u32;
    let delay = base_delay
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(max_delay);
    last_attempt + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX)
}

/// One scanner pass: walk pending deliveries in creation order, fail the
/// exhausted ones, reattempt the due ones.
pub async fn scan_once(
    deliverer: &WebhookDeliverer,
    deliveries: &WebhookDeliveryRepository,
    config: &WebhookConfig,
) -> Result<(), sqlx::Error> {
    let pending = deliveries.list_pending(config.scan_batch_size).await?;
    if pending.is_empty() {
        return Ok(());
    }
    debug!(count = pending.len(), "scanning pending webhook deliveries");

    let now = Utc::now();
    for delivery in pending {
        if delivery.attempts >= config.max_retries {
            deliveries
                .mark_failed(delivery.id, "retries exhausted")
                .await?;
            continue;
        }

        let due = match delivery.last_attempt_at {
            // Row created but never attempted (crash between insert and
            // first POST): due immediately.
            None => true,
            Some(last) => {
                now >= next_attempt_at(last, delivery.attempts, config.base_delay, config.max_delay)
            }
        };

        if due {
            deliverer.attempt(&delivery).await?;
        }
    }

    Ok(())
}

/// Run the scanner until cancellation.
pub async fn run_scanner(
    deliverer: Arc<WebhookDeliverer>,
    deliveries: WebhookDeliveryRepository,
    config: WebhookConfig,
    shutdown: CancellationToken,
) {
    info!(interval = ?config.scan_interval, "webhook retry scanner started");
    let mut interval = tokio::time::interval(config.scan_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("webhook retry scanner stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = scan_once(&deliverer, &deliveries, &config).await {
                    error!("scanner pass failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(24 * 3600);
        let last = Utc::now();

        // attempts=1 -> +30s, attempts=2 -> +60s, attempts=3 -> +120s
        assert_eq!(
            next_attempt_at(last, 1, base, max),
            last + chrono::Duration::seconds(30)
        );
        assert_eq!(
            next_attempt_at(last, 2, base, max),
            last + chrono::Duration::seconds(60)
        );
        assert_eq!(
            next_attempt_at(last, 3, base, max),
            last + chrono::Duration::seconds(120)
        );
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(24 * 3600);
        let last = Utc::now();

        // 30s · 2^19 is over a week; the cap holds it to 24h.
        assert_eq!(
            next_attempt_at(last, 20, base, max),
            last + chrono::Duration::hours(24)
        );
        // Huge attempt counts do not overflow.
        assert_eq!(
            next_attempt_at(last, i32::MAX, base, max),
            last + chrono::Duration::hours(24)
        );
    }

    #[test]
    fn scenario_timings_with_one_second_base() {
        // Receiver 503s twice then 200s; base_delay=1s. First synchronous
        // attempt leaves attempts=1; retries become due at >=1s then >=2s.
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(3600);
        let last = Utc::now();

        assert_eq!(
            next_attempt_at(last, 1, base, max),
            last + chrono::Duration::seconds(1)
        );
        assert_eq!(
            next_attempt_at(last, 2, base, max),
            last + chrono::Duration::seconds(2)
        );
    }

    #[test]
    fn attempts_zero_clamps_the_exponent() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(3600);
        let last = Utc::now();
        assert_eq!(
            next_attempt_at(last, 0, base, max),
            last + chrono::Duration::seconds(30)
        );
    }
}
