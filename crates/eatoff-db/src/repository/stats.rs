//! # Daily Aggregates
//!
//! Per-restaurant and platform-wide daily rollups, fed one transaction at
//! a time with at-least-once delivery.
//!
//! Idempotency: the transaction id is inserted into `aggregate_applied`
//! (primary key) in the same transaction as the UPSERT increments. A
//! replayed delivery collides on the insert and applies nothing.
//!
//! Delivery: the live path folds each transaction right after its payment
//! commits; if that delivery is lost, the scheduler's `replay_unapplied`
//! sweep picks the transaction up later. Between them every completed
//! transaction lands in the rollups exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use eatoff_core::PaymentTransaction;

/// Cap on transactions re-folded per sweep pass.
const REPLAY_BATCH_SIZE: i64 = 500;

/// One restaurant's rollup for one day.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RestaurantDailyStats {
    pub restaurant_id: String,
    pub day: String,
    pub order_count: i64,
    pub gross_cents: i64,
    pub voucher_cents: i64,
    pub points_cents: i64,
    pub cash_cents: i64,
    pub discount_cents: i64,
    pub commission_cents: i64,
    pub net_cents: i64,
}

/// Platform-wide rollup for one day.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlatformDailyStats {
    pub day: String,
    pub order_count: i64,
    pub gross_cents: i64,
    pub voucher_cents: i64,
    pub points_cents: i64,
    pub cash_cents: i64,
    pub discount_cents: i64,
    pub commission_cents: i64,
    pub net_cents: i64,
}

#[derive(Debug, Clone)]
pub struct StatsRepository {
    pool: SqlitePool,
}

impl StatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StatsRepository { pool }
    }

    /// Folds one completed transaction into both daily rollups.
    ///
    /// Returns `false` when the transaction was already applied (replay).
    pub async fn record_transaction(&self, transaction: &PaymentTransaction) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let applied = sqlx::query(
            "INSERT INTO aggregate_applied (transaction_id, applied_at) VALUES (?1, ?2)",
        )
        .bind(&transaction.id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;
        if let Err(err) = applied {
            return match DbError::from(err) {
                DbError::UniqueViolation { .. } => {
                    debug!(transaction = %transaction.id, "Aggregate replay skipped");
                    Ok(false)
                }
                other => Err(other),
            };
        }

        let day = day_key(transaction.created_at);
        // Points are cents-equivalent (1 point = 1 cent)
        let points_cents = transaction.points_used;

        sqlx::query(
            r#"
            INSERT INTO restaurant_daily_stats (
                restaurant_id, day, order_count, gross_cents, voucher_cents,
                points_cents, cash_cents, discount_cents, commission_cents, net_cents
            ) VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(restaurant_id, day) DO UPDATE SET
                order_count = order_count + 1,
                gross_cents = gross_cents + excluded.gross_cents,
                voucher_cents = voucher_cents + excluded.voucher_cents,
                points_cents = points_cents + excluded.points_cents,
                cash_cents = cash_cents + excluded.cash_cents,
                discount_cents = discount_cents + excluded.discount_cents,
                commission_cents = commission_cents + excluded.commission_cents,
                net_cents = net_cents + excluded.net_cents
            "#,
        )
        .bind(&transaction.restaurant_id)
        .bind(&day)
        .bind(transaction.total_amount_cents)
        .bind(transaction.voucher_cents)
        .bind(points_cents)
        .bind(transaction.cash_cents)
        .bind(transaction.discount_cents)
        .bind(transaction.commission_cents)
        .bind(transaction.restaurant_net_cents)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO platform_daily_stats (
                day, order_count, gross_cents, voucher_cents,
                points_cents, cash_cents, discount_cents, commission_cents, net_cents
            ) VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(day) DO UPDATE SET
                order_count = order_count + 1,
                gross_cents = gross_cents + excluded.gross_cents,
                voucher_cents = voucher_cents + excluded.voucher_cents,
                points_cents = points_cents + excluded.points_cents,
                cash_cents = cash_cents + excluded.cash_cents,
                discount_cents = discount_cents + excluded.discount_cents,
                commission_cents = commission_cents + excluded.commission_cents,
                net_cents = net_cents + excluded.net_cents
            "#,
        )
        .bind(&day)
        .bind(transaction.total_amount_cents)
        .bind(transaction.voucher_cents)
        .bind(points_cents)
        .bind(transaction.cash_cents)
        .bind(transaction.discount_cents)
        .bind(transaction.commission_cents)
        .bind(transaction.restaurant_net_cents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Redelivers completed transactions that never made it into the
    /// rollups (the post-commit delivery was lost). Returns the number
    /// folded in. Safe to run concurrently with live deliveries: each
    /// replay goes through the same `aggregate_applied` guard.
    pub async fn replay_unapplied(&self) -> DbResult<u64> {
        let missed = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT t.id, t.customer_id, t.restaurant_id, t.total_amount_cents,
                   t.method, t.voucher_cents, t.points_used, t.cash_cents,
                   t.discount_cents, t.commission_bps, t.commission_cents,
                   t.restaurant_net_cents, t.qr_nonce, t.status,
                   t.settlement_id, t.created_at
            FROM payment_transactions t
            WHERE t.status = 'completed'
              AND NOT EXISTS (
                  SELECT 1 FROM aggregate_applied a WHERE a.transaction_id = t.id
              )
            ORDER BY t.created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(REPLAY_BATCH_SIZE)
        .fetch_all(&self.pool)
        .await?;

        let mut replayed = 0;
        for transaction in &missed {
            if self.record_transaction(transaction).await? {
                replayed += 1;
            }
        }
        if replayed > 0 {
            debug!(replayed, "Replayed missed aggregate deliveries");
        }
        Ok(replayed)
    }

    pub async fn restaurant_day(
        &self,
        restaurant_id: &str,
        day: DateTime<Utc>,
    ) -> DbResult<Option<RestaurantDailyStats>> {
        let stats = sqlx::query_as::<_, RestaurantDailyStats>(
            r#"
            SELECT restaurant_id, day, order_count, gross_cents, voucher_cents,
                   points_cents, cash_cents, discount_cents, commission_cents, net_cents
            FROM restaurant_daily_stats
            WHERE restaurant_id = ?1 AND day = ?2
            "#,
        )
        .bind(restaurant_id)
        .bind(day_key(day))
        .fetch_optional(&self.pool)
        .await?;

        Ok(stats)
    }

    pub async fn platform_day(&self, day: DateTime<Utc>) -> DbResult<Option<PlatformDailyStats>> {
        let stats = sqlx::query_as::<_, PlatformDailyStats>(
            r#"
            SELECT day, order_count, gross_cents, voucher_cents,
                   points_cents, cash_cents, discount_cents, commission_cents, net_cents
            FROM platform_daily_stats
            WHERE day = ?1
            "#,
        )
        .bind(day_key(day))
        .fetch_optional(&self.pool)
        .await?;

        Ok(stats)
    }
}

fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::payment::CommitOutcome;
    use crate::repository::wallet::EntryContext;
    use eatoff_core::{
        split_commission, Breakdown, LedgerKind, Money, PaymentMethod, TransactionStatus,
        WalletEntryKind,
    };

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn transaction(id: &str, cash: i64, points: i64) -> PaymentTransaction {
        let total = cash + points;
        PaymentTransaction {
            id: id.to_string(),
            customer_id: "c-1".into(),
            restaurant_id: "rest-1".into(),
            total_amount_cents: total,
            method: PaymentMethod::Mixed,
            voucher_cents: 0,
            points_used: points,
            cash_cents: cash,
            discount_cents: 0,
            commission_bps: 550,
            commission_cents: total * 550 / 10_000,
            restaurant_net_cents: total - total * 550 / 10_000,
            qr_nonce: format!("nonce-{id}"),
            status: TransactionStatus::Completed,
            settlement_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_increments_both_rollups() {
        let db = db().await;
        let stats = db.stats();

        assert!(stats.record_transaction(&transaction("t-1", 3000, 0)).await.unwrap());
        assert!(stats.record_transaction(&transaction("t-2", 1000, 500)).await.unwrap());

        let day = stats
            .restaurant_day("rest-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(day.order_count, 2);
        assert_eq!(day.gross_cents, 4500);
        assert_eq!(day.cash_cents, 4000);
        assert_eq!(day.points_cents, 500);

        let platform = stats.platform_day(Utc::now()).await.unwrap().unwrap();
        assert_eq!(platform.order_count, 2);
        assert_eq!(platform.gross_cents, 4500);
    }

    #[tokio::test]
    async fn test_sweep_redelivers_missed_transactions() {
        let db = db().await;
        db.restaurants()
            .upsert("rest-1", "Bistro", None)
            .await
            .unwrap();
        let customer = db.wallet().create_customer("Una").await.unwrap();
        db.wallet()
            .credit(
                &customer.id,
                LedgerKind::Cash,
                10_000,
                WalletEntryKind::Deposit,
                EntryContext::default(),
            )
            .await
            .unwrap();

        let breakdown = Breakdown {
            method: PaymentMethod::Cash,
            amount_cents: 4000,
            voucher_id: None,
            voucher_cents: 0,
            points_used: 0,
            cash_cents: 4000,
            general_voucher_id: None,
            discount_cents: 0,
        };
        let commission = split_commission(Money::from_cents(4000), None);
        let outcome = db
            .payments()
            .commit(&customer.id, "rest-1", &breakdown, &commission, "n-1", Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        // The payment committed but its rollup delivery was lost
        let stats = db.stats();
        assert!(stats
            .restaurant_day("rest-1", Utc::now())
            .await
            .unwrap()
            .is_none());

        assert_eq!(stats.replay_unapplied().await.unwrap(), 1);

        let day = stats
            .restaurant_day("rest-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(day.order_count, 1);
        assert_eq!(day.gross_cents, 4000);
        let platform = stats.platform_day(Utc::now()).await.unwrap().unwrap();
        assert_eq!(platform.order_count, 1);

        // Nothing left for the next pass
        assert_eq!(stats.replay_unapplied().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replay_is_a_noop() {
        let db = db().await;
        let stats = db.stats();
        let tx = transaction("t-1", 3000, 0);

        assert!(stats.record_transaction(&tx).await.unwrap());
        // At-least-once delivery replays the same transaction
        assert!(!stats.record_transaction(&tx).await.unwrap());

        let day = stats
            .restaurant_day("rest-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(day.order_count, 1);
        assert_eq!(day.gross_cents, 3000);
    }
}
