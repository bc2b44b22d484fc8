//! # Settlement Repository
//!
//! Folds a restaurant's completed transactions into periodic settlements.
//!
//! ## Double-Counting Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │             generate(restaurant, period) — one transaction              │
//! │                                                                         │
//! │   1. SUM completed transactions WHERE settlement_id IS NULL             │
//! │   2. INSERT the pending settlement                                      │
//! │   3. STAMP settlement_id on exactly those rows                          │
//! │   4. pending_settlement_cents += net                                    │
//! │                                                                         │
//! │  A transaction carries at most one settlement_id, so overlapping or    │
//! │  repeated generation over the same period finds nothing left to sum.   │
//! │  Sums are over per-transaction cents already rounded at commit time:   │
//! │  gross − commission = net holds exactly, no rounding drift.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use eatoff_core::{Settlement, SettlementStatus};

/// Outcome of settlement generation.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Generated(Settlement),
    /// No completed, unsettled transactions in the period.
    NothingToSettle,
}

/// Outcome of marking a settlement paid.
#[derive(Debug, Clone)]
pub enum MarkPaidOutcome {
    Paid(Settlement),
    AlreadyPaid,
}

const SETTLEMENT_COLUMNS: &str = r#"
    id, restaurant_id, period_start, period_end, gross_cents, commission_bps,
    commission_cents, net_cents, transaction_count, status,
    paid_method, paid_reference, paid_at, created_at
"#;

#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    /// Generates a pending settlement over `[period_start, period_end)`.
    pub async fn generate(
        &self,
        restaurant_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<GenerateOutcome> {
        let mut tx = self.pool.begin().await?;

        let restaurant_bps: Option<(Option<u32>,)> =
            sqlx::query_as("SELECT commission_bps FROM restaurants WHERE id = ?1")
                .bind(restaurant_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (override_bps,) =
            restaurant_bps.ok_or_else(|| DbError::not_found("Restaurant", restaurant_id))?;

        // Sums over already-rounded per-transaction cents
        let totals: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(total_amount_cents), 0),
                   COALESCE(SUM(commission_cents), 0),
                   COALESCE(SUM(restaurant_net_cents), 0)
            FROM payment_transactions
            WHERE restaurant_id = ?1
              AND status = 'completed'
              AND settlement_id IS NULL
              AND created_at >= ?2 AND created_at < ?3
            "#,
        )
        .bind(restaurant_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&mut *tx)
        .await?;

        let (count, gross, commission, net) = totals;
        if count == 0 {
            return Ok(GenerateOutcome::NothingToSettle);
        }

        let settlement = Settlement {
            id: Uuid::new_v4().to_string(),
            restaurant_id: restaurant_id.to_string(),
            period_start,
            period_end,
            gross_cents: gross,
            // Informational snapshot; the money columns carry each
            // transaction's own rate
            commission_bps: override_bps.unwrap_or(eatoff_core::DEFAULT_COMMISSION.bps()),
            commission_cents: commission,
            net_cents: net,
            transaction_count: count,
            status: SettlementStatus::Pending,
            paid_method: None,
            paid_reference: None,
            paid_at: None,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO settlements (
                id, restaurant_id, period_start, period_end, gross_cents,
                commission_bps, commission_cents, net_cents, transaction_count,
                status, paid_method, paid_reference, paid_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&settlement.id)
        .bind(&settlement.restaurant_id)
        .bind(settlement.period_start)
        .bind(settlement.period_end)
        .bind(settlement.gross_cents)
        .bind(settlement.commission_bps)
        .bind(settlement.commission_cents)
        .bind(settlement.net_cents)
        .bind(settlement.transaction_count)
        .bind(settlement.status)
        .bind(&settlement.paid_method)
        .bind(&settlement.paid_reference)
        .bind(settlement.paid_at)
        .bind(settlement.created_at)
        .execute(&mut *tx)
        .await?;

        // Stamp the exact rows the sums came from; the snapshot is stable
        // inside this transaction, so the row set cannot shift under us
        let stamped = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET settlement_id = ?1
            WHERE restaurant_id = ?2
              AND status = 'completed'
              AND settlement_id IS NULL
              AND created_at >= ?3 AND created_at < ?4
            "#,
        )
        .bind(&settlement.id)
        .bind(restaurant_id)
        .bind(period_start)
        .bind(period_end)
        .execute(&mut *tx)
        .await?;

        if stamped.rows_affected() != count as u64 {
            return Err(DbError::Busy);
        }

        sqlx::query(
            r#"
            UPDATE restaurants
            SET pending_settlement_cents = pending_settlement_cents + ?1
            WHERE id = ?2
            "#,
        )
        .bind(net)
        .bind(restaurant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            settlement = %settlement.id,
            restaurant = %restaurant_id,
            transaction_count = count,
            gross_cents = gross,
            net_cents = net,
            "Settlement generated"
        );
        Ok(GenerateOutcome::Generated(settlement))
    }

    /// Marks a pending settlement paid, exactly once, and moves the
    /// restaurant's counters by the settlement's own net amount.
    pub async fn mark_paid(
        &self,
        id: &str,
        method: &str,
        reference: &str,
        now: DateTime<Utc>,
    ) -> DbResult<MarkPaidOutcome> {
        let mut tx = self.pool.begin().await?;

        let paid: Option<Settlement> = sqlx::query_as(&format!(
            r#"
            UPDATE settlements
            SET status = 'paid', paid_method = ?1, paid_reference = ?2, paid_at = ?3
            WHERE id = ?4 AND status = 'pending'
            RETURNING {SETTLEMENT_COLUMNS}
            "#
        ))
        .bind(method)
        .bind(reference)
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let settlement = match paid {
            Some(s) => s,
            None => {
                // Distinguish unknown from already-paid
                let exists: Option<(String,)> =
                    sqlx::query_as("SELECT id FROM settlements WHERE id = ?1")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return match exists {
                    Some(_) => Ok(MarkPaidOutcome::AlreadyPaid),
                    None => Err(DbError::not_found("Settlement", id)),
                };
            }
        };

        sqlx::query(
            r#"
            UPDATE restaurants
            SET pending_settlement_cents = pending_settlement_cents - ?1,
                total_settled_cents = total_settled_cents + ?1
            WHERE id = ?2
            "#,
        )
        .bind(settlement.net_cents)
        .bind(&settlement.restaurant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            settlement = %settlement.id,
            restaurant = %settlement.restaurant_id,
            net_cents = settlement.net_cents,
            method,
            "Settlement paid"
        );
        Ok(MarkPaidOutcome::Paid(settlement))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Settlement>> {
        let settlement = sqlx::query_as::<_, Settlement>(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settlement)
    }

    pub async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        status: Option<SettlementStatus>,
    ) -> DbResult<Vec<Settlement>> {
        let settlements = match status {
            Some(status) => {
                sqlx::query_as::<_, Settlement>(&format!(
                    r#"
                    SELECT {SETTLEMENT_COLUMNS} FROM settlements
                    WHERE restaurant_id = ?1 AND status = ?2
                    ORDER BY created_at DESC
                    "#
                ))
                .bind(restaurant_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Settlement>(&format!(
                    r#"
                    SELECT {SETTLEMENT_COLUMNS} FROM settlements
                    WHERE restaurant_id = ?1
                    ORDER BY created_at DESC
                    "#
                ))
                .bind(restaurant_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(settlements)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
