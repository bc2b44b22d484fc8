//! # Voucher Repository
//!
//! Meal-package voucher templates and purchased vouchers.
//!
//! ## Redemption State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Purchased Voucher Lifecycle                            │
//! │                                                                         │
//! │            redeem_meal × N                                              │
//! │  active ───────────────────────► fully_used   (used == total)          │
//! │     │                                                                   │
//! │     └──────────────────────────► expired      (now > expires_at)       │
//! │                                                                         │
//! │  Transitions are MONOTONE: no arrow ever points back. The meal         │
//! │  increment and the fully_used flip happen in one guarded UPDATE, so    │
//! │  two concurrent redemptions of the last meal serialize: exactly one    │
//! │  succeeds, the other observes the exhausted state.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use eatoff_core::{PurchasedVoucher, VoucherPackage, VoucherStatus};

/// Outcome of a meal redemption attempt. Domain outcomes, not errors:
/// the service layer maps them onto `CoreError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed {
        remaining_meals: i64,
        fully_used: bool,
    },
    NotActive {
        status: VoucherStatus,
    },
    Expired,
    Exhausted {
        total_meals: i64,
    },
}

const VOUCHER_COLUMNS: &str = r#"
    id, customer_id, restaurant_id, package_id, total_meals, used_meals,
    per_meal_value_cents, purchase_price_cents, discount_cents,
    expires_at, status, qr_reference, created_at
"#;

/// Repository for voucher packages and purchased vouchers.
#[derive(Debug, Clone)]
pub struct VoucherRepository {
    pool: SqlitePool,
}

impl VoucherRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VoucherRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Packages
    // -------------------------------------------------------------------------

    /// Inserts a package template (catalog seeding / admin correction).
    pub async fn insert_package(&self, package: &VoucherPackage) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO voucher_packages (
                id, restaurant_id, name, meal_count, price_per_meal_cents,
                discount_bps, validity_months, valid_from, valid_until,
                is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&package.id)
        .bind(&package.restaurant_id)
        .bind(&package.name)
        .bind(package.meal_count)
        .bind(package.price_per_meal_cents)
        .bind(package.discount_bps)
        .bind(package.validity_months)
        .bind(package.valid_from)
        .bind(package.valid_until)
        .bind(package.is_active)
        .bind(package.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an active package by ID.
    pub async fn get_package(&self, id: &str) -> DbResult<Option<VoucherPackage>> {
        let package = sqlx::query_as::<_, VoucherPackage>(
            r#"
            SELECT id, restaurant_id, name, meal_count, price_per_meal_cents,
                   discount_bps, validity_months, valid_from, valid_until,
                   is_active, created_at
            FROM voucher_packages
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(package)
    }

    // -------------------------------------------------------------------------
    // Purchased vouchers
    // -------------------------------------------------------------------------

    /// Inserts a freshly purchased voucher.
    pub async fn insert_voucher(&self, voucher: &PurchasedVoucher) -> DbResult<()> {
        debug!(voucher = %voucher.id, customer = %voucher.customer_id, "Inserting purchased voucher");

        sqlx::query(
            r#"
            INSERT INTO purchased_vouchers (
                id, customer_id, restaurant_id, package_id,
                total_meals, used_meals, per_meal_value_cents,
                purchase_price_cents, discount_cents,
                expires_at, status, qr_reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.customer_id)
        .bind(&voucher.restaurant_id)
        .bind(&voucher.package_id)
        .bind(voucher.total_meals)
        .bind(voucher.used_meals)
        .bind(voucher.per_meal_value_cents)
        .bind(voucher.purchase_price_cents)
        .bind(voucher.discount_cents)
        .bind(voucher.expires_at)
        .bind(voucher.status)
        .bind(&voucher.qr_reference)
        .bind(voucher.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a purchased voucher by ID.
    pub async fn get_voucher(&self, id: &str) -> DbResult<Option<PurchasedVoucher>> {
        let voucher = sqlx::query_as::<_, PurchasedVoucher>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM purchased_vouchers WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    /// Lists a customer's vouchers, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<PurchasedVoucher>> {
        let vouchers = sqlx::query_as::<_, PurchasedVoucher>(&format!(
            r#"
            SELECT {VOUCHER_COLUMNS} FROM purchased_vouchers
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(vouchers)
    }

    /// Redeems one meal. See [`redeem_meal_in_tx`] for the mechanism.
    pub async fn redeem_meal(&self, voucher_id: &str, now: DateTime<Utc>) -> DbResult<RedeemOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = redeem_meal_in_tx(&mut tx, voucher_id, now).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Expiry sweep: flips active vouchers past their expiry to `expired`.
    ///
    /// Idempotent and side-effect-free beyond the status flip. Returns the
    /// number of vouchers flipped.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE purchased_vouchers
            SET status = 'expired'
            WHERE status = 'active' AND expires_at < ?1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let flipped = result.rows_affected();
        if flipped > 0 {
            info!(flipped, "Expired meal-package vouchers");
        }
        Ok(flipped)
    }
}

/// Redeems one meal inside a caller-owned transaction.
///
/// The guarded UPDATE increments `used_meals` and flips to `fully_used`
/// in one statement; when no row matches, the voucher's actual state
/// decides the outcome (lazily flipping expired vouchers on the way).
pub(crate) async fn redeem_meal_in_tx(
    conn: &mut SqliteConnection,
    voucher_id: &str,
    now: DateTime<Utc>,
) -> DbResult<RedeemOutcome> {
    let row: Option<(i64, i64, VoucherStatus)> = sqlx::query_as(
        r#"
        UPDATE purchased_vouchers
        SET used_meals = used_meals + 1,
            status = CASE WHEN used_meals + 1 >= total_meals
                          THEN 'fully_used' ELSE status END
        WHERE id = ?1
          AND status = 'active'
          AND used_meals < total_meals
          AND expires_at >= ?2
        RETURNING used_meals, total_meals, status
        "#,
    )
    .bind(voucher_id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((used, total, status)) = row {
        debug!(voucher = %voucher_id, used, total, "Meal redeemed");
        return Ok(RedeemOutcome::Redeemed {
            remaining_meals: total - used,
            fully_used: status == VoucherStatus::FullyUsed,
        });
    }

    // Guard failed: inspect the row to report why
    let current: Option<(i64, i64, VoucherStatus, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT used_meals, total_meals, status, expires_at
        FROM purchased_vouchers
        WHERE id = ?1
        "#,
    )
    .bind(voucher_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (used, total, status, expires_at) =
        current.ok_or_else(|| DbError::not_found("Voucher", voucher_id))?;

    match status {
        VoucherStatus::Active if now > expires_at => {
            // Lazy expiry flip, so the stored state matches what we report
            sqlx::query(
                "UPDATE purchased_vouchers SET status = 'expired' WHERE id = ?1 AND status = 'active'",
            )
            .bind(voucher_id)
            .execute(&mut *conn)
            .await?;
            Ok(RedeemOutcome::Expired)
        }
        VoucherStatus::Active if used >= total => Ok(RedeemOutcome::Exhausted { total_meals: total }),
        VoucherStatus::Expired => Ok(RedeemOutcome::Expired),
        VoucherStatus::FullyUsed => Ok(RedeemOutcome::Exhausted { total_meals: total }),
        // Active with meals left and unexpired would have matched the guard;
        // reaching here means a concurrent writer beat us. Report exhausted
        // conservatively from the fresh row.
        VoucherStatus::Active => Ok(RedeemOutcome::Exhausted { total_meals: total }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_restaurant(db: &Database, id: &str) {
        db.restaurants()
            .upsert(id, "Test Kitchen", None)
            .await
            .unwrap();
    }

    async fn seed_customer(db: &Database) -> String {
        db.wallet().create_customer("Eva").await.unwrap().id
    }

    fn voucher(customer: &str, total: i64, expires_at: DateTime<Utc>) -> PurchasedVoucher {
        PurchasedVoucher {
            id: Uuid::new_v4().to_string(),
            customer_id: customer.to_string(),
            restaurant_id: "rest-1".into(),
            package_id: "pkg-1".into(),
            total_meals: total,
            used_meals: 0,
            per_meal_value_cents: 1000,
            purchase_price_cents: 8000,
            discount_cents: 2000,
            expires_at,
            status: VoucherStatus::Active,
            qr_reference: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    async fn seed_package(db: &Database) {
        db.vouchers()
            .insert_package(&VoucherPackage {
                id: "pkg-1".into(),
                restaurant_id: "rest-1".into(),
                name: "Ten lunches".into(),
                meal_count: 10,
                price_per_meal_cents: 1000,
                discount_bps: 2000,
                validity_months: Some(6),
                valid_from: None,
                valid_until: None,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redeem_until_exhausted() {
        let db = db().await;
        seed_restaurant(&db, "rest-1").await;
        seed_package(&db).await;
        let customer = seed_customer(&db).await;

        // 10 meals; the 11th redemption fails
        let v = voucher(&customer, 10, Utc::now() + Duration::days(30));
        db.vouchers().insert_voucher(&v).await.unwrap();

        for i in 1..=10 {
            let outcome = db.vouchers().redeem_meal(&v.id, Utc::now()).await.unwrap();
            assert_eq!(
                outcome,
                RedeemOutcome::Redeemed {
                    remaining_meals: 10 - i,
                    fully_used: i == 10,
                }
            );
        }

        let outcome = db.vouchers().redeem_meal(&v.id, Utc::now()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Exhausted { total_meals: 10 });

        let stored = db.vouchers().get_voucher(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VoucherStatus::FullyUsed);
        assert_eq!(stored.used_meals, 10);
    }

    #[tokio::test]
    async fn test_redeem_expired_flips_lazily() {
        let db = db().await;
        seed_restaurant(&db, "rest-1").await;
        seed_package(&db).await;
        let customer = seed_customer(&db).await;

        let v = voucher(&customer, 5, Utc::now() - Duration::days(1));
        db.vouchers().insert_voucher(&v).await.unwrap();

        let outcome = db.vouchers().redeem_meal(&v.id, Utc::now()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Expired);

        let stored = db.vouchers().get_voucher(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VoucherStatus::Expired);
        assert_eq!(stored.used_meals, 0);
    }

    #[tokio::test]
    async fn test_expiry_sweep_idempotent() {
        let db = db().await;
        seed_restaurant(&db, "rest-1").await;
        seed_package(&db).await;
        let customer = seed_customer(&db).await;

        let expired = voucher(&customer, 5, Utc::now() - Duration::days(2));
        let live = voucher(&customer, 5, Utc::now() + Duration::days(2));
        db.vouchers().insert_voucher(&expired).await.unwrap();
        db.vouchers().insert_voucher(&live).await.unwrap();

        assert_eq!(db.vouchers().expire_due(Utc::now()).await.unwrap(), 1);
        // Second run: nothing left to flip
        assert_eq!(db.vouchers().expire_due(Utc::now()).await.unwrap(), 0);

        let stored = db.vouchers().get_voucher(&live.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VoucherStatus::Active);
    }

    #[tokio::test]
    async fn test_redeem_unknown_voucher() {
        let db = db().await;
        let err = db
            .vouchers()
            .redeem_meal("missing", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
