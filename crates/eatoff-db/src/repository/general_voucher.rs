//! # General Voucher Repository
//!
//! Platform-wide discount vouchers with limited stock.
//!
//! ## Stock Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Last-Unit Stock Race                                   │
//! │                                                                         │
//! │    UPDATE general_vouchers                                             │
//! │    SET    sold_quantity = sold_quantity + 1                            │
//! │    WHERE  id = ? AND is_active = 1                                     │
//! │      AND  sold_quantity < stock_quantity        ◄── the guard          │
//! │                                                                         │
//! │  Two buyers racing for the last unit serialize on the writer: one      │
//! │  matches, one gets zero rows and is told the voucher is sold out.      │
//! │  The wallet charge runs in the SAME transaction, so a failed charge    │
//! │  rolls the stock reservation back.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::wallet::{debit_in_tx, DebitOutcome, EntryContext};
use eatoff_core::{
    CustomerGeneralVoucher, CustomerVoucherStatus, GeneralVoucher, LedgerKind, WalletEntryKind,
};

/// Outcome of a general voucher purchase.
#[derive(Debug, Clone)]
pub enum PurchaseOutcome {
    Purchased(CustomerGeneralVoucher),
    OutOfStock,
    InsufficientFunds { balance: i64, shortfall: i64 },
}

/// Outcome of consuming a use of a customer's general voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConsumeOutcome {
    Consumed { discount_cents: i64 },
    NotUsable { status: CustomerVoucherStatus },
    Expired,
}

#[derive(Debug, Clone)]
pub struct GeneralVoucherRepository {
    pool: SqlitePool,
}

impl GeneralVoucherRepository {
    pub fn new(pool: SqlitePool) -> Self {
        GeneralVoucherRepository { pool }
    }

    /// Inserts a voucher template (catalog seeding / admin correction).
    pub async fn insert_template(&self, voucher: &GeneralVoucher) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO general_vouchers (
                id, name, face_value_cents, discount_bps, price_cents,
                stock_quantity, sold_quantity, usage_limit, validity_days,
                is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.name)
        .bind(voucher.face_value_cents)
        .bind(voucher.discount_bps)
        .bind(voucher.price_cents)
        .bind(voucher.stock_quantity)
        .bind(voucher.sold_quantity)
        .bind(voucher.usage_limit)
        .bind(voucher.validity_days)
        .bind(voucher.is_active)
        .bind(voucher.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_template(&self, id: &str) -> DbResult<Option<GeneralVoucher>> {
        let voucher = sqlx::query_as::<_, GeneralVoucher>(
            r#"
            SELECT id, name, face_value_cents, discount_bps, price_cents,
                   stock_quantity, sold_quantity, usage_limit, validity_days,
                   is_active, created_at
            FROM general_vouchers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    /// Purchases one unit: stock reservation, wallet charge, and the
    /// customer-owned snapshot, all in one transaction.
    pub async fn purchase(
        &self,
        customer_id: &str,
        general_voucher_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<PurchaseOutcome> {
        let mut tx = self.pool.begin().await?;

        let template: Option<GeneralVoucher> = sqlx::query_as(
            r#"
            SELECT id, name, face_value_cents, discount_bps, price_cents,
                   stock_quantity, sold_quantity, usage_limit, validity_days,
                   is_active, created_at
            FROM general_vouchers
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(general_voucher_id)
        .fetch_optional(&mut *tx)
        .await?;

        let template = template
            .ok_or_else(|| DbError::not_found("General voucher", general_voucher_id))?;

        let reserved = sqlx::query(
            r#"
            UPDATE general_vouchers
            SET sold_quantity = sold_quantity + 1
            WHERE id = ?1 AND is_active = 1 AND sold_quantity < stock_quantity
            "#,
        )
        .bind(general_voucher_id)
        .execute(&mut *tx)
        .await?;

        if reserved.rows_affected() == 0 {
            return Ok(PurchaseOutcome::OutOfStock);
        }

        let outcome = debit_in_tx(
            &mut tx,
            customer_id,
            LedgerKind::Cash,
            template.price_cents,
            WalletEntryKind::VoucherPurchase,
            &EntryContext::default(),
        )
        .await?;

        if let DebitOutcome::InsufficientBalance { balance, shortfall } = outcome {
            // Transaction drops: stock reservation rolls back with it
            return Ok(PurchaseOutcome::InsufficientFunds { balance, shortfall });
        }

        let owned = CustomerGeneralVoucher {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            general_voucher_id: general_voucher_id.to_string(),
            face_value_cents: template.face_value_cents,
            discount_bps: template.discount_bps,
            uses_remaining: template.usage_limit,
            expires_at: now + Duration::days(template.validity_days as i64),
            status: CustomerVoucherStatus::Active,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO customer_general_vouchers (
                id, customer_id, general_voucher_id, face_value_cents,
                discount_bps, uses_remaining, expires_at, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&owned.id)
        .bind(&owned.customer_id)
        .bind(&owned.general_voucher_id)
        .bind(owned.face_value_cents)
        .bind(owned.discount_bps)
        .bind(owned.uses_remaining)
        .bind(owned.expires_at)
        .bind(owned.status)
        .bind(owned.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(customer = %customer_id, voucher = %owned.id, "General voucher purchased");
        Ok(PurchaseOutcome::Purchased(owned))
    }

    pub async fn get_owned(&self, id: &str) -> DbResult<Option<CustomerGeneralVoucher>> {
        let voucher = sqlx::query_as::<_, CustomerGeneralVoucher>(
            r#"
            SELECT id, customer_id, general_voucher_id, face_value_cents,
                   discount_bps, uses_remaining, expires_at, status, created_at
            FROM customer_general_vouchers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    pub async fn list_for_customer(
        &self,
        customer_id: &str,
    ) -> DbResult<Vec<CustomerGeneralVoucher>> {
        let vouchers = sqlx::query_as::<_, CustomerGeneralVoucher>(
            r#"
            SELECT id, customer_id, general_voucher_id, face_value_cents,
                   discount_bps, uses_remaining, expires_at, status, created_at
            FROM customer_general_vouchers
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(vouchers)
    }

    /// Expiry sweep over customer-owned general vouchers.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE customer_general_vouchers
            SET status = 'expired'
            WHERE status = 'active' AND expires_at < ?1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Consumes one use of an owned general voucher inside a caller-owned
/// transaction. `discount_cents` is the per-payment discount the caller
/// already computed; returned so the commit path logs consistently.
pub(crate) async fn consume_in_tx(
    conn: &mut SqliteConnection,
    owned_id: &str,
    discount_cents: i64,
    now: DateTime<Utc>,
) -> DbResult<ConsumeOutcome> {
    let consumed = sqlx::query(
        r#"
        UPDATE customer_general_vouchers
        SET uses_remaining = uses_remaining - 1,
            status = CASE WHEN uses_remaining - 1 <= 0 THEN 'used' ELSE status END
        WHERE id = ?1 AND status = 'active' AND uses_remaining > 0 AND expires_at >= ?2
        "#,
    )
    .bind(owned_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if consumed.rows_affected() > 0 {
        debug!(voucher = %owned_id, discount_cents, "General voucher use consumed");
        return Ok(ConsumeOutcome::Consumed { discount_cents });
    }

    let row: Option<(CustomerVoucherStatus, DateTime<Utc>)> = sqlx::query_as(
        "SELECT status, expires_at FROM customer_general_vouchers WHERE id = ?1",
    )
    .bind(owned_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (status, expires_at) =
        row.ok_or_else(|| DbError::not_found("Customer general voucher", owned_id))?;

    if status == CustomerVoucherStatus::Active && now > expires_at {
        return Ok(ConsumeOutcome::Expired);
    }
    if status == CustomerVoucherStatus::Expired {
        return Ok(ConsumeOutcome::Expired);
    }
    Ok(ConsumeOutcome::NotUsable { status })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use eatoff_core::WalletEntryKind;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn template(stock: i64, price: i64) -> GeneralVoucher {
        GeneralVoucher {
            id: "gv-1".into(),
            name: "Welcome".into(),
            face_value_cents: 500,
            discount_bps: 1000,
            price_cents: price,
            stock_quantity: stock,
            sold_quantity: 0,
            usage_limit: 1,
            validity_days: 30,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    async fn funded_customer(db: &Database, cents: i64) -> String {
        let customer = db.wallet().create_customer("Faye").await.unwrap();
        db.wallet()
            .credit(
                &customer.id,
                LedgerKind::Cash,
                cents,
                WalletEntryKind::Deposit,
                EntryContext::default(),
            )
            .await
            .unwrap();
        customer.id
    }

    #[tokio::test]
    async fn test_purchase_charges_wallet_and_snapshots() {
        let db = db().await;
        db.general_vouchers()
            .insert_template(&template(10, 200))
            .await
            .unwrap();
        let customer = funded_customer(&db, 1000).await;

        let outcome = db
            .general_vouchers()
            .purchase(&customer, "gv-1", Utc::now())
            .await
            .unwrap();

        let owned = match outcome {
            PurchaseOutcome::Purchased(v) => v,
            other => panic!("expected purchase, got {other:?}"),
        };
        assert_eq!(owned.face_value_cents, 500);
        assert_eq!(owned.uses_remaining, 1);

        let fresh = db.wallet().get_customer(&customer).await.unwrap().unwrap();
        assert_eq!(fresh.cash_balance_cents, 800);

        let tpl = db
            .general_vouchers()
            .get_template("gv-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tpl.sold_quantity, 1);
    }

    #[tokio::test]
    async fn test_last_unit_sells_once() {
        let db = db().await;
        db.general_vouchers()
            .insert_template(&template(1, 200))
            .await
            .unwrap();
        let customer = funded_customer(&db, 1000).await;

        let first = db
            .general_vouchers()
            .purchase(&customer, "gv-1", Utc::now())
            .await
            .unwrap();
        assert!(matches!(first, PurchaseOutcome::Purchased(_)));

        // second buyer of the last unit is refused
        let second = db
            .general_vouchers()
            .purchase(&customer, "gv-1", Utc::now())
            .await
            .unwrap();
        assert!(matches!(second, PurchaseOutcome::OutOfStock));
    }

    #[tokio::test]
    async fn test_insufficient_funds_rolls_back_stock() {
        let db = db().await;
        db.general_vouchers()
            .insert_template(&template(5, 200))
            .await
            .unwrap();
        let customer = funded_customer(&db, 100).await;

        let outcome = db
            .general_vouchers()
            .purchase(&customer, "gv-1", Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            PurchaseOutcome::InsufficientFunds {
                balance: 100,
                shortfall: 100,
            }
        ));

        let tpl = db
            .general_vouchers()
            .get_template("gv-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tpl.sold_quantity, 0);
    }

    #[tokio::test]
    async fn test_consume_single_use() {
        let db = db().await;
        db.general_vouchers()
            .insert_template(&template(5, 200))
            .await
            .unwrap();
        let customer = funded_customer(&db, 1000).await;

        let owned = match db
            .general_vouchers()
            .purchase(&customer, "gv-1", Utc::now())
            .await
            .unwrap()
        {
            PurchaseOutcome::Purchased(v) => v,
            other => panic!("expected purchase, got {other:?}"),
        };

        let mut tx = db.pool().begin().await.unwrap();
        let first = consume_in_tx(&mut tx, &owned.id, 300, Utc::now())
            .await
            .unwrap();
        assert_eq!(first, ConsumeOutcome::Consumed { discount_cents: 300 });
        let second = consume_in_tx(&mut tx, &owned.id, 300, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            second,
            ConsumeOutcome::NotUsable {
                status: CustomerVoucherStatus::Used,
            }
        );
        tx.commit().await.unwrap();
    }
}
