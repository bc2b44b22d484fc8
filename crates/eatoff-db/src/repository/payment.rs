//! # Payment Repository
//!
//! Commits a quoted payment breakdown as ONE SQLite transaction.
//!
//! ## Commit Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 commit(breakdown) — one transaction                     │
//! │                                                                         │
//! │   1. INSERT qr_nonces(nonce)        ── unique PK = single-use guard    │
//! │   2. redeem voucher meal            ── guarded increment (if voucher)  │
//! │   3. consume general voucher use    ── guarded decrement (if general)  │
//! │   4. debit points ledger            ── guarded, exact shortfall        │
//! │   5. debit cash ledger              ── guarded, exact shortfall        │
//! │   6. INSERT payment_transactions    ── immutable settlement record     │
//! │   7. credit earned points           ── separate ledger entry           │
//! │                                                                         │
//! │  ANY step failing rolls the whole set back, including the nonce:       │
//! │  a payment that did not settle leaves the QR replayable, and a nonce   │
//! │  is only ever burned by the payment that actually happened.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::general_voucher::{consume_in_tx, ConsumeOutcome};
use crate::repository::voucher::{redeem_meal_in_tx, RedeemOutcome};
use crate::repository::wallet::{credit_in_tx, debit_in_tx, DebitOutcome, EntryContext};
use eatoff_core::{
    Breakdown, CommissionSplit, CustomerVoucherStatus, LedgerKind, PaymentTransaction,
    TransactionStatus, WalletEntryKind,
};

/// Outcome of a commit attempt. Every non-`Committed` variant means the
/// transaction rolled back and NOTHING was written.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Committed(PaymentTransaction),
    /// The nonce was already burned by a previous successful payment.
    NonceAlreadyUsed,
    InsufficientFunds { balance: i64, shortfall: i64 },
    InsufficientPoints { balance: i64, shortfall: i64 },
    VoucherNotRedeemable(RedeemOutcome),
    GeneralVoucherNotUsable { status: CustomerVoucherStatus },
    GeneralVoucherExpired,
}

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Commits a breakdown: nonce consumption, debits, voucher effects and
    /// the settlement record, atomically.
    ///
    /// The quote already validated against a snapshot; every portion is
    /// re-checked here by the guarded writes, so a snapshot gone stale
    /// between quote and commit fails cleanly.
    pub async fn commit(
        &self,
        customer_id: &str,
        restaurant_id: &str,
        breakdown: &Breakdown,
        commission: &CommissionSplit,
        qr_nonce: &str,
        now: DateTime<Utc>,
    ) -> DbResult<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        // 1. Burn the nonce. Unique PK makes replays collide here.
        let burned = sqlx::query("INSERT INTO qr_nonces (nonce, consumed_at) VALUES (?1, ?2)")
            .bind(qr_nonce)
            .bind(now)
            .execute(&mut *tx)
            .await;
        if let Err(err) = burned {
            return match DbError::from(err) {
                DbError::UniqueViolation { .. } => Ok(CommitOutcome::NonceAlreadyUsed),
                other => Err(other),
            };
        }

        let transaction_id = Uuid::new_v4().to_string();
        let context = EntryContext {
            restaurant_id: Some(restaurant_id.to_string()),
            payment_transaction_id: Some(transaction_id.clone()),
        };

        // 2. Voucher meal
        if let Some(voucher_id) = &breakdown.voucher_id {
            let outcome = redeem_meal_in_tx(&mut tx, voucher_id, now).await?;
            if !matches!(outcome, RedeemOutcome::Redeemed { .. }) {
                return Ok(CommitOutcome::VoucherNotRedeemable(outcome));
            }
        }

        // 3. General voucher use
        if let Some(owned_id) = &breakdown.general_voucher_id {
            let outcome =
                consume_in_tx(&mut tx, owned_id, breakdown.discount_cents, now).await?;
            match outcome {
                ConsumeOutcome::Consumed { .. } => {}
                ConsumeOutcome::Expired => return Ok(CommitOutcome::GeneralVoucherExpired),
                ConsumeOutcome::NotUsable { status } => {
                    return Ok(CommitOutcome::GeneralVoucherNotUsable { status })
                }
            }
        }

        // 4. Points portion
        if breakdown.points_used > 0 {
            let outcome = debit_in_tx(
                &mut tx,
                customer_id,
                LedgerKind::Points,
                breakdown.points_used,
                WalletEntryKind::PointsRedeemed,
                &context,
            )
            .await?;
            if let DebitOutcome::InsufficientBalance { balance, shortfall } = outcome {
                return Ok(CommitOutcome::InsufficientPoints { balance, shortfall });
            }
        }

        // 5. Cash portion
        if breakdown.cash_cents > 0 {
            let outcome = debit_in_tx(
                &mut tx,
                customer_id,
                LedgerKind::Cash,
                breakdown.cash_cents,
                WalletEntryKind::Payment,
                &context,
            )
            .await?;
            if let DebitOutcome::InsufficientBalance { balance, shortfall } = outcome {
                return Ok(CommitOutcome::InsufficientFunds { balance, shortfall });
            }
        }

        // 6. Settlement record
        let transaction = PaymentTransaction {
            id: transaction_id,
            customer_id: customer_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
            total_amount_cents: breakdown.amount_cents,
            method: breakdown.method,
            voucher_cents: breakdown.voucher_cents,
            points_used: breakdown.points_used,
            cash_cents: breakdown.cash_cents,
            discount_cents: breakdown.discount_cents,
            commission_bps: commission.rate_bps,
            commission_cents: commission.commission_cents,
            restaurant_net_cents: commission.restaurant_net_cents,
            qr_nonce: qr_nonce.to_string(),
            status: TransactionStatus::Completed,
            settlement_id: None,
            created_at: now,
        };
        insert_transaction(&mut tx, &transaction).await?;

        // 7. Earned points, as their own ledger entry after the payment
        let earned = breakdown.points_earned();
        if earned > 0 {
            credit_in_tx(
                &mut tx,
                customer_id,
                LedgerKind::Points,
                earned,
                WalletEntryKind::PointsEarned,
                &context,
            )
            .await?;
        }

        tx.commit().await?;
        info!(
            transaction = %transaction.id,
            customer = %customer_id,
            restaurant = %restaurant_id,
            amount_cents = breakdown.amount_cents,
            method = ?breakdown.method,
            points_earned = earned,
            "Payment committed"
        );
        Ok(CommitOutcome::Committed(transaction))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT id, customer_id, restaurant_id, total_amount_cents, method,
                   voucher_cents, points_used, cash_cents, discount_cents,
                   commission_bps, commission_cents, restaurant_net_cents,
                   qr_nonce, status, settlement_id, created_at
            FROM payment_transactions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// A restaurant's transactions in a period, oldest first.
    pub async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<PaymentTransaction>> {
        let transactions = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT id, customer_id, restaurant_id, total_amount_cents, method,
                   voucher_cents, points_used, cash_cents, discount_cents,
                   commission_bps, commission_cents, restaurant_net_cents,
                   qr_nonce, status, settlement_id, created_at
            FROM payment_transactions
            WHERE restaurant_id = ?1 AND created_at >= ?2 AND created_at < ?3
            ORDER BY created_at ASC
            "#,
        )
        .bind(restaurant_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}

async fn insert_transaction(
    conn: &mut sqlx::SqliteConnection,
    t: &PaymentTransaction,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payment_transactions (
            id, customer_id, restaurant_id, total_amount_cents, method,
            voucher_cents, points_used, cash_cents, discount_cents,
            commission_bps, commission_cents, restaurant_net_cents,
            qr_nonce, status, settlement_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&t.id)
    .bind(&t.customer_id)
    .bind(&t.restaurant_id)
    .bind(t.total_amount_cents)
    .bind(t.method)
    .bind(t.voucher_cents)
    .bind(t.points_used)
    .bind(t.cash_cents)
    .bind(t.discount_cents)
    .bind(t.commission_bps)
    .bind(t.commission_cents)
    .bind(t.restaurant_net_cents)
    .bind(&t.qr_nonce)
    .bind(t.status)
    .bind(&t.settlement_id)
    .bind(t.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use eatoff_core::{split_commission, Money, PaymentMethod, PurchasedVoucher, VoucherStatus};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed(db: &Database, cash: i64, points: i64) -> String {
        let customer = db.wallet().create_customer("Hana").await.unwrap();
        db.restaurants()
            .upsert("rest-1", "Bistro", None)
            .await
            .unwrap();
        if cash > 0 {
            db.wallet()
                .credit(
                    &customer.id,
                    LedgerKind::Cash,
                    cash,
                    WalletEntryKind::Deposit,
                    EntryContext::default(),
                )
                .await
                .unwrap();
        }
        if points > 0 {
            db.wallet()
                .credit(
                    &customer.id,
                    LedgerKind::Points,
                    points,
                    WalletEntryKind::AdminCredit,
                    EntryContext::default(),
                )
                .await
                .unwrap();
        }
        customer.id
    }

    fn cash_breakdown(cents: i64) -> Breakdown {
        Breakdown {
            method: PaymentMethod::Cash,
            amount_cents: cents,
            voucher_id: None,
            voucher_cents: 0,
            points_used: 0,
            cash_cents: cents,
            general_voucher_id: None,
            discount_cents: 0,
        }
    }

    #[tokio::test]
    async fn test_cash_commit_settles_and_earns_points() {
        let db = db().await;
        let customer = seed(&db, 10_000, 0).await;

        let breakdown = cash_breakdown(4000);
        let commission = split_commission(Money::from_cents(4000), None);
        let outcome = db
            .payments()
            .commit(&customer, "rest-1", &breakdown, &commission, "nonce-1", Utc::now())
            .await
            .unwrap();

        let transaction = match outcome {
            CommitOutcome::Committed(t) => t,
            other => panic!("expected commit, got {other:?}"),
        };
        assert_eq!(transaction.commission_cents, 220);
        assert_eq!(transaction.restaurant_net_cents, 3780);
        assert_eq!(transaction.status, TransactionStatus::Completed);

        let fresh = db.wallet().get_customer(&customer).await.unwrap().unwrap();
        assert_eq!(fresh.cash_balance_cents, 6000);
        // €40.00 cash spend earns 40 points
        assert_eq!(fresh.points_balance, 40);
        assert_eq!(fresh.total_points_earned, 40);

        // Payment and earned-points entries both reference the transaction
        let cash_entries = db
            .wallet()
            .history(&customer, LedgerKind::Cash, 0, 10)
            .await
            .unwrap();
        assert_eq!(
            cash_entries[0].payment_transaction_id.as_deref(),
            Some(transaction.id.as_str())
        );
    }

    #[tokio::test]
    async fn test_nonce_single_use() {
        let db = db().await;
        let customer = seed(&db, 10_000, 0).await;
        let commission = split_commission(Money::from_cents(1000), None);

        let first = db
            .payments()
            .commit(&customer, "rest-1", &cash_breakdown(1000), &commission, "nonce-x", Utc::now())
            .await
            .unwrap();
        assert!(matches!(first, CommitOutcome::Committed(_)));

        let second = db
            .payments()
            .commit(&customer, "rest-1", &cash_breakdown(1000), &commission, "nonce-x", Utc::now())
            .await
            .unwrap();
        assert!(matches!(second, CommitOutcome::NonceAlreadyUsed));

        // The replay debited nothing
        let fresh = db.wallet().get_customer(&customer).await.unwrap().unwrap();
        assert_eq!(fresh.cash_balance_cents, 9000);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_nonce_replayable() {
        let db = db().await;
        let customer = seed(&db, 500, 0).await;
        let commission = split_commission(Money::from_cents(1000), None);

        // Insufficient: whole transaction, nonce included, rolls back
        let outcome = db
            .payments()
            .commit(&customer, "rest-1", &cash_breakdown(1000), &commission, "nonce-y", Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::InsufficientFunds {
                balance: 500,
                shortfall: 500,
            }
        ));

        // Same nonce works after a top-up
        db.wallet()
            .credit(
                &customer,
                LedgerKind::Cash,
                1000,
                WalletEntryKind::Deposit,
                EntryContext::default(),
            )
            .await
            .unwrap();
        let retry = db
            .payments()
            .commit(&customer, "rest-1", &cash_breakdown(1000), &commission, "nonce-y", Utc::now())
            .await
            .unwrap();
        assert!(matches!(retry, CommitOutcome::Committed(_)));
    }

    #[tokio::test]
    async fn test_voucher_commit_consumes_one_meal() {
        let db = db().await;
        let customer = seed(&db, 0, 0).await;

        db.vouchers()
            .insert_package(&eatoff_core::VoucherPackage {
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

        let voucher = PurchasedVoucher {
            id: "v-1".into(),
            customer_id: customer.clone(),
            restaurant_id: "rest-1".into(),
            package_id: "pkg-1".into(),
            total_meals: 10,
            used_meals: 0,
            per_meal_value_cents: 1000,
            purchase_price_cents: 8000,
            discount_cents: 2000,
            expires_at: Utc::now() + Duration::days(30),
            status: VoucherStatus::Active,
            qr_reference: "ref-1".into(),
            created_at: Utc::now(),
        };
        db.vouchers().insert_voucher(&voucher).await.unwrap();

        let breakdown = Breakdown {
            method: PaymentMethod::Voucher,
            amount_cents: 950,
            voucher_id: Some("v-1".into()),
            voucher_cents: 950,
            points_used: 0,
            cash_cents: 0,
            general_voucher_id: None,
            discount_cents: 0,
        };
        let commission = split_commission(Money::from_cents(950), None);

        let outcome = db
            .payments()
            .commit(&customer, "rest-1", &breakdown, &commission, "nonce-v", Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let stored = db.vouchers().get_voucher("v-1").await.unwrap().unwrap();
        assert_eq!(stored.used_meals, 1);
        // No cash moved, no points earned
        let fresh = db.wallet().get_customer(&customer).await.unwrap().unwrap();
        assert_eq!(fresh.points_balance, 0);
    }

    #[tokio::test]
    async fn test_mixed_commit_debits_both_ledgers() {
        let db = db().await;
        let customer = seed(&db, 2000, 1000).await;

        let breakdown = Breakdown {
            method: PaymentMethod::Mixed,
            amount_cents: 3000,
            voucher_id: None,
            voucher_cents: 0,
            points_used: 1000,
            cash_cents: 2000,
            general_voucher_id: None,
            discount_cents: 0,
        };
        let commission = split_commission(Money::from_cents(3000), None);

        let outcome = db
            .payments()
            .commit(&customer, "rest-1", &breakdown, &commission, "nonce-m", Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let fresh = db.wallet().get_customer(&customer).await.unwrap().unwrap();
        assert_eq!(fresh.cash_balance_cents, 0);
        // 1000 spent, 20 earned on the €20.00 cash portion
        assert_eq!(fresh.points_balance, 20);
    }
}
