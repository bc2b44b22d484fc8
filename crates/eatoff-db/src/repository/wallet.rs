//! # Wallet Repository
//!
//! The Ledger Store: customers' cash and points balances plus the
//! append-only wallet transaction log.
//!
//! ## Atomicity Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Guarded Balance Updates                              │
//! │                                                                         │
//! │  debit(customer, cash, 5001):                                          │
//! │                                                                         │
//! │    UPDATE customers                                                    │
//! │    SET    cash_balance_cents = cash_balance_cents - 5001               │
//! │    WHERE  id = ? AND cash_balance_cents >= 5001     ◄── the guard      │
//! │    RETURNING cash_balance_cents                                        │
//! │                                                                         │
//! │  • No row returned  → balance was insufficient, NOTHING was written    │
//! │  • Row returned     → balance moved and we hold the exact after value  │
//! │                                                                         │
//! │  The check and the write are ONE statement, so concurrent debits       │
//! │  against the same customer serialize on SQLite's writer and can        │
//! │  never race the balance below zero. The ledger entry is written in     │
//! │  the same transaction with consistent before/after snapshots.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use eatoff_core::{
    tier_for_lifetime_points, Customer, LedgerKind, MembershipTier, WalletEntryKind,
    WalletTransaction,
};

/// Outcome of a guarded debit.
///
/// Insufficiency is a domain outcome, not a database error, so it is
/// modeled explicitly instead of being folded into `DbError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// The debit was applied; the ledger entry was written.
    Applied { balance_after: i64 },
    /// The guard failed; nothing was written.
    InsufficientBalance { balance: i64, shortfall: i64 },
}

/// Metadata linking a ledger entry to its cause.
#[derive(Debug, Clone, Default)]
pub struct EntryContext {
    pub restaurant_id: Option<String>,
    pub payment_transaction_id: Option<String>,
}

/// Repository for customers and their two ledgers.
#[derive(Debug, Clone)]
pub struct WalletRepository {
    pool: SqlitePool,
}

impl WalletRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WalletRepository { pool }
    }

    /// Creates a customer with zero balances.
    pub async fn create_customer(&self, name: &str) -> DbResult<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            cash_balance_cents: 0,
            points_balance: 0,
            total_points_earned: 0,
            tier: MembershipTier::Bronze,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, cash_balance_cents, points_balance,
                total_points_earned, tier, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(customer.cash_balance_cents)
        .bind(customer.points_balance)
        .bind(customer.total_points_earned)
        .bind(customer.tier)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer by ID.
    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, cash_balance_cents, points_balance,
                   total_points_earned, tier, created_at, updated_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Credits a ledger and writes the entry, as one transaction.
    ///
    /// Returns the balance after the credit.
    pub async fn credit(
        &self,
        customer_id: &str,
        ledger: LedgerKind,
        amount: i64,
        kind: WalletEntryKind,
        context: EntryContext,
    ) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;
        let balance_after =
            credit_in_tx(&mut tx, customer_id, ledger, amount, kind, &context).await?;
        tx.commit().await?;
        Ok(balance_after)
    }

    /// Debits a ledger if the balance covers it, as one transaction.
    ///
    /// On insufficiency nothing is written and the exact shortfall is
    /// reported.
    pub async fn debit(
        &self,
        customer_id: &str,
        ledger: LedgerKind,
        amount: i64,
        kind: WalletEntryKind,
        context: EntryContext,
    ) -> DbResult<DebitOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = debit_in_tx(&mut tx, customer_id, ledger, amount, kind, &context).await?;
        if matches!(outcome, DebitOutcome::Applied { .. }) {
            tx.commit().await?;
        }
        // On insufficiency the transaction drops and rolls back (no-op)
        Ok(outcome)
    }

    /// Pages through a customer's ledger entries, newest first.
    pub async fn history(
        &self,
        customer_id: &str,
        ledger: LedgerKind,
        page: u32,
        per_page: u32,
    ) -> DbResult<Vec<WalletTransaction>> {
        let offset = page as i64 * per_page as i64;
        let entries = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT id, customer_id, ledger, kind, amount,
                   balance_before, balance_after,
                   restaurant_id, payment_transaction_id, created_at
            FROM wallet_transactions
            WHERE customer_id = ?1 AND ledger = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(customer_id)
        .bind(ledger)
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// Transaction-scoped primitives
// =============================================================================
// These run against a caller-owned connection so the payment repository can
// compose them with voucher redemption and nonce consumption inside ONE
// SQLite transaction.

/// Applies a credit and writes its ledger entry on `conn`.
pub(crate) async fn credit_in_tx(
    conn: &mut SqliteConnection,
    customer_id: &str,
    ledger: LedgerKind,
    amount: i64,
    kind: WalletEntryKind,
    context: &EntryContext,
) -> DbResult<i64> {
    debug!(customer = %customer_id, ?ledger, amount, "Applying credit");
    let now = Utc::now();

    let balance_after: i64 = match ledger {
        LedgerKind::Cash => {
            let row: Option<(i64,)> = sqlx::query_as(
                r#"
                UPDATE customers
                SET cash_balance_cents = cash_balance_cents + ?1, updated_at = ?2
                WHERE id = ?3
                RETURNING cash_balance_cents
                "#,
            )
            .bind(amount)
            .bind(now)
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await?;
            row.ok_or_else(|| DbError::not_found("Customer", customer_id))?.0
        }
        LedgerKind::Points => {
            // Earned points also raise lifetime volume, which drives tier
            let lifetime_delta = if kind == WalletEntryKind::PointsEarned {
                amount
            } else {
                0
            };
            let row: Option<(i64, i64)> = sqlx::query_as(
                r#"
                UPDATE customers
                SET points_balance = points_balance + ?1,
                    total_points_earned = total_points_earned + ?2,
                    updated_at = ?3
                WHERE id = ?4
                RETURNING points_balance, total_points_earned
                "#,
            )
            .bind(amount)
            .bind(lifetime_delta)
            .bind(now)
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await?;
            let (balance, lifetime) =
                row.ok_or_else(|| DbError::not_found("Customer", customer_id))?;

            if lifetime_delta > 0 {
                sqlx::query("UPDATE customers SET tier = ?1 WHERE id = ?2")
                    .bind(tier_for_lifetime_points(lifetime))
                    .bind(customer_id)
                    .execute(&mut *conn)
                    .await?;
            }
            balance
        }
    };

    insert_entry(
        conn,
        customer_id,
        ledger,
        kind,
        amount,
        balance_after - amount,
        balance_after,
        context,
    )
    .await?;

    Ok(balance_after)
}

/// Applies a guarded debit and, when applied, writes its ledger entry.
pub(crate) async fn debit_in_tx(
    conn: &mut SqliteConnection,
    customer_id: &str,
    ledger: LedgerKind,
    amount: i64,
    kind: WalletEntryKind,
    context: &EntryContext,
) -> DbResult<DebitOutcome> {
    debug!(customer = %customer_id, ?ledger, amount, "Applying debit");
    let now = Utc::now();

    let sql = match ledger {
        LedgerKind::Cash => {
            r#"
            UPDATE customers
            SET cash_balance_cents = cash_balance_cents - ?1, updated_at = ?2
            WHERE id = ?3 AND cash_balance_cents >= ?1
            RETURNING cash_balance_cents
            "#
        }
        LedgerKind::Points => {
            r#"
            UPDATE customers
            SET points_balance = points_balance - ?1, updated_at = ?2
            WHERE id = ?3 AND points_balance >= ?1
            RETURNING points_balance
            "#
        }
    };

    let row: Option<(i64,)> = sqlx::query_as(sql)
        .bind(amount)
        .bind(now)
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;

    let balance_after = match row {
        Some((balance_after,)) => balance_after,
        None => {
            // Distinguish unknown customer from insufficient balance
            let balance = current_balance(conn, customer_id, ledger).await?;
            return Ok(DebitOutcome::InsufficientBalance {
                balance,
                shortfall: amount - balance,
            });
        }
    };

    insert_entry(
        conn,
        customer_id,
        ledger,
        kind,
        -amount,
        balance_after + amount,
        balance_after,
        context,
    )
    .await?;

    Ok(DebitOutcome::Applied { balance_after })
}

async fn current_balance(
    conn: &mut SqliteConnection,
    customer_id: &str,
    ledger: LedgerKind,
) -> DbResult<i64> {
    let sql = match ledger {
        LedgerKind::Cash => "SELECT cash_balance_cents FROM customers WHERE id = ?1",
        LedgerKind::Points => "SELECT points_balance FROM customers WHERE id = ?1",
    };
    let row: Option<(i64,)> = sqlx::query_as(sql)
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| r.0)
        .ok_or_else(|| DbError::not_found("Customer", customer_id))
}

#[allow(clippy::too_many_arguments)]
async fn insert_entry(
    conn: &mut SqliteConnection,
    customer_id: &str,
    ledger: LedgerKind,
    kind: WalletEntryKind,
    amount: i64,
    balance_before: i64,
    balance_after: i64,
    context: &EntryContext,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (
            id, customer_id, ledger, kind, amount,
            balance_before, balance_after,
            restaurant_id, payment_transaction_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(customer_id)
    .bind(ledger)
    .bind(kind)
    .bind(amount)
    .bind(balance_before)
    .bind(balance_after)
    .bind(&context.restaurant_id)
    .bind(&context.payment_transaction_id)
    .bind(Utc::now())
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

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let db = db().await;
        let wallet = db.wallet();
        let customer = wallet.create_customer("Ana").await.unwrap();

        let after = wallet
            .credit(
                &customer.id,
                LedgerKind::Cash,
                5000,
                WalletEntryKind::Deposit,
                EntryContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(after, 5000);

        let outcome = wallet
            .debit(
                &customer.id,
                LedgerKind::Cash,
                1500,
                WalletEntryKind::Payment,
                EntryContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Applied { balance_after: 3500 });
    }

    #[tokio::test]
    async fn test_insufficient_debit_leaves_balance_untouched() {
        let db = db().await;
        let wallet = db.wallet();
        let customer = wallet.create_customer("Ben").await.unwrap();

        wallet
            .credit(
                &customer.id,
                LedgerKind::Cash,
                5000,
                WalletEntryKind::Deposit,
                EntryContext::default(),
            )
            .await
            .unwrap();

        // €50.00 balance, €50.01 debit
        let outcome = wallet
            .debit(
                &customer.id,
                LedgerKind::Cash,
                5001,
                WalletEntryKind::Payment,
                EntryContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DebitOutcome::InsufficientBalance {
                balance: 5000,
                shortfall: 1,
            }
        );

        let fresh = wallet.get_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(fresh.cash_balance_cents, 5000);

        // No ledger entry for the failed debit
        let entries = wallet
            .history(&customer.id, LedgerKind::Cash, 0, 50)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_chain_invariant() {
        let db = db().await;
        let wallet = db.wallet();
        let customer = wallet.create_customer("Cleo").await.unwrap();

        for amount in [1000_i64, 2500, 300] {
            wallet
                .credit(
                    &customer.id,
                    LedgerKind::Cash,
                    amount,
                    WalletEntryKind::Deposit,
                    EntryContext::default(),
                )
                .await
                .unwrap();
        }
        wallet
            .debit(
                &customer.id,
                LedgerKind::Cash,
                1200,
                WalletEntryKind::Payment,
                EntryContext::default(),
            )
            .await
            .unwrap();

        // Newest-first; reverse into chronological order to check the chain
        let mut entries = wallet
            .history(&customer.id, LedgerKind::Cash, 0, 50)
            .await
            .unwrap();
        entries.reverse();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].balance_before, 0);
        for pair in entries.windows(2) {
            assert_eq!(pair[0].balance_after, pair[1].balance_before);
        }
        assert_eq!(entries.last().unwrap().balance_after, 2600);
    }

    #[tokio::test]
    async fn test_points_earned_raises_lifetime_and_tier() {
        let db = db().await;
        let wallet = db.wallet();
        let customer = wallet.create_customer("Dia").await.unwrap();

        wallet
            .credit(
                &customer.id,
                LedgerKind::Points,
                60_000,
                WalletEntryKind::PointsEarned,
                EntryContext::default(),
            )
            .await
            .unwrap();

        let fresh = wallet.get_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(fresh.points_balance, 60_000);
        assert_eq!(fresh.total_points_earned, 60_000);
        assert_eq!(fresh.tier, MembershipTier::Silver);

        // Spending points does not reduce lifetime volume
        wallet
            .debit(
                &customer.id,
                LedgerKind::Points,
                60_000,
                WalletEntryKind::PointsRedeemed,
                EntryContext::default(),
            )
            .await
            .unwrap();
        let fresh = wallet.get_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(fresh.points_balance, 0);
        assert_eq!(fresh.total_points_earned, 60_000);
        assert_eq!(fresh.tier, MembershipTier::Silver);
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let db = db().await;
        let wallet = db.wallet();
        let customer = wallet.create_customer("Eri").await.unwrap();
        wallet
            .credit(
                &customer.id,
                LedgerKind::Cash,
                10_000,
                WalletEntryKind::Deposit,
                EntryContext::default(),
            )
            .await
            .unwrap();

        // Two €60.00 debits race against a €100.00 balance; the guard
        // lets exactly one through
        let (a, b) = tokio::join!(
            wallet.debit(
                &customer.id,
                LedgerKind::Cash,
                6000,
                WalletEntryKind::Payment,
                EntryContext::default(),
            ),
            wallet.debit(
                &customer.id,
                LedgerKind::Cash,
                6000,
                WalletEntryKind::Payment,
                EntryContext::default(),
            ),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let applied = outcomes
            .iter()
            .filter(|o| matches!(o, DebitOutcome::Applied { .. }))
            .count();
        assert_eq!(applied, 1);

        let fresh = wallet.get_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(fresh.cash_balance_cents, 4000);
    }

    #[tokio::test]
    async fn test_debit_unknown_customer() {
        let db = db().await;
        let err = db
            .wallet()
            .debit(
                "nope",
                LedgerKind::Cash,
                100,
                WalletEntryKind::Payment,
                EntryContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
