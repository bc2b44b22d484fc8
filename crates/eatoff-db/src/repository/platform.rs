//! # Platform Voucher Repository
//!
//! Platform ("Eatoff") voucher templates, customer grants, and the
//! deferred-payment rows behind "Pay Later".
//!
//! ## Capture Claiming
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               Exactly-Once Deferred Capture                             │
//! │                                                                         │
//! │  scheduler tick A ──┐                                                   │
//! │                     ├──► UPDATE deferred_payments                       │
//! │  scheduler tick B ──┘    SET status = 'capturing',                      │
//! │                              attempts = attempts + 1                    │
//! │                          WHERE status = 'pending'                       │
//! │                            AND scheduled_charge_at <= now               │
//! │                          RETURNING *                                    │
//! │                                                                         │
//! │  A due row is returned to exactly ONE tick; the other sees it already  │
//! │  capturing and skips it. The gateway charge happens OUTSIDE the        │
//! │  transaction, then the row moves capturing → charged | failed.         │
//! │                                                                         │
//! │  A row stranded in 'capturing' (crash between claim and finish) is     │
//! │  reclaimed once its claim is older than STALE_CLAIM_AFTER, until       │
//! │  MAX_CAPTURE_ATTEMPTS is spent; after that it is failed outright.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use eatoff_core::{CustomerPlatformVoucher, DeferredPayment, PlatformVoucher};

const DEFERRED_COLUMNS: &str = r#"
    id, customer_id, platform_voucher_id, customer_platform_voucher_id,
    method_token, original_amount_cents, bonus_amount_cents, total_value_cents,
    scheduled_charge_at, status, attempts, claimed_at, charged_at,
    failure_reason, created_at
"#;

/// A `capturing` claim older than this is considered abandoned and may be
/// claimed again.
pub const STALE_CLAIM_AFTER_SECS: i64 = 600;

/// Total capture attempts before a stranded row is failed for good.
pub const MAX_CAPTURE_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone)]
pub struct PlatformVoucherRepository {
    pool: SqlitePool,
}

impl PlatformVoucherRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PlatformVoucherRepository { pool }
    }

    /// Inserts a voucher template (catalog seeding / admin correction).
    pub async fn insert_template(&self, voucher: &PlatformVoucher) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_vouchers (
                id, name, price_cents, discount_bps, kind, bonus_bps,
                payment_term_days, requires_preauth, validity_days,
                is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.name)
        .bind(voucher.price_cents)
        .bind(voucher.discount_bps)
        .bind(voucher.kind)
        .bind(voucher.bonus_bps)
        .bind(voucher.payment_term_days)
        .bind(voucher.requires_preauth)
        .bind(voucher.validity_days)
        .bind(voucher.is_active)
        .bind(voucher.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_template(&self, id: &str) -> DbResult<Option<PlatformVoucher>> {
        let voucher = sqlx::query_as::<_, PlatformVoucher>(
            r#"
            SELECT id, name, price_cents, discount_bps, kind, bonus_bps,
                   payment_term_days, requires_preauth, validity_days,
                   is_active, created_at
            FROM platform_vouchers
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    /// Records a pay-later authorization: the granted voucher and its
    /// pending deferred payment, in one transaction. The grant is
    /// immediate and is never revoked by a later capture failure.
    pub async fn record_authorization(
        &self,
        grant: &CustomerPlatformVoucher,
        deferred: &DeferredPayment,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO customer_platform_vouchers (
                id, customer_id, platform_voucher_id, value_cents,
                expires_at, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&grant.id)
        .bind(&grant.customer_id)
        .bind(&grant.platform_voucher_id)
        .bind(grant.value_cents)
        .bind(grant.expires_at)
        .bind(grant.status)
        .bind(grant.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO deferred_payments (
                id, customer_id, platform_voucher_id, customer_platform_voucher_id,
                method_token, original_amount_cents, bonus_amount_cents,
                total_value_cents, scheduled_charge_at, status, attempts,
                claimed_at, charged_at, failure_reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&deferred.id)
        .bind(&deferred.customer_id)
        .bind(&deferred.platform_voucher_id)
        .bind(&deferred.customer_platform_voucher_id)
        .bind(&deferred.method_token)
        .bind(deferred.original_amount_cents)
        .bind(deferred.bonus_amount_cents)
        .bind(deferred.total_value_cents)
        .bind(deferred.scheduled_charge_at)
        .bind(deferred.status)
        .bind(deferred.attempts)
        .bind(deferred.claimed_at)
        .bind(deferred.charged_at)
        .bind(&deferred.failure_reason)
        .bind(deferred.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            customer = %grant.customer_id,
            deferred = %deferred.id,
            total_value_cents = deferred.total_value_cents,
            "Pay-later authorization recorded"
        );
        Ok(())
    }

    pub async fn get_deferred(&self, id: &str) -> DbResult<Option<DeferredPayment>> {
        let deferred = sqlx::query_as::<_, DeferredPayment>(&format!(
            "SELECT {DEFERRED_COLUMNS} FROM deferred_payments WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(deferred)
    }

    pub async fn get_grant(&self, id: &str) -> DbResult<Option<CustomerPlatformVoucher>> {
        let grant = sqlx::query_as::<_, CustomerPlatformVoucher>(
            r#"
            SELECT id, customer_id, platform_voucher_id, value_cents,
                   expires_at, status, created_at
            FROM customer_platform_vouchers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(grant)
    }

    /// Claims every due pending row for capture, plus any `capturing` row
    /// whose claim went stale (crashed claimer) and still has attempts
    /// left. Each returned row is now `capturing` with its attempt counter
    /// bumped and `claimed_at` refreshed; no other claimer will see it
    /// until the claim itself goes stale.
    pub async fn claim_due(&self, as_of: DateTime<Utc>) -> DbResult<Vec<DeferredPayment>> {
        let stale_before = as_of - chrono::Duration::seconds(STALE_CLAIM_AFTER_SECS);
        let mut tx = self.pool.begin().await?;

        // Stranded rows that burned their attempt budget go to manual
        // collection instead of looping forever
        let exhausted = sqlx::query(
            r#"
            UPDATE deferred_payments
            SET status = 'failed', failure_reason = 'capture attempts exhausted'
            WHERE status = 'capturing' AND claimed_at <= ?1 AND attempts >= ?2
            "#,
        )
        .bind(stale_before)
        .bind(MAX_CAPTURE_ATTEMPTS)
        .execute(&mut *tx)
        .await?;
        if exhausted.rows_affected() > 0 {
            warn!(
                count = exhausted.rows_affected(),
                "Deferred payments failed after exhausting capture attempts"
            );
        }

        let claimed = sqlx::query_as::<_, DeferredPayment>(&format!(
            r#"
            UPDATE deferred_payments
            SET status = 'capturing', attempts = attempts + 1, claimed_at = ?1
            WHERE (status = 'pending' AND scheduled_charge_at <= ?1)
               OR (status = 'capturing' AND claimed_at <= ?2 AND attempts < ?3)
            RETURNING {DEFERRED_COLUMNS}
            "#
        ))
        .bind(as_of)
        .bind(stale_before)
        .bind(MAX_CAPTURE_ATTEMPTS)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        if !claimed.is_empty() {
            info!(count = claimed.len(), "Claimed due deferred payments");
        }
        Ok(claimed)
    }

    /// capturing → charged.
    pub async fn mark_charged(&self, id: &str, charged_at: DateTime<Utc>) -> DbResult<()> {
        self.finish_capture(id, "charged", Some(charged_at), None)
            .await
    }

    /// capturing → failed. The granted voucher stays untouched; the row
    /// is surfaced for manual collection.
    pub async fn mark_failed(&self, id: &str, reason: &str) -> DbResult<()> {
        warn!(deferred = %id, reason, "Deferred capture failed");
        self.finish_capture(id, "failed", None, Some(reason)).await
    }

    async fn finish_capture(
        &self,
        id: &str,
        status: &str,
        charged_at: Option<DateTime<Utc>>,
        failure_reason: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE deferred_payments
            SET status = ?1, charged_at = ?2, failure_reason = ?3
            WHERE id = ?4 AND status = 'capturing'
            "#,
        )
        .bind(status)
        .bind(charged_at)
        .bind(failure_reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Capturing deferred payment", id));
        }
        Ok(())
    }

    /// Expiry sweep over granted platform vouchers.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE customer_platform_vouchers
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

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use eatoff_core::{CustomerVoucherStatus, DeferredStatus, PlatformVoucherKind};
    use uuid::Uuid;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn pay_later_template() -> PlatformVoucher {
        PlatformVoucher {
            id: "pv-1".into(),
            name: "Eatoff 100".into(),
            price_cents: 10_000,
            discount_bps: 0,
            kind: PlatformVoucherKind::PayLater,
            bonus_bps: 500,
            payment_term_days: 30,
            requires_preauth: true,
            validity_days: 365,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    async fn seed_authorization(db: &Database, due_at: DateTime<Utc>) -> (String, String) {
        let customer = db.wallet().create_customer("Gus").await.unwrap();
        db.platform()
            .insert_template(&pay_later_template())
            .await
            .unwrap();

        let grant = CustomerPlatformVoucher {
            id: Uuid::new_v4().to_string(),
            customer_id: customer.id.clone(),
            platform_voucher_id: "pv-1".into(),
            value_cents: 10_500,
            expires_at: Utc::now() + Duration::days(365),
            status: CustomerVoucherStatus::Active,
            created_at: Utc::now(),
        };
        let deferred = DeferredPayment {
            id: Uuid::new_v4().to_string(),
            customer_id: customer.id.clone(),
            platform_voucher_id: "pv-1".into(),
            customer_platform_voucher_id: grant.id.clone(),
            method_token: "tok_abc".into(),
            original_amount_cents: 10_000,
            bonus_amount_cents: 500,
            total_value_cents: 10_500,
            scheduled_charge_at: due_at,
            status: DeferredStatus::Pending,
            attempts: 0,
            claimed_at: None,
            charged_at: None,
            failure_reason: None,
            created_at: Utc::now(),
        };
        db.platform()
            .record_authorization(&grant, &deferred)
            .await
            .unwrap();
        (grant.id, deferred.id)
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let db = db().await;
        let (_, deferred_id) = seed_authorization(&db, Utc::now() - Duration::hours(1)).await;

        let first = db.platform().claim_due(Utc::now()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, deferred_id);
        assert_eq!(first[0].status, DeferredStatus::Capturing);
        assert_eq!(first[0].attempts, 1);

        // Overlapping tick sees nothing
        let second = db.platform().claim_due(Utc::now()).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_stale_claim_is_reclaimed() {
        let db = db().await;
        let (_, deferred_id) = seed_authorization(&db, Utc::now() - Duration::hours(1)).await;

        let now = Utc::now();
        let first = db.platform().claim_due(now).await.unwrap();
        assert_eq!(first.len(), 1);

        // Claimer dies here without finishing; a fresh claim is left alone
        let fresh = db
            .platform()
            .claim_due(now + Duration::seconds(STALE_CLAIM_AFTER_SECS - 1))
            .await
            .unwrap();
        assert!(fresh.is_empty());

        // Once stale the row comes back for another attempt
        let reclaimed = db
            .platform()
            .claim_due(now + Duration::days(30))
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, deferred_id);
        assert_eq!(reclaimed[0].status, DeferredStatus::Capturing);
        assert_eq!(reclaimed[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_exhausted_claims_fail_for_manual_collection() {
        let db = db().await;
        let (grant_id, deferred_id) = seed_authorization(&db, Utc::now() - Duration::hours(1)).await;

        let mut tick = Utc::now();
        for attempt in 1..=MAX_CAPTURE_ATTEMPTS {
            let claimed = db.platform().claim_due(tick).await.unwrap();
            assert_eq!(claimed.len(), 1);
            assert_eq!(claimed[0].attempts, attempt);
            tick += Duration::seconds(STALE_CLAIM_AFTER_SECS + 1);
        }

        // Attempt budget spent: the row is failed, not reclaimed again
        let claimed = db.platform().claim_due(tick).await.unwrap();
        assert!(claimed.is_empty());

        let row = db.platform().get_deferred(&deferred_id).await.unwrap().unwrap();
        assert_eq!(row.status, DeferredStatus::Failed);
        assert_eq!(
            row.failure_reason.as_deref(),
            Some("capture attempts exhausted")
        );

        // Manual collection, never revocation
        let grant = db.platform().get_grant(&grant_id).await.unwrap().unwrap();
        assert_eq!(grant.status, CustomerVoucherStatus::Active);
    }

    #[tokio::test]
    async fn test_not_yet_due_is_not_claimed() {
        let db = db().await;
        seed_authorization(&db, Utc::now() + Duration::days(30)).await;

        let claimed = db.platform().claim_due(Utc::now()).await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn test_capture_terminal_transitions() {
        let db = db().await;
        let (grant_id, deferred_id) = seed_authorization(&db, Utc::now() - Duration::hours(1)).await;

        db.platform().claim_due(Utc::now()).await.unwrap();
        db.platform()
            .mark_failed(&deferred_id, "card declined")
            .await
            .unwrap();

        let row = db.platform().get_deferred(&deferred_id).await.unwrap().unwrap();
        assert_eq!(row.status, DeferredStatus::Failed);
        assert_eq!(row.failure_reason.as_deref(), Some("card declined"));

        // Failed capture never revokes the granted voucher
        let grant = db.platform().get_grant(&grant_id).await.unwrap().unwrap();
        assert_eq!(grant.status, CustomerVoucherStatus::Active);

        // A terminal row cannot transition again
        let err = db
            .platform()
            .mark_charged(&deferred_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
