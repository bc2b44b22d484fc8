//! Pay-later authorization and deferred capture.

use chrono::{DateTime, Duration, Utc};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use eatoff_core::{
    pay_later_terms, CoreError, CustomerPlatformVoucher, CustomerVoucherStatus, DeferredPayment,
    DeferredStatus, Money, PlatformVoucherKind, Rate,
};

use crate::error::ApiResult;
use crate::state::AppState;

/// Authorizes a pay-later purchase: tokenizes the payment method, grants
/// the bonus-inclusive voucher immediately, and schedules the charge.
pub async fn authorize(
    state: &AppState,
    platform_voucher_id: &str,
    customer_id: &str,
    method_ref: &str,
) -> ApiResult<(CustomerPlatformVoucher, DeferredPayment)> {
    super::wallet::get_wallet(state, customer_id).await?;
    let template = state
        .db
        .platform()
        .get_template(platform_voucher_id)
        .await?
        .ok_or_else(|| CoreError::PlatformVoucherNotFound(platform_voucher_id.to_string()))?;

    if template.kind != PlatformVoucherKind::PayLater {
        return Err(CoreError::NotPayLater(platform_voucher_id.to_string()).into());
    }

    let method_token = state
        .gateway
        .authorize_payment_method(customer_id, method_ref)
        .await?;

    let now = Utc::now();
    let terms = pay_later_terms(
        Money::from_cents(template.price_cents),
        Rate::from_bps(template.discount_bps),
        Rate::from_bps(template.bonus_bps),
        template.payment_term_days,
        now,
    );

    let grant = CustomerPlatformVoucher {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        platform_voucher_id: template.id.clone(),
        value_cents: terms.total_value_cents,
        expires_at: now + Duration::days(template.validity_days as i64),
        status: CustomerVoucherStatus::Active,
        created_at: now,
    };
    let deferred = DeferredPayment {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        platform_voucher_id: template.id.clone(),
        customer_platform_voucher_id: grant.id.clone(),
        method_token,
        original_amount_cents: terms.original_cents,
        bonus_amount_cents: terms.bonus_cents,
        total_value_cents: terms.total_value_cents,
        scheduled_charge_at: terms.scheduled_charge_at,
        status: DeferredStatus::Pending,
        attempts: 0,
        claimed_at: None,
        charged_at: None,
        failure_reason: None,
        created_at: now,
    };
    state
        .db
        .platform()
        .record_authorization(&grant, &deferred)
        .await?;

    info!(
        customer = %customer_id,
        platform_voucher = %template.id,
        value_cents = terms.total_value_cents,
        charge_cents = terms.original_cents,
        scheduled_at = %terms.scheduled_charge_at,
        "Pay-later authorized"
    );
    Ok((grant, deferred))
}

/// Captures every due deferred payment. Returns (charged, failed).
///
/// Only the original amount is ever charged; the bonus was granted as
/// voucher value and stays granted whatever the gateway says.
pub async fn run_due_captures(state: &AppState, as_of: DateTime<Utc>) -> ApiResult<(u64, u64)> {
    let claimed = state.db.platform().claim_due(as_of).await?;
    let gateway_timeout = std::time::Duration::from_secs(state.config.gateway_timeout_secs);

    let mut charged = 0;
    let mut failed = 0;
    for row in claimed {
        let charge = timeout(
            gateway_timeout,
            state
                .gateway
                .charge(&row.method_token, row.original_amount_cents),
        )
        .await;

        // A bookkeeping failure on one row must not abandon the rest of
        // the batch: log it and move on. The row stays `capturing` and is
        // reclaimed once its claim goes stale.
        match charge {
            Ok(Ok(reference)) => {
                match state.db.platform().mark_charged(&row.id, Utc::now()).await {
                    Ok(()) => {
                        info!(
                            deferred = %row.id,
                            amount_cents = row.original_amount_cents,
                            reference,
                            "Deferred payment captured"
                        );
                        charged += 1;
                    }
                    Err(err) => {
                        error!(deferred = %row.id, %err, "Failed to record deferred charge");
                    }
                }
            }
            Ok(Err(err)) => {
                error!(deferred = %row.id, %err, "Gateway declined deferred capture");
                if let Err(err) = state
                    .db
                    .platform()
                    .mark_failed(&row.id, &err.to_string())
                    .await
                {
                    error!(deferred = %row.id, %err, "Failed to record declined capture");
                }
                failed += 1;
            }
            Err(_) => {
                warn!(deferred = %row.id, "Gateway charge timed out");
                if let Err(err) = state
                    .db
                    .platform()
                    .mark_failed(&row.id, "gateway timeout")
                    .await
                {
                    error!(deferred = %row.id, %err, "Failed to record capture timeout");
                }
                failed += 1;
            }
        }
    }

    Ok((charged, failed))
}
