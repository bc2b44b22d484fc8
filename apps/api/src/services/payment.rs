//! QR payment issue and redemption.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use eatoff_core::{
    quote, split_commission, validation, CoreError, PaymentMethod, PaymentTransaction, QrClaims,
    SplitRequest, WalletSnapshot,
};
use eatoff_db::CommitOutcome;

use crate::error::{ApiError, ApiResult};
use crate::services::MAX_BUSY_RETRIES;
use crate::state::AppState;

/// What the customer app renders: the signed token, its expiry, and a
/// scannable image stub.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedQr {
    pub payload: String,
    pub expires_at: DateTime<Utc>,
    pub qr_image: String,
}

/// Instrument references accompanying an issue request.
#[derive(Debug, Clone, Default)]
pub struct IssueInstrument {
    pub voucher_id: Option<String>,
    pub general_voucher_id: Option<String>,
    pub points_portion_cents: Option<i64>,
}

pub async fn issue_qr(
    state: &AppState,
    customer_id: &str,
    restaurant_id: &str,
    amount_cents: i64,
    method: PaymentMethod,
    instrument: IssueInstrument,
) -> ApiResult<IssuedQr> {
    validation::validate_amount_cents("amountCents", amount_cents).map_err(CoreError::from)?;
    super::wallet::get_wallet(state, customer_id).await?;
    state
        .db
        .restaurants()
        .get(restaurant_id)
        .await?
        .ok_or_else(|| CoreError::RestaurantNotFound(restaurant_id.to_string()))?;

    // The instrument the method needs must ride inside the signed payload
    match method {
        PaymentMethod::Voucher if instrument.voucher_id.is_none() => {
            return Err(CoreError::from(required("voucherId")).into());
        }
        PaymentMethod::GeneralVoucher if instrument.general_voucher_id.is_none() => {
            return Err(CoreError::from(required("generalVoucherId")).into());
        }
        PaymentMethod::Mixed if instrument.points_portion_cents.is_none() => {
            return Err(CoreError::from(required("pointsPortionCents")).into());
        }
        _ => {}
    }

    let now = Utc::now();
    let claims = QrClaims {
        customer_id: customer_id.to_string(),
        restaurant_id: restaurant_id.to_string(),
        amount_cents,
        method,
        voucher_id: instrument.voucher_id,
        general_voucher_id: instrument.general_voucher_id,
        points_portion_cents: instrument.points_portion_cents,
        nonce: fresh_nonce(),
        issued_at: now.timestamp(),
    };
    let payload = state.signer.sign(&claims).map_err(ApiError::Core)?;
    let expires_at = claims.expires_at();

    info!(
        customer = %customer_id,
        restaurant = %restaurant_id,
        amount_cents,
        method = ?method,
        "QR payment request issued"
    );
    Ok(IssuedQr {
        qr_image: render_qr_stub(&payload),
        payload,
        expires_at,
    })
}

/// Verifies a scanned payload and settles the payment atomically.
pub async fn redeem_qr(
    state: &AppState,
    restaurant_id: &str,
    payload: &str,
) -> ApiResult<PaymentTransaction> {
    let now = Utc::now();
    let claims = state
        .signer
        .verify_for_restaurant(payload, restaurant_id, now)
        .map_err(ApiError::Core)?;

    let customer = super::wallet::get_wallet(state, &claims.customer_id).await?;
    let restaurant = state
        .db
        .restaurants()
        .get(restaurant_id)
        .await?
        .ok_or_else(|| CoreError::RestaurantNotFound(restaurant_id.to_string()))?;

    // Resolve the instruments the claims reference
    let voucher = match &claims.voucher_id {
        Some(id) => {
            let v = state
                .db
                .vouchers()
                .get_voucher(id)
                .await?
                .filter(|v| v.customer_id == claims.customer_id)
                .ok_or_else(|| CoreError::VoucherNotFound(id.clone()))?;
            Some(v)
        }
        None => None,
    };
    let general = match &claims.general_voucher_id {
        Some(id) => {
            let v = state
                .db
                .general_vouchers()
                .get_owned(id)
                .await?
                .filter(|v| v.customer_id == claims.customer_id)
                .ok_or_else(|| CoreError::VoucherNotFound(id.clone()))?;
            Some(v)
        }
        None => None,
    };

    let request = match claims.method {
        PaymentMethod::Cash => SplitRequest::Cash,
        PaymentMethod::Points => SplitRequest::Points,
        PaymentMethod::Voucher => {
            let v = voucher
                .as_ref()
                .ok_or_else(|| CoreError::QrMalformed("voucher payment without voucherId".into()))?;
            SplitRequest::Voucher(v)
        }
        PaymentMethod::GeneralVoucher => {
            let v = general.as_ref().ok_or_else(|| {
                CoreError::QrMalformed("general voucher payment without generalVoucherId".into())
            })?;
            SplitRequest::General(v)
        }
        PaymentMethod::Mixed => {
            let points_portion_cents = claims.points_portion_cents.ok_or_else(|| {
                CoreError::QrMalformed("mixed payment without pointsPortionCents".into())
            })?;
            SplitRequest::Mixed {
                points_portion_cents,
                cash_portion_cents: claims.amount_cents - points_portion_cents,
            }
        }
    };

    let snapshot = WalletSnapshot {
        cash_balance_cents: customer.cash_balance_cents,
        points_balance: customer.points_balance,
    };
    let breakdown = quote(
        eatoff_core::Money::from_cents(claims.amount_cents),
        &request,
        &snapshot,
        now,
    )
    .map_err(ApiError::Core)?;
    let commission = split_commission(
        eatoff_core::Money::from_cents(claims.amount_cents),
        restaurant.commission_bps,
    );

    // Bounded retry on writer contention, then give up loudly
    let mut attempt = 0;
    let outcome = loop {
        let result = state
            .db
            .payments()
            .commit(
                &claims.customer_id,
                restaurant_id,
                &breakdown,
                &commission,
                &claims.nonce,
                now,
            )
            .await;
        match result {
            Ok(outcome) => break outcome,
            Err(err) if err.is_retryable() => {
                attempt += 1;
                if attempt >= MAX_BUSY_RETRIES {
                    warn!(attempts = attempt, "Payment commit retry budget exhausted");
                    return Err(CoreError::TransientConflict.into());
                }
                tokio::time::sleep(std::time::Duration::from_millis(25 * attempt as u64)).await;
            }
            Err(err) => return Err(err.into()),
        }
    };

    let transaction = match outcome {
        CommitOutcome::Committed(transaction) => transaction,
        CommitOutcome::NonceAlreadyUsed => return Err(CoreError::QrAlreadyUsed.into()),
        CommitOutcome::InsufficientFunds { shortfall, .. } => {
            return Err(CoreError::InsufficientFunds {
                shortfall_cents: shortfall,
            }
            .into())
        }
        CommitOutcome::InsufficientPoints { shortfall, .. } => {
            return Err(CoreError::InsufficientPoints { shortfall }.into())
        }
        CommitOutcome::VoucherNotRedeemable(redeem) => {
            return Err(match redeem {
                eatoff_db::RedeemOutcome::Expired => CoreError::VoucherExpired,
                eatoff_db::RedeemOutcome::Exhausted { total_meals } => {
                    CoreError::VoucherExhausted { total_meals }
                }
                eatoff_db::RedeemOutcome::NotActive { status } => CoreError::VoucherNotActive {
                    status: status.as_str().to_string(),
                },
                eatoff_db::RedeemOutcome::Redeemed { .. } => CoreError::TransientConflict,
            }
            .into())
        }
        CommitOutcome::GeneralVoucherExpired => return Err(CoreError::VoucherExpired.into()),
        CommitOutcome::GeneralVoucherNotUsable { status } => {
            return Err(CoreError::VoucherNotActive {
                status: format!("{status:?}").to_lowercase(),
            }
            .into())
        }
    };

    // Fold into the daily rollups; a lost delivery is redelivered by the
    // scheduler's replay sweep, so the payment itself never fails here
    if let Err(err) = state.db.stats().record_transaction(&transaction).await {
        warn!(transaction = %transaction.id, %err, "Aggregate update failed");
    }

    Ok(transaction)
}

fn required(field: &str) -> eatoff_core::ValidationError {
    eatoff_core::ValidationError::Required {
        field: field.to_string(),
    }
}

fn fresh_nonce() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Placeholder for the out-of-process QR renderer: a data URL carrying
/// the signed token itself.
fn render_qr_stub(payload: &str) -> String {
    format!("data:text/plain;base64,{}", STANDARD.encode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use eatoff_core::{LedgerKind, WalletEntryKind};
    use eatoff_db::EntryContext;

    async fn seed(state: &AppState, cash: i64, points: i64) -> String {
        state
            .db
            .restaurants()
            .upsert("rest-1", "Bistro", Some(600))
            .await
            .unwrap();
        let customer = state.db.wallet().create_customer("Mo").await.unwrap();
        if cash > 0 {
            state
                .db
                .wallet()
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
            state
                .db
                .wallet()
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

    #[tokio::test]
    async fn test_issue_then_redeem_cash() {
        let state = AppState::for_tests().await;
        let customer = seed(&state, 10_000, 0).await;

        let issued = issue_qr(
            &state,
            &customer,
            "rest-1",
            4000,
            PaymentMethod::Cash,
            IssueInstrument::default(),
        )
        .await
        .unwrap();

        let transaction = redeem_qr(&state, "rest-1", &issued.payload).await.unwrap();
        // €40.00 at the 6% override
        assert_eq!(transaction.commission_cents, 240);
        assert_eq!(transaction.restaurant_net_cents, 3760);

        let wallet = super::super::wallet::get_wallet(&state, &customer).await.unwrap();
        assert_eq!(wallet.cash_balance_cents, 6000);
        assert_eq!(wallet.points_balance, 40);

        // Rollups saw it
        let day = state
            .db
            .stats()
            .restaurant_day("rest-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(day.order_count, 1);
        assert_eq!(day.gross_cents, 4000);
    }

    #[tokio::test]
    async fn test_replayed_payload_rejected() {
        let state = AppState::for_tests().await;
        let customer = seed(&state, 10_000, 0).await;

        let issued = issue_qr(
            &state,
            &customer,
            "rest-1",
            1000,
            PaymentMethod::Cash,
            IssueInstrument::default(),
        )
        .await
        .unwrap();

        redeem_qr(&state, "rest-1", &issued.payload).await.unwrap();
        let err = redeem_qr(&state, "rest-1", &issued.payload)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Core(CoreError::QrAlreadyUsed)));
    }

    #[tokio::test]
    async fn test_wrong_restaurant_rejected() {
        let state = AppState::for_tests().await;
        let customer = seed(&state, 10_000, 0).await;
        state
            .db
            .restaurants()
            .upsert("rest-2", "Other", None)
            .await
            .unwrap();

        let issued = issue_qr(
            &state,
            &customer,
            "rest-1",
            1000,
            PaymentMethod::Cash,
            IssueInstrument::default(),
        )
        .await
        .unwrap();

        let err = redeem_qr(&state, "rest-2", &issued.payload)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Core(CoreError::QrRestaurantMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_mixed_payment_through_qr() {
        let state = AppState::for_tests().await;
        let customer = seed(&state, 2000, 1000).await;

        let issued = issue_qr(
            &state,
            &customer,
            "rest-1",
            3000,
            PaymentMethod::Mixed,
            IssueInstrument {
                points_portion_cents: Some(1000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let transaction = redeem_qr(&state, "rest-1", &issued.payload).await.unwrap();
        assert_eq!(transaction.points_used, 1000);
        assert_eq!(transaction.cash_cents, 2000);
    }

    #[tokio::test]
    async fn test_insufficiency_surfaces_shortfall() {
        let state = AppState::for_tests().await;
        let customer = seed(&state, 5000, 0).await;

        // €50.01 against a €50.00 balance
        let issued = issue_qr(
            &state,
            &customer,
            "rest-1",
            5001,
            PaymentMethod::Cash,
            IssueInstrument::default(),
        )
        .await
        .unwrap();

        let err = redeem_qr(&state, "rest-1", &issued.payload)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Core(CoreError::InsufficientFunds { shortfall_cents: 1 })
        ));
    }
}
