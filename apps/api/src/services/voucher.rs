//! Voucher purchases and redemptions.

use chrono::{Duration, Months, Utc};
use tracing::info;
use uuid::Uuid;

use eatoff_core::{
    validation, CoreError, CustomerGeneralVoucher, PurchasedVoucher, VoucherStatus,
};
use eatoff_db::{DbError, PurchaseOutcome, RedeemOutcome};

use crate::error::ApiResult;
use crate::state::AppState;

/// Purchases a meal-package voucher against an externally confirmed card
/// payment.
pub async fn purchase_package(
    state: &AppState,
    package_id: &str,
    customer_id: &str,
    payment_confirmation: &str,
) -> ApiResult<PurchasedVoucher> {
    super::wallet::get_wallet(state, customer_id).await?;
    if validation::validate_required("paymentConfirmation", payment_confirmation).is_err() {
        return Err(CoreError::PaymentNotConfirmed.into());
    }

    let package = state
        .db
        .vouchers()
        .get_package(package_id)
        .await?
        .ok_or_else(|| CoreError::PackageNotFound(package_id.to_string()))?;

    let now = Utc::now();
    let months = package.validity_months.unwrap_or(12);
    let expires_at = package.valid_until.unwrap_or_else(|| {
        now.checked_add_months(Months::new(months))
            .unwrap_or(now + Duration::days(31 * months as i64))
    });

    let voucher = PurchasedVoucher {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        restaurant_id: package.restaurant_id.clone(),
        package_id: package.id.clone(),
        total_meals: package.meal_count,
        used_meals: 0,
        per_meal_value_cents: package.price_per_meal_cents,
        purchase_price_cents: package.purchase_price().cents(),
        discount_cents: package.discount_amount().cents(),
        expires_at,
        status: VoucherStatus::Active,
        qr_reference: Uuid::new_v4().to_string(),
        created_at: now,
    };
    state.db.vouchers().insert_voucher(&voucher).await?;

    info!(
        customer = %customer_id,
        voucher = %voucher.id,
        package = %package.id,
        price_cents = voucher.purchase_price_cents,
        "Package voucher purchased"
    );
    Ok(voucher)
}

/// Redeems one meal; returns the meals left afterwards.
pub async fn redeem_meal(state: &AppState, voucher_id: &str) -> ApiResult<i64> {
    let outcome = state
        .db
        .vouchers()
        .redeem_meal(voucher_id, Utc::now())
        .await
        .map_err(|err| match err {
            DbError::NotFound { .. } => {
                CoreError::VoucherNotFound(voucher_id.to_string()).into()
            }
            other => crate::error::ApiError::Db(other),
        })?;

    match outcome {
        RedeemOutcome::Redeemed {
            remaining_meals, ..
        } => Ok(remaining_meals),
        RedeemOutcome::Expired => Err(CoreError::VoucherExpired.into()),
        RedeemOutcome::Exhausted { total_meals } => {
            Err(CoreError::VoucherExhausted { total_meals }.into())
        }
        RedeemOutcome::NotActive { status } => Err(CoreError::VoucherNotActive {
            status: status.as_str().to_string(),
        }
        .into()),
    }
}

/// Purchases a general voucher, funded from the wallet's cash ledger.
pub async fn purchase_general(
    state: &AppState,
    general_voucher_id: &str,
    customer_id: &str,
) -> ApiResult<CustomerGeneralVoucher> {
    super::wallet::get_wallet(state, customer_id).await?;

    let outcome = state
        .db
        .general_vouchers()
        .purchase(customer_id, general_voucher_id, Utc::now())
        .await
        .map_err(|err| match err {
            DbError::NotFound { .. } => {
                CoreError::VoucherNotFound(general_voucher_id.to_string()).into()
            }
            other => crate::error::ApiError::Db(other),
        })?;

    match outcome {
        PurchaseOutcome::Purchased(owned) => Ok(owned),
        PurchaseOutcome::OutOfStock => Err(CoreError::OutOfStock.into()),
        PurchaseOutcome::InsufficientFunds { shortfall, .. } => {
            Err(CoreError::InsufficientFunds {
                shortfall_cents: shortfall,
            }
            .into())
        }
    }
}
