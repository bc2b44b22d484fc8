//! Voucher routes: package purchase, meal redemption, general vouchers.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eatoff_core::{CustomerGeneralVoucher, CustomerVoucherStatus, PurchasedVoucher, VoucherStatus};

use crate::error::ApiResult;
use crate::services;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vouchers/packages/{id}/purchase", post(purchase_package))
        .route("/vouchers/{id}/redeem", post(redeem_meal))
        .route("/vouchers/general/{id}/purchase", post(purchase_general))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchasePackageRequest {
    customer_id: String,
    payment_confirmation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoucherView {
    id: String,
    restaurant_id: String,
    package_id: String,
    total_meals: i64,
    used_meals: i64,
    per_meal_value_cents: i64,
    purchase_price_cents: i64,
    discount_cents: i64,
    expires_at: DateTime<Utc>,
    status: VoucherStatus,
    qr_reference: String,
}

impl From<PurchasedVoucher> for VoucherView {
    fn from(voucher: PurchasedVoucher) -> Self {
        VoucherView {
            id: voucher.id,
            restaurant_id: voucher.restaurant_id,
            package_id: voucher.package_id,
            total_meals: voucher.total_meals,
            used_meals: voucher.used_meals,
            per_meal_value_cents: voucher.per_meal_value_cents,
            purchase_price_cents: voucher.purchase_price_cents,
            discount_cents: voucher.discount_cents,
            expires_at: voucher.expires_at,
            status: voucher.status,
            qr_reference: voucher.qr_reference,
        }
    }
}

async fn purchase_package(
    State(state): State<AppState>,
    Path(package_id): Path<String>,
    Json(request): Json<PurchasePackageRequest>,
) -> ApiResult<Json<VoucherView>> {
    let voucher = services::voucher::purchase_package(
        &state,
        &package_id,
        &request.customer_id,
        &request.payment_confirmation,
    )
    .await?;
    Ok(Json(voucher.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemResponse {
    remaining_meals: i64,
}

async fn redeem_meal(
    State(state): State<AppState>,
    Path(voucher_id): Path<String>,
) -> ApiResult<Json<RedeemResponse>> {
    let remaining_meals = services::voucher::redeem_meal(&state, &voucher_id).await?;
    Ok(Json(RedeemResponse { remaining_meals }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseGeneralRequest {
    customer_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneralVoucherView {
    id: String,
    general_voucher_id: String,
    face_value_cents: i64,
    discount_bps: u32,
    uses_remaining: i64,
    expires_at: DateTime<Utc>,
    status: CustomerVoucherStatus,
}

impl From<CustomerGeneralVoucher> for GeneralVoucherView {
    fn from(owned: CustomerGeneralVoucher) -> Self {
        GeneralVoucherView {
            id: owned.id,
            general_voucher_id: owned.general_voucher_id,
            face_value_cents: owned.face_value_cents,
            discount_bps: owned.discount_bps,
            uses_remaining: owned.uses_remaining,
            expires_at: owned.expires_at,
            status: owned.status,
        }
    }
}

async fn purchase_general(
    State(state): State<AppState>,
    Path(general_voucher_id): Path<String>,
    Json(request): Json<PurchaseGeneralRequest>,
) -> ApiResult<Json<GeneralVoucherView>> {
    let owned =
        services::voucher::purchase_general(&state, &general_voucher_id, &request.customer_id)
            .await?;
    Ok(Json(owned.into()))
}
