//! Platform voucher routes: pay-later authorization.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eatoff_core::{CustomerPlatformVoucher, CustomerVoucherStatus, DeferredPayment, DeferredStatus};

use crate::error::ApiResult;
use crate::services;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/platform-vouchers/{id}/authorize-pay-later",
        post(authorize_pay_later),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeRequest {
    customer_id: String,
    method_ref: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GrantView {
    id: String,
    platform_voucher_id: String,
    value_cents: i64,
    expires_at: DateTime<Utc>,
    status: CustomerVoucherStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeferredView {
    id: String,
    original_amount_cents: i64,
    bonus_amount_cents: i64,
    total_value_cents: i64,
    scheduled_charge_at: DateTime<Utc>,
    status: DeferredStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    voucher: GrantView,
    deferred_payment: DeferredView,
}

impl From<(CustomerPlatformVoucher, DeferredPayment)> for AuthorizeResponse {
    fn from((grant, deferred): (CustomerPlatformVoucher, DeferredPayment)) -> Self {
        AuthorizeResponse {
            voucher: GrantView {
                id: grant.id,
                platform_voucher_id: grant.platform_voucher_id,
                value_cents: grant.value_cents,
                expires_at: grant.expires_at,
                status: grant.status,
            },
            deferred_payment: DeferredView {
                id: deferred.id,
                original_amount_cents: deferred.original_amount_cents,
                bonus_amount_cents: deferred.bonus_amount_cents,
                total_value_cents: deferred.total_value_cents,
                scheduled_charge_at: deferred.scheduled_charge_at,
                status: deferred.status,
            },
        }
    }
}

async fn authorize_pay_later(
    State(state): State<AppState>,
    Path(platform_voucher_id): Path<String>,
    Json(request): Json<AuthorizeRequest>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let granted = services::deferred::authorize(
        &state,
        &platform_voucher_id,
        &request.customer_id,
        &request.method_ref,
    )
    .await?;
    Ok(Json(granted.into()))
}
