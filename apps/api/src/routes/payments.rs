//! QR payment routes: customer-side issue, restaurant-side redeem.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eatoff_core::{PaymentMethod, PaymentTransaction};

use crate::error::ApiResult;
use crate::services;
use crate::services::payment::{IssueInstrument, IssuedQr};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/qr/issue", post(issue))
        .route("/restaurants/{id}/payments/qr/redeem", post(redeem))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest {
    customer_id: String,
    restaurant_id: String,
    amount_cents: i64,
    method: PaymentMethod,
    voucher_id: Option<String>,
    general_voucher_id: Option<String>,
    points_portion_cents: Option<i64>,
}

async fn issue(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> ApiResult<Json<IssuedQr>> {
    let issued = services::payment::issue_qr(
        &state,
        &request.customer_id,
        &request.restaurant_id,
        request.amount_cents,
        request.method,
        IssueInstrument {
            voucher_id: request.voucher_id,
            general_voucher_id: request.general_voucher_id,
            points_portion_cents: request.points_portion_cents,
        },
    )
    .await?;
    Ok(Json(issued))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemRequest {
    payload: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionView {
    id: String,
    customer_id: String,
    restaurant_id: String,
    total_amount_cents: i64,
    method: PaymentMethod,
    voucher_cents: i64,
    points_used: i64,
    cash_cents: i64,
    discount_cents: i64,
    commission_cents: i64,
    restaurant_net_cents: i64,
    created_at: DateTime<Utc>,
}

impl From<PaymentTransaction> for TransactionView {
    fn from(transaction: PaymentTransaction) -> Self {
        TransactionView {
            id: transaction.id,
            customer_id: transaction.customer_id,
            restaurant_id: transaction.restaurant_id,
            total_amount_cents: transaction.total_amount_cents,
            method: transaction.method,
            voucher_cents: transaction.voucher_cents,
            points_used: transaction.points_used,
            cash_cents: transaction.cash_cents,
            discount_cents: transaction.discount_cents,
            commission_cents: transaction.commission_cents,
            restaurant_net_cents: transaction.restaurant_net_cents,
            created_at: transaction.created_at,
        }
    }
}

async fn redeem(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Json(request): Json<RedeemRequest>,
) -> ApiResult<Json<TransactionView>> {
    let transaction =
        services::payment::redeem_qr(&state, &restaurant_id, &request.payload).await?;
    Ok(Json(transaction.into()))
}
