//! Settlement routes: generation, listing, payout confirmation.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eatoff_core::{Settlement, SettlementStatus};

use crate::error::ApiResult;
use crate::services;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/restaurants/{id}/settlements", get(list))
        .route("/restaurants/{id}/settlements/generate", post(generate))
        .route("/settlements/{id}/mark-paid", post(mark_paid))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementView {
    id: String,
    restaurant_id: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    gross_cents: i64,
    commission_bps: u32,
    commission_cents: i64,
    net_cents: i64,
    transaction_count: i64,
    status: SettlementStatus,
    paid_method: Option<String>,
    paid_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,
}

impl From<Settlement> for SettlementView {
    fn from(settlement: Settlement) -> Self {
        SettlementView {
            id: settlement.id,
            restaurant_id: settlement.restaurant_id,
            period_start: settlement.period_start,
            period_end: settlement.period_end,
            gross_cents: settlement.gross_cents,
            commission_bps: settlement.commission_bps,
            commission_cents: settlement.commission_cents,
            net_cents: settlement.net_cents,
            transaction_count: settlement.transaction_count,
            status: settlement.status,
            paid_method: settlement.paid_method,
            paid_reference: settlement.paid_reference,
            paid_at: settlement.paid_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<SettlementStatus>,
}

async fn list(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<SettlementView>>> {
    let settlements = services::settlement::list(&state, &restaurant_id, query.status).await?;
    Ok(Json(
        settlements.into_iter().map(SettlementView::from).collect(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
}

async fn generate(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<SettlementView>> {
    let settlement = services::settlement::generate(
        &state,
        &restaurant_id,
        request.period_start,
        request.period_end,
    )
    .await?;
    Ok(Json(settlement.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkPaidRequest {
    method: String,
    reference: String,
}

async fn mark_paid(
    State(state): State<AppState>,
    Path(settlement_id): Path<String>,
    Json(request): Json<MarkPaidRequest>,
) -> ApiResult<Json<SettlementView>> {
    let settlement =
        services::settlement::mark_paid(&state, &settlement_id, &request.method, &request.reference)
            .await?;
    Ok(Json(settlement.into()))
}
