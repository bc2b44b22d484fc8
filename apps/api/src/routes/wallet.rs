//! Wallet routes: balances, ledger history, top-ups.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use eatoff_core::{Customer, LedgerKind, MembershipTier, WalletTransaction};

use crate::error::ApiResult;
use crate::services;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wallet/{customer}", get(get_wallet))
        .route("/wallet/{customer}/transactions", get(history))
        .route("/wallet/{customer}/topup-intent", post(topup_intent))
        .route("/wallet/{customer}/topup-complete", post(topup_complete))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletView {
    customer_id: String,
    name: String,
    cash_balance_cents: i64,
    points_balance: i64,
    total_points_earned: i64,
    tier: MembershipTier,
}

impl From<Customer> for WalletView {
    fn from(customer: Customer) -> Self {
        WalletView {
            customer_id: customer.id,
            name: customer.name,
            cash_balance_cents: customer.cash_balance_cents,
            points_balance: customer.points_balance,
            total_points_earned: customer.total_points_earned,
            tier: customer.tier,
        }
    }
}

async fn get_wallet(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<WalletView>> {
    let customer = services::wallet::get_wallet(&state, &customer_id).await?;
    Ok(Json(customer.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    #[serde(default = "default_ledger")]
    ledger: LedgerKind,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_ledger() -> LedgerKind {
    LedgerKind::Cash
}
// Pages are zero-based.
fn default_page() -> u32 {
    0
}
fn default_per_page() -> u32 {
    50
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryView {
    id: String,
    ledger: LedgerKind,
    kind: eatoff_core::WalletEntryKind,
    amount: i64,
    balance_after: i64,
    restaurant_id: Option<String>,
    payment_transaction_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<WalletTransaction> for EntryView {
    fn from(entry: WalletTransaction) -> Self {
        EntryView {
            id: entry.id,
            ledger: entry.ledger,
            kind: entry.kind,
            amount: entry.amount,
            balance_after: entry.balance_after,
            restaurant_id: entry.restaurant_id,
            payment_transaction_id: entry.payment_transaction_id,
            created_at: entry.created_at,
        }
    }
}

async fn history(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<EntryView>>> {
    let entries = services::wallet::history(
        &state,
        &customer_id,
        query.ledger,
        query.page,
        query.per_page,
    )
    .await?;
    Ok(Json(entries.into_iter().map(EntryView::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopupIntentRequest {
    amount_cents: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopupIntentResponse {
    payment_intent_id: String,
    client_secret: String,
}

async fn topup_intent(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<TopupIntentRequest>,
) -> ApiResult<Json<TopupIntentResponse>> {
    let intent =
        services::wallet::create_topup_intent(&state, &customer_id, request.amount_cents).await?;
    Ok(Json(TopupIntentResponse {
        payment_intent_id: intent.payment_intent_id,
        client_secret: intent.client_secret,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopupCompleteRequest {
    payment_intent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopupCompleteResponse {
    cash_balance_cents: i64,
}

async fn topup_complete(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<TopupCompleteRequest>,
) -> ApiResult<Json<TopupCompleteResponse>> {
    let cash_balance_cents =
        services::wallet::complete_topup(&state, &customer_id, &request.payment_intent_id).await?;
    Ok(Json(TopupCompleteResponse { cash_balance_cents }))
}
