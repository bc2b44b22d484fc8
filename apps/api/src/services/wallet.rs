//! Wallet operations: balances, history, and gateway-backed top-ups.

use tracing::info;

use eatoff_core::{CoreError, Customer, LedgerKind, WalletEntryKind, WalletTransaction};
use eatoff_db::EntryContext;

use crate::error::ApiResult;
use crate::gateway::TopupIntent;
use crate::state::AppState;

pub async fn get_wallet(state: &AppState, customer_id: &str) -> ApiResult<Customer> {
    let customer = state
        .db
        .wallet()
        .get_customer(customer_id)
        .await?
        .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))?;
    Ok(customer)
}

pub async fn history(
    state: &AppState,
    customer_id: &str,
    ledger: LedgerKind,
    page: u32,
    per_page: u32,
) -> ApiResult<Vec<WalletTransaction>> {
    // 404 for unknown customers rather than an empty page
    get_wallet(state, customer_id).await?;
    let entries = state
        .db
        .wallet()
        .history(customer_id, ledger, page, per_page)
        .await?;
    Ok(entries)
}

pub async fn create_topup_intent(
    state: &AppState,
    customer_id: &str,
    amount_cents: i64,
) -> ApiResult<TopupIntent> {
    eatoff_core::validation::validate_amount_cents("amountCents", amount_cents)
        .map_err(CoreError::from)?;
    get_wallet(state, customer_id).await?;

    let intent = state
        .gateway
        .create_topup_intent(customer_id, amount_cents)
        .await?;
    Ok(intent)
}

/// Confirms an intent with the gateway and credits the cash ledger.
/// Returns the balance after the deposit.
pub async fn complete_topup(
    state: &AppState,
    customer_id: &str,
    payment_intent_id: &str,
) -> ApiResult<i64> {
    get_wallet(state, customer_id).await?;

    let amount_cents = state.gateway.confirm_topup(payment_intent_id).await?;
    let balance_after = state
        .db
        .wallet()
        .credit(
            customer_id,
            LedgerKind::Cash,
            amount_cents,
            WalletEntryKind::Deposit,
            EntryContext::default(),
        )
        .await?;

    info!(customer = %customer_id, amount_cents, balance_after, "Top-up completed");
    Ok(balance_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[tokio::test]
    async fn test_topup_flow() {
        let state = AppState::for_tests().await;
        let customer = state.db.wallet().create_customer("Jon").await.unwrap();

        let intent = create_topup_intent(&state, &customer.id, 5000).await.unwrap();
        let balance = complete_topup(&state, &customer.id, &intent.payment_intent_id)
            .await
            .unwrap();
        assert_eq!(balance, 5000);

        let wallet = get_wallet(&state, &customer.id).await.unwrap();
        assert_eq!(wallet.cash_balance_cents, 5000);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_404() {
        let state = AppState::for_tests().await;
        let err = get_wallet(&state, "ghost").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ApiError::Core(CoreError::CustomerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_topup_rejects_non_positive_amount() {
        let state = AppState::for_tests().await;
        let customer = state.db.wallet().create_customer("Kim").await.unwrap();
        let err = create_topup_intent(&state, &customer.id, 0).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ApiError::Core(CoreError::Validation(_))
        ));
    }
}
