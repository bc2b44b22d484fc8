//! Settlement generation and payout.

use chrono::{DateTime, Utc};

use eatoff_core::{validation, CoreError, Settlement, SettlementStatus};
use eatoff_db::{DbError, GenerateOutcome, MarkPaidOutcome};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn generate(
    state: &AppState,
    restaurant_id: &str,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> ApiResult<Settlement> {
    validation::validate_period(period_start, period_end).map_err(CoreError::from)?;

    let outcome = state
        .db
        .settlements()
        .generate(restaurant_id, period_start, period_end, Utc::now())
        .await
        .map_err(|err| match err {
            DbError::NotFound { .. } => {
                ApiError::Core(CoreError::RestaurantNotFound(restaurant_id.to_string()))
            }
            other => ApiError::Db(other),
        })?;

    match outcome {
        GenerateOutcome::Generated(settlement) => Ok(settlement),
        GenerateOutcome::NothingToSettle => Err(CoreError::NothingToSettle.into()),
    }
}

pub async fn mark_paid(
    state: &AppState,
    settlement_id: &str,
    method: &str,
    reference: &str,
) -> ApiResult<Settlement> {
    validation::validate_required("method", method).map_err(CoreError::from)?;
    validation::validate_required("reference", reference).map_err(CoreError::from)?;

    let outcome = state
        .db
        .settlements()
        .mark_paid(settlement_id, method, reference, Utc::now())
        .await
        .map_err(|err| match err {
            DbError::NotFound { .. } => {
                ApiError::Core(CoreError::SettlementNotFound(settlement_id.to_string()))
            }
            other => ApiError::Db(other),
        })?;

    match outcome {
        MarkPaidOutcome::Paid(settlement) => Ok(settlement),
        MarkPaidOutcome::AlreadyPaid => Err(CoreError::AlreadyPaid.into()),
    }
}

pub async fn list(
    state: &AppState,
    restaurant_id: &str,
    status: Option<SettlementStatus>,
) -> ApiResult<Vec<Settlement>> {
    state
        .db
        .restaurants()
        .get(restaurant_id)
        .await?
        .ok_or_else(|| CoreError::RestaurantNotFound(restaurant_id.to_string()))?;

    let settlements = state
        .db
        .settlements()
        .list_for_restaurant(restaurant_id, status)
        .await?;
    Ok(settlements)
}
