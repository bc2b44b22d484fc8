//! HTTP error mapping.
//!
//! Every error leaves as JSON `{code, message, shortfallCents?}` with a
//! stable machine-readable `code` so POS clients can branch without
//! parsing messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use eatoff_core::CoreError;
use eatoff_db::DbError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shortfall_cents: Option<i64>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<i64>) {
        match self {
            ApiError::Core(core) => match core {
                CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error", None),
                CoreError::MealValueTooLow { .. } => {
                    (StatusCode::BAD_REQUEST, "meal_value_too_low", None)
                }
                CoreError::QrMalformed(_) => (StatusCode::BAD_REQUEST, "qr_malformed", None),
                CoreError::QrInvalidSignature => {
                    (StatusCode::BAD_REQUEST, "qr_invalid_signature", None)
                }
                CoreError::NotPayLater(_) => (StatusCode::BAD_REQUEST, "not_pay_later", None),

                CoreError::InsufficientFunds { shortfall_cents } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_funds",
                    Some(*shortfall_cents),
                ),
                CoreError::InsufficientPoints { shortfall } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_points",
                    Some(*shortfall),
                ),
                CoreError::PaymentNotConfirmed => {
                    (StatusCode::PAYMENT_REQUIRED, "payment_not_confirmed", None)
                }

                CoreError::PackageNotFound(_) => (StatusCode::NOT_FOUND, "package_not_found", None),
                CoreError::VoucherNotFound(_) => (StatusCode::NOT_FOUND, "voucher_not_found", None),
                CoreError::CustomerNotFound(_) => {
                    (StatusCode::NOT_FOUND, "customer_not_found", None)
                }
                CoreError::RestaurantNotFound(_) => {
                    (StatusCode::NOT_FOUND, "restaurant_not_found", None)
                }
                CoreError::PlatformVoucherNotFound(_) => {
                    (StatusCode::NOT_FOUND, "platform_voucher_not_found", None)
                }
                CoreError::SettlementNotFound(_) => {
                    (StatusCode::NOT_FOUND, "settlement_not_found", None)
                }

                CoreError::OutOfStock => (StatusCode::CONFLICT, "out_of_stock", None),
                CoreError::VoucherExhausted { .. } => {
                    (StatusCode::CONFLICT, "voucher_exhausted", None)
                }
                CoreError::VoucherNotActive { .. } => {
                    (StatusCode::CONFLICT, "voucher_not_active", None)
                }
                CoreError::QrAlreadyUsed => (StatusCode::CONFLICT, "qr_already_used", None),
                CoreError::QrRestaurantMismatch { .. } => {
                    (StatusCode::CONFLICT, "qr_restaurant_mismatch", None)
                }
                CoreError::AlreadyPaid => (StatusCode::CONFLICT, "already_paid", None),
                CoreError::NothingToSettle => (StatusCode::CONFLICT, "nothing_to_settle", None),

                CoreError::VoucherExpired => (StatusCode::GONE, "voucher_expired", None),
                CoreError::QrExpired => (StatusCode::GONE, "qr_expired", None),

                CoreError::GatewayFailure(_) => (StatusCode::BAD_GATEWAY, "gateway_failure", None),
                CoreError::TransientConflict => {
                    (StatusCode::SERVICE_UNAVAILABLE, "transient_conflict", None)
                }
            },

            ApiError::Db(db) => match db {
                DbError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", None),
                DbError::UniqueViolation { .. } => (StatusCode::CONFLICT, "conflict", None),
                DbError::Busy | DbError::PoolExhausted => {
                    (StatusCode::SERVICE_UNAVAILABLE, "transient_conflict", None)
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, shortfall_cents) = self.parts();
        if status.is_server_error() {
            error!(%self, code, "Request failed");
        }
        let body = ErrorBody {
            code,
            message: self.to_string(),
            shortfall_cents,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficiency_carries_shortfall() {
        let err = ApiError::Core(CoreError::InsufficientFunds { shortfall_cents: 1 });
        let (status, code, shortfall) = err.parts();
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(code, "insufficient_funds");
        assert_eq!(shortfall, Some(1));
    }

    #[test]
    fn test_expiry_maps_to_gone() {
        let (status, code, _) = ApiError::Core(CoreError::QrExpired).parts();
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(code, "qr_expired");
    }

    #[test]
    fn test_busy_maps_to_unavailable() {
        let (status, _, _) = ApiError::Db(DbError::Busy).parts();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
