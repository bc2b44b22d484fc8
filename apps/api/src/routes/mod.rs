//! HTTP route table.
//!
//! Thin handlers only: decode the request, call the service layer, encode
//! the response. Business rules live below this layer.

pub mod health;
pub mod payments;
pub mod platform;
pub mod settlements;
pub mod vouchers;
pub mod wallet;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(wallet::router())
        .merge(vouchers::router())
        .merge(payments::router())
        .merge(settlements::router())
        .merge(platform::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(AppState::for_tests().await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_customer_maps_to_404_body() {
        let app = router(AppState::for_tests().await);
        let response = app
            .oneshot(Request::get("/wallet/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "customer_not_found");
    }
}
