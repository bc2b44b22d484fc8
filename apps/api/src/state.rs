//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use eatoff_core::QrSigner;
use eatoff_db::Database;

use crate::config::ApiConfig;
use crate::gateway::{PaymentGateway, StubGateway};

/// Constructed once in `main`, cloned into every handler via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub signer: QrSigner,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig) -> Self {
        let signer = QrSigner::new(config.qr_secret.as_bytes());
        let gateway = Arc::new(StubGateway::new(Duration::from_secs(
            config.gateway_timeout_secs,
        )));
        AppState {
            db,
            signer,
            gateway,
            config,
        }
    }

    /// Test constructor with an in-memory database.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        let db = Database::new(eatoff_db::DbConfig::in_memory()).await.unwrap();
        let config = ApiConfig::load().unwrap();
        AppState::new(db, config)
    }
}
