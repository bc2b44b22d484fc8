//! API configuration.
//!
//! Layered: compiled defaults, then an optional `eatoff.toml`, then
//! `EATOFF_`-prefixed environment variables (highest precedence), e.g.
//! `EATOFF_BIND_ADDRESS=0.0.0.0:8080 EATOFF_QR_SECRET=...`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address the HTTP server binds to.
    pub bind_address: String,

    /// Path to the SQLite database file.
    pub database_path: String,

    /// HMAC key for QR payload signing. MUST be overridden in production.
    pub qr_secret: String,

    /// Seconds between scheduler ticks (deferred captures + expiry sweep).
    pub scheduler_interval_secs: u64,

    /// Per-call timeout for gateway charges.
    pub gateway_timeout_secs: u64,
}

impl ApiConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("bind_address", "127.0.0.1:8080")?
            .set_default("database_path", "eatoff.db")?
            .set_default("qr_secret", "eatoff-dev-qr-secret-change-in-production")?
            .set_default("scheduler_interval_secs", 60)?
            .set_default("gateway_timeout_secs", 10)?
            .add_source(File::with_name("eatoff").required(false))
            .add_source(Environment::with_prefix("EATOFF"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let config = ApiConfig::load().unwrap();
        assert!(!config.bind_address.is_empty());
        assert!(config.scheduler_interval_secs > 0);
    }
}
