//! Card gateway collaborator.
//!
//! The engine never touches card data; it holds opaque gateway tokens and
//! asks the gateway to authorize, charge, and confirm top-ups. Real
//! integration is out of scope, so the trait ships with a deterministic
//! stub the tests and dev deployments run against.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use eatoff_core::{CoreError, CoreResult};

/// A top-up intent handed to the client for external confirmation.
#[derive(Debug, Clone)]
pub struct TopupIntent {
    pub payment_intent_id: String,
    pub client_secret: String,
}

/// External card gateway operations the engine depends on.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Tokenizes a customer's payment method for later capture.
    async fn authorize_payment_method(
        &self,
        customer_id: &str,
        method_ref: &str,
    ) -> CoreResult<String>;

    /// Charges a previously authorized token. Returns a charge reference.
    async fn charge(&self, method_token: &str, amount_cents: i64) -> CoreResult<String>;

    /// Creates an intent the client confirms out-of-band.
    async fn create_topup_intent(
        &self,
        customer_id: &str,
        amount_cents: i64,
    ) -> CoreResult<TopupIntent>;

    /// Confirms a completed intent; returns the confirmed amount in cents.
    async fn confirm_topup(&self, payment_intent_id: &str) -> CoreResult<i64>;
}

/// Deterministic in-process stub.
///
/// Behavior hooks for tests: a `method_ref` containing `declined` fails
/// authorization, a token containing `declined` fails capture. Top-up
/// intents encode the amount so confirmation needs no shared state.
#[derive(Debug, Clone)]
pub struct StubGateway {
    pub charge_timeout: Duration,
}

impl StubGateway {
    pub fn new(charge_timeout: Duration) -> Self {
        StubGateway { charge_timeout }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn authorize_payment_method(
        &self,
        customer_id: &str,
        method_ref: &str,
    ) -> CoreResult<String> {
        if method_ref.contains("declined") {
            return Err(CoreError::GatewayFailure("authorization declined".into()));
        }
        let token = format!("tok_{}", Uuid::new_v4().simple());
        debug!(customer = %customer_id, "Stub gateway authorized payment method");
        Ok(token)
    }

    async fn charge(&self, method_token: &str, amount_cents: i64) -> CoreResult<String> {
        if method_token.contains("declined") {
            return Err(CoreError::GatewayFailure("card declined".into()));
        }
        debug!(amount_cents, "Stub gateway charge");
        Ok(format!("ch_{}", Uuid::new_v4().simple()))
    }

    async fn create_topup_intent(
        &self,
        _customer_id: &str,
        amount_cents: i64,
    ) -> CoreResult<TopupIntent> {
        let id = format!("pi_{}_{}", amount_cents, Uuid::new_v4().simple());
        Ok(TopupIntent {
            client_secret: format!("{id}_secret"),
            payment_intent_id: id,
        })
    }

    async fn confirm_topup(&self, payment_intent_id: &str) -> CoreResult<i64> {
        // Intent ids are "pi_<amountCents>_<random>"
        let amount = payment_intent_id
            .strip_prefix("pi_")
            .and_then(|rest| rest.split('_').next())
            .and_then(|cents| cents.parse::<i64>().ok())
            .filter(|cents| *cents > 0)
            .ok_or_else(|| CoreError::GatewayFailure("unknown payment intent".into()))?;
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> StubGateway {
        StubGateway::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_topup_round_trip() {
        let intent = gateway().create_topup_intent("c-1", 5000).await.unwrap();
        let amount = gateway()
            .confirm_topup(&intent.payment_intent_id)
            .await
            .unwrap();
        assert_eq!(amount, 5000);
    }

    #[tokio::test]
    async fn test_declined_method() {
        let err = gateway()
            .authorize_payment_method("c-1", "card_declined_visa")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::GatewayFailure(_)));
    }

    #[tokio::test]
    async fn test_bogus_intent_rejected() {
        assert!(gateway().confirm_topup("pi_abc_def").await.is_err());
        assert!(gateway().confirm_topup("nonsense").await.is_err());
    }
}
