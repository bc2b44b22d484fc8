//! # QR Payment Payloads
//!
//! Signed, time-boxed, single-use payment requests scanned at the point of
//! sale.
//!
//! ## Payload Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    QR Token Layout                                      │
//! │                                                                         │
//! │   base64url(claims JSON) . base64url(HMAC-SHA256(claims JSON))         │
//! │                                                                         │
//! │   Claims: { customerId, restaurantId, amountCents, method,             │
//! │             instrument refs?, nonce, issuedAt }                         │
//! │                                                                         │
//! │   • Signed: a forged or client-modified payload fails verification     │
//! │   • Time-boxed: 300 second lifetime from issuedAt                      │
//! │   • Single-use: the nonce is consumed exactly once at redemption       │
//! │     (enforced by the store, not here — this module is pure)            │
//! │   • Carries NO card data: it only authorizes a wallet-side debit       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Verification order matters: signature first (cheap, authenticates the
//! rest), then expiry, then restaurant match. Nonce consumption happens in
//! the same database transaction as the payment effects.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{CoreError, CoreResult};
use crate::types::PaymentMethod;

type HmacSha256 = Hmac<Sha256>;

/// Fixed QR payment request lifetime: 5 minutes.
pub const QR_LIFETIME_SECONDS: i64 = 300;

// =============================================================================
// Claims
// =============================================================================

/// The payment fields plus nonce and timestamp packed into a QR code.
///
/// Ephemeral: never persisted beyond the nonce-consumption guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrClaims {
    pub customer_id: String,
    pub restaurant_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    /// Meal-package voucher backing a `Voucher` payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_id: Option<String>,
    /// Owned general voucher backing a `GeneralVoucher` payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_voucher_id: Option<String>,
    /// Points portion of a `Mixed` payment; the cash portion is the rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_portion_cents: Option<i64>,
    /// Random 128-bit nonce, hex-encoded; the single-use key.
    pub nonce: String,
    /// Unix timestamp (seconds) when the request was issued.
    pub issued_at: i64,
}

impl QrClaims {
    /// When this payment request stops being redeemable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.issued_at + QR_LIFETIME_SECONDS, 0)
            .unwrap_or_else(Utc::now)
    }
}

// =============================================================================
// Signer
// =============================================================================

/// Signs and verifies QR payment tokens with HMAC-SHA256.
///
/// The key is shared between the issuing side (customer app backend) and
/// the redeeming side (POS backend); both are this engine, so the key
/// never leaves the process.
#[derive(Clone)]
pub struct QrSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for QrSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("QrSigner").finish_non_exhaustive()
    }
}

impl QrSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        QrSigner { key: key.into() }
    }

    /// Packs and signs claims into a `payload.signature` token.
    pub fn sign(&self, claims: &QrClaims) -> CoreResult<String> {
        let body = serde_json::to_vec(claims)
            .map_err(|e| CoreError::QrMalformed(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| CoreError::QrMalformed(e.to_string()))?;
        mac.update(&body);
        let sig = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(sig)
        ))
    }

    /// Verifies a token's signature and lifetime and returns its claims.
    ///
    /// ## Errors
    /// - `QrMalformed` - token is not `payload.signature` base64url
    /// - `QrInvalidSignature` - HMAC does not match (forged / corrupted)
    /// - `QrExpired` - older than [`QR_LIFETIME_SECONDS`]
    ///
    /// Restaurant matching and nonce single-use are the caller's job: the
    /// former needs the scanning restaurant, the latter needs the store.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> CoreResult<QrClaims> {
        let (body_b64, sig_b64) = token
            .split_once('.')
            .ok_or_else(|| CoreError::QrMalformed("missing signature separator".into()))?;

        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|e| CoreError::QrMalformed(e.to_string()))?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|e| CoreError::QrMalformed(e.to_string()))?;

        // Constant-time comparison via Mac::verify_slice
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| CoreError::QrMalformed(e.to_string()))?;
        mac.update(&body);
        mac.verify_slice(&sig)
            .map_err(|_| CoreError::QrInvalidSignature)?;

        let claims: QrClaims = serde_json::from_slice(&body)
            .map_err(|e| CoreError::QrMalformed(e.to_string()))?;

        let age = now.signed_duration_since(
            DateTime::from_timestamp(claims.issued_at, 0)
                .ok_or_else(|| CoreError::QrMalformed("bad issuedAt".into()))?,
        );
        if age > Duration::seconds(QR_LIFETIME_SECONDS) {
            return Err(CoreError::QrExpired);
        }

        Ok(claims)
    }

    /// Full point-of-sale check: verify + restaurant match.
    pub fn verify_for_restaurant(
        &self,
        token: &str,
        restaurant_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<QrClaims> {
        let claims = self.verify(token, now)?;
        if claims.restaurant_id != restaurant_id {
            return Err(CoreError::QrRestaurantMismatch {
                expected: claims.restaurant_id,
                actual: restaurant_id.to_string(),
            });
        }
        Ok(claims)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> QrSigner {
        QrSigner::new(*b"test-qr-signing-key-32-bytes!!!!")
    }

    fn claims(issued_at: i64) -> QrClaims {
        QrClaims {
            customer_id: "cust-1".into(),
            restaurant_id: "rest-1".into(),
            amount_cents: 2500,
            method: PaymentMethod::Cash,
            voucher_id: None,
            general_voucher_id: None,
            points_portion_cents: None,
            nonce: "a1b2c3d4e5f60718293a4b5c6d7e8f90".into(),
            issued_at,
        }
    }

    #[test]
    fn test_round_trip() {
        let now = Utc::now();
        let claims = claims(now.timestamp());
        let token = signer().sign(&claims).unwrap();

        let verified = signer().verify(&token, now).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let now = Utc::now();
        let token = signer().sign(&claims(now.timestamp())).unwrap();

        // Bump the amount inside the payload, keep the old signature
        let (body_b64, sig_b64) = token.split_once('.').unwrap();
        let body = URL_SAFE_NO_PAD.decode(body_b64).unwrap();
        let forged = String::from_utf8(body).unwrap().replace("2500", "1");
        let forged_token = format!("{}.{}", URL_SAFE_NO_PAD.encode(forged), sig_b64);

        assert_eq!(
            signer().verify(&forged_token, now),
            Err(CoreError::QrInvalidSignature)
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let now = Utc::now();
        let token = signer().sign(&claims(now.timestamp())).unwrap();

        let other = QrSigner::new(*b"another-key-entirely-32-bytes!!!");
        assert_eq!(other.verify(&token, now), Err(CoreError::QrInvalidSignature));
    }

    #[test]
    fn test_expiry_boundary() {
        let issued = Utc::now();
        let token = signer().sign(&claims(issued.timestamp())).unwrap();

        // Exactly at the lifetime boundary: still valid
        let at_limit = issued + Duration::seconds(QR_LIFETIME_SECONDS);
        assert!(signer().verify(&token, at_limit).is_ok());

        // One second past: expired
        let past = at_limit + Duration::seconds(1);
        assert_eq!(signer().verify(&token, past), Err(CoreError::QrExpired));
    }

    #[test]
    fn test_restaurant_mismatch() {
        let now = Utc::now();
        let token = signer().sign(&claims(now.timestamp())).unwrap();

        let err = signer()
            .verify_for_restaurant(&token, "rest-2", now)
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::QrRestaurantMismatch {
                expected: "rest-1".into(),
                actual: "rest-2".into(),
            }
        );

        assert!(signer().verify_for_restaurant(&token, "rest-1", now).is_ok());
    }

    #[test]
    fn test_malformed_token() {
        let now = Utc::now();
        assert!(matches!(
            signer().verify("not-a-token", now),
            Err(CoreError::QrMalformed(_))
        ));
        assert!(matches!(
            signer().verify("!!bad!!.!!bytes!!", now),
            Err(CoreError::QrMalformed(_))
        ));
    }
}
