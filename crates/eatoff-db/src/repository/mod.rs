//! # Repository Layer
//!
//! One repository per aggregate; cross-aggregate effects (a QR payment
//! touching the wallet, a voucher, and the nonce table at once) compose
//! the transaction-scoped `*_in_tx` primitives the aggregates export.

pub mod general_voucher;
pub mod payment;
pub mod platform;
pub mod restaurant;
pub mod settlement;
pub mod stats;
pub mod voucher;
pub mod wallet;
