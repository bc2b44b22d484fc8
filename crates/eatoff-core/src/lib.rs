//! # eatoff-core: Pure Business Logic for the Eatoff Settlement Engine
//!
//! This crate is the **heart** of the wallet & voucher settlement engine.
//! It contains all business logic as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Eatoff Engine Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Callers (order flow, POS scan, wallet UI)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/api (axum + scheduler)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ eatoff-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   split   │  │    qr     │  │   │
//! │  │   │ Vouchers  │  │  Money    │  │ Breakdown │  │ HMAC-signed│ │   │
//! │  │   │ Ledger    │  │  Rate     │  │  quote()  │  │  payloads │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    eatoff-db (Storage Layer)                    │   │
//! │  │          SQLite ledger, vouchers, settlements, aggregates       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Customer, vouchers, transactions, settlements)
//! - [`money`] - Money/Rate types with integer arithmetic (no floating point!)
//! - [`split`] - Payment splitter quoting
//! - [`commission`] - Commission and pay-later math
//! - [`qr`] - Signed QR payment payloads
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output; clocks are parameters
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are i64 cents
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod commission;
pub mod error;
pub mod money;
pub mod qr;
pub mod split;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use commission::{pay_later_terms, split_commission, CommissionSplit, PayLaterTerms};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate, DEFAULT_COMMISSION, POINTS_PER_CURRENCY_UNIT};
pub use qr::{QrClaims, QrSigner, QR_LIFETIME_SECONDS};
pub use split::{quote, Breakdown, SplitRequest, WalletSnapshot};
pub use types::*;
