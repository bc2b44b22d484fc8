//! # eatoff-db: Storage Layer for the Eatoff Settlement Engine
//!
//! SQLite persistence behind the wallet, voucher, payment and settlement
//! aggregates.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        eatoff-db Layout                                 │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                  Database (pool.rs)                               │ │
//! │  │   WAL pool • embedded migrations • repository accessors           │ │
//! │  └───────────────────────────────┬───────────────────────────────────┘ │
//! │                                  │                                      │
//! │  ┌───────────────────────────────▼───────────────────────────────────┐ │
//! │  │                  repository/ (one per aggregate)                  │ │
//! │  │                                                                   │ │
//! │  │   wallet      ledgers + guarded balance CAS                       │ │
//! │  │   voucher     packages + purchased vouchers, meal redemption      │ │
//! │  │   general_voucher  stock CAS + owned instances                    │ │
//! │  │   platform    pay-later grants + deferred capture claiming        │ │
//! │  │   payment     the one-transaction breakdown commit                │ │
//! │  │   settlement  period folding + exactly-once payout                │ │
//! │  │   stats       idempotent daily rollups                            │ │
//! │  │   restaurant  commission override + settlement counters           │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! │  Every read-modify-write is a single guarded UPDATE or one SQLite      │
//! │  transaction. rows_affected == 0 is the CAS loss signal; domain        │
//! │  outcomes (insufficiency, exhaustion, sold-out) are enums, not errors. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::general_voucher::{GeneralVoucherRepository, PurchaseOutcome};
pub use repository::payment::{CommitOutcome, PaymentRepository};
pub use repository::platform::{
    PlatformVoucherRepository, MAX_CAPTURE_ATTEMPTS, STALE_CLAIM_AFTER_SECS,
};
pub use repository::restaurant::RestaurantRepository;
pub use repository::settlement::{GenerateOutcome, MarkPaidOutcome, SettlementRepository};
pub use repository::stats::{PlatformDailyStats, RestaurantDailyStats, StatsRepository};
pub use repository::voucher::{RedeemOutcome, VoucherRepository};
pub use repository::wallet::{DebitOutcome, EntryContext, WalletRepository};
